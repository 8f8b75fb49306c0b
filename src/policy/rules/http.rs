use url::Url;

use crate::policy::errors::PolicyError;
use crate::policy::types::{ApiEnvelope, PolicyRule, RawPolicyRule, ResourceFilter};

const KIND: &str = "api";

/// Query parameter carrying the comma-joined resource filter.
pub const RESOURCE_PARAM: &str = "resourceCode";

/// GET rules from `endpoint`, expecting `{ "data": [PolicyRule...] }`.
/// Invalid entries are dropped with a warning; transport or envelope failures
/// fail the whole load.
pub async fn load_rules(
    client: &reqwest::Client,
    endpoint: &str,
    filter: &ResourceFilter,
) -> Result<Vec<PolicyRule>, PolicyError> {
    let url = request_url(endpoint, filter)?;
    tracing::info!(%url, "Loading policy rules from API");

    let body = client
        .get(url.clone())
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .map_err(|e| PolicyError::unavailable(KIND, e))?
        .text()
        .await
        .map_err(|e| PolicyError::unavailable(KIND, e))?;

    if body.trim().is_empty() {
        tracing::warn!(%url, "Empty response from policy API");
        return Ok(Vec::new());
    }

    let rules = parse_rules(&body)?;
    tracing::info!(count = rules.len(), "Loaded policy rules from API");
    Ok(rules)
}

pub fn request_url(endpoint: &str, filter: &ResourceFilter) -> Result<Url, PolicyError> {
    let mut url = Url::parse(endpoint).map_err(|e| PolicyError::InvalidQueryForKind {
        kind: KIND.to_string(),
        reason: e.to_string(),
    })?;
    if !filter.is_empty() {
        url.query_pairs_mut()
            .append_pair(RESOURCE_PARAM, &filter.codes().join(","));
    }
    Ok(url)
}

/// Decode the envelope and keep the entries that validate.
pub fn parse_rules(body: &str) -> Result<Vec<PolicyRule>, PolicyError> {
    let envelope: ApiEnvelope<Vec<serde_json::Value>> = serde_json::from_str(body)
        .map_err(|e| PolicyError::MalformedRuleData(format!("invalid API envelope: {e}")))?;

    let Some(entries) = envelope.data else {
        tracing::warn!("Policy API returned no data");
        return Ok(Vec::new());
    };

    let mut rules = Vec::with_capacity(entries.len());
    for entry in entries {
        let rule = serde_json::from_value::<RawPolicyRule>(entry.clone())
            .ok()
            .and_then(RawPolicyRule::validate);
        match rule {
            Some(rule) => rules.push(rule),
            None => tracing::warn!(%entry, "Skipping invalid policy rule"),
        }
    }
    Ok(rules)
}
