use csv::{ReaderBuilder, Trim};

use crate::policy::errors::PolicyError;
use crate::policy::types::{PolicyRule, ResourceFilter};

const KIND: &str = "resource";

/// Marker in the first column of a policy row.
const POLICY_ROW: &str = "p";

/// Load `p,<roleId>,<resourceCode>,<actionCode>` rows from a csv file.
pub async fn load_rules(path: &str, filter: &ResourceFilter) -> Result<Vec<PolicyRule>, PolicyError> {
    tracing::info!(path, "Loading policy rules from resource");

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PolicyError::unavailable(KIND, format!("{path}: {e}")))?;

    let rules = parse_rules(&content, filter)?;
    tracing::info!(path, count = rules.len(), "Loaded policy rules from resource");
    Ok(rules)
}

/// Parse csv policy content. Blank lines, `#` comments and non-policy rows
/// (e.g. `g` groupings) are skipped; rows with a non-numeric role are logged
/// and skipped. Policy rows are never quoted, so `"` is an ordinary byte and a
/// stray one cannot swallow the lines after it.
pub fn parse_rules(content: &str, filter: &ResourceFilter) -> Result<Vec<PolicyRule>, PolicyError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .quoting(false)
        .from_reader(content.as_bytes());

    let mut rules = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| PolicyError::MalformedRuleData(e.to_string()))?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        if record.len() < 4 || record.get(0) != Some(POLICY_ROW) {
            continue;
        }

        let (role, resource, action) = (&record[1], &record[2], &record[3]);
        let role_id = match role.parse::<i64>() {
            Ok(id) => id,
            Err(_) => {
                tracing::warn!(line, role, "Invalid role id in policy row, skipping");
                continue;
            }
        };
        if resource.is_empty() || action.is_empty() {
            tracing::warn!(line, "Policy row has an empty resource or action, skipping");
            continue;
        }
        if !filter.allows(resource) {
            continue;
        }

        rules.push(PolicyRule::new(line as i64, role_id, resource, action));
    }

    Ok(rules)
}
