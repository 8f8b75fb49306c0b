use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One RBAC grant: role `role_id` may perform `action_code` on `resource_code`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    pub id: i64,
    pub role_id: i64,
    pub resource_code: String,
    pub action_code: String,
}

impl PolicyRule {
    pub fn new(id: i64, role_id: i64, resource_code: &str, action_code: &str) -> Self {
        Self {
            id,
            role_id,
            resource_code: resource_code.trim().to_string(),
            action_code: action_code.trim().to_string(),
        }
    }

    /// Engine row: `[role_id, resource_code, action_code]`
    pub fn to_engine_row(&self) -> Vec<String> {
        vec![
            self.role_id.to_string(),
            self.resource_code.clone(),
            self.action_code.clone(),
        ]
    }

    /// Identity used for de-duplication; the row id is not part of the grant.
    pub fn grant_key(&self) -> (i64, &str, &str) {
        (self.role_id, &self.resource_code, &self.action_code)
    }
}

/// Resource codes a deployment owns. Empty means load everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceFilter(Vec<String>);

impl ResourceFilter {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let codes = codes
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty() && seen.insert(c.clone()))
            .collect();
        Self(codes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn codes(&self) -> &[String] {
        &self.0
    }

    pub fn allows(&self, resource_code: &str) -> bool {
        self.0.is_empty() || self.0.iter().any(|c| c == resource_code)
    }

    pub fn apply(&self, rules: Vec<PolicyRule>) -> Vec<PolicyRule> {
        if self.0.is_empty() {
            return rules;
        }
        rules
            .into_iter()
            .filter(|r| self.allows(&r.resource_code))
            .collect()
    }
}

/// Response envelope shared by HTTP rule and version sources: `{ "data": T }`.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub data: Option<T>,
}

/// Rule as returned by an HTTP source, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPolicyRule {
    pub id: Option<i64>,
    pub role_id: Option<i64>,
    pub resource_code: Option<String>,
    pub action_code: Option<String>,
}

impl RawPolicyRule {
    /// Returns `None` unless role, resource and action are present and non-blank.
    pub fn validate(self) -> Option<PolicyRule> {
        let role_id = self.role_id?;
        let resource = self.resource_code?;
        let action = self.action_code?;
        if resource.trim().is_empty() || action.trim().is_empty() {
            return None;
        }
        Some(PolicyRule::new(
            self.id.unwrap_or_default(),
            role_id,
            &resource,
            &action,
        ))
    }
}

// ---------- API request/response types ----------

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// e.g. "1"
    pub role: String,
    /// e.g. "user"
    pub resource: String,
    /// e.g. "read"
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub cached_version: i64,
    pub polling_enabled: bool,
    pub rule_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub rules_loaded: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: i64, role: i64, res: &str, act: &str) -> PolicyRule {
        PolicyRule::new(id, role, res, act)
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let rules = vec![rule(1, 1, "user", "read"), rule(2, 2, "order", "write")];
        let filter = ResourceFilter::default();
        assert_eq!(filter.apply(rules.clone()), rules);
    }

    #[test]
    fn test_filter_keeps_only_owned_resources() {
        let rules = vec![
            rule(1, 1, "user", "read"),
            rule(2, 2, "order", "write"),
            rule(3, 2, "user", "write"),
        ];
        let filter = ResourceFilter::new(["user"]);
        let kept = filter.apply(rules);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|r| r.resource_code == "user"));
    }

    #[test]
    fn test_filter_normalizes_codes() {
        let filter = ResourceFilter::new([" user ", "", "user", "order"]);
        assert_eq!(filter.codes(), &["user".to_string(), "order".to_string()]);
    }

    #[test]
    fn test_raw_rule_validation() {
        let ok: RawPolicyRule = serde_json::from_str(
            r#"{"id": 7, "roleId": 3, "resourceCode": " user ", "actionCode": "read"}"#,
        )
        .unwrap();
        assert_eq!(ok.validate(), Some(rule(7, 3, "user", "read")));

        let missing_role: RawPolicyRule =
            serde_json::from_str(r#"{"resourceCode": "user", "actionCode": "read"}"#).unwrap();
        assert!(missing_role.validate().is_none());

        let blank_action: RawPolicyRule =
            serde_json::from_str(r#"{"roleId": 1, "resourceCode": "user", "actionCode": "  "}"#)
                .unwrap();
        assert!(blank_action.validate().is_none());
    }

    #[test]
    fn test_envelope_null_data() {
        let env: ApiEnvelope<Vec<RawPolicyRule>> =
            serde_json::from_str(r#"{"code": 200, "data": null}"#).unwrap();
        assert!(env.data.is_none());

        let env: ApiEnvelope<i64> = serde_json::from_str(r#"{"message": "ok"}"#).unwrap();
        assert!(env.data.is_none());
    }

    #[test]
    fn test_engine_row() {
        assert_eq!(
            rule(1, 42, "user", "read").to_engine_row(),
            vec!["42".to_string(), "user".to_string(), "read".to_string()]
        );
    }
}
