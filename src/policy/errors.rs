use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PolicyError {
    #[error("Malformed policy source: {0}")]
    #[diagnostic(
        code(policy_sync::source::malformed),
        help("Policy sources are written as `<kind>:<query>`, e.g. `resource:policies.csv`")
    )]
    MalformedSource(String),

    #[error("Unsupported source kind `{0}`")]
    #[diagnostic(
        code(policy_sync::source::unsupported_kind),
        help("Supported kinds: database, resource, api (version sources: database, api)")
    )]
    UnsupportedSourceKind(String),

    #[error("Invalid query for `{kind}` source: {reason}")]
    #[diagnostic(
        code(policy_sync::source::invalid_query),
        help("database sources take a SELECT statement, resource sources a .csv path, api sources an http(s) URL")
    )]
    InvalidQueryForKind { kind: String, reason: String },

    #[error("Policy source `{source_kind}` unavailable: {reason}")]
    #[diagnostic(code(policy_sync::fetch::unavailable))]
    SourceUnavailable { source_kind: String, reason: String },

    #[error("Malformed rule data: {0}")]
    #[diagnostic(
        code(policy_sync::fetch::malformed_rules),
        help("Rule rows need id, role_id, resource_code and action_code columns")
    )]
    MalformedRuleData(String),

    #[error("Authorization engine error: {0}")]
    #[diagnostic(code(policy_sync::engine))]
    Engine(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(policy_sync::config))]
    Config(String),

    #[error("Subscription error: {0}")]
    #[diagnostic(code(policy_sync::subscription))]
    Subscription(String),
}

impl PolicyError {
    pub(crate) fn unavailable(source_kind: &str, reason: impl ToString) -> Self {
        PolicyError::SourceUnavailable {
            source_kind: source_kind.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Errors that must stop startup or an explicit reload instead of being
    /// retried on the next tick.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PolicyError::MalformedSource(_)
                | PolicyError::UnsupportedSourceKind(_)
                | PolicyError::InvalidQueryForKind { .. }
                | PolicyError::Config(_)
        )
    }
}

impl From<casbin::Error> for PolicyError {
    fn from(value: casbin::Error) -> Self {
        PolicyError::Engine(value.to_string())
    }
}

impl From<redis::RedisError> for PolicyError {
    fn from(value: redis::RedisError) -> Self {
        PolicyError::Subscription(value.to_string())
    }
}

impl IntoResponse for PolicyError {
    fn into_response(self) -> Response {
        let status = if self.is_configuration_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
