//! Version checkers: fetch the single monotonic token that says whether the
//! authoritative rule set changed. Every failure folds into `None` / `false`.

use std::time::Duration;

use sea_orm::{ConnectionTrait, DatabaseConnection, QueryResult, Statement};

use crate::policy::errors::PolicyError;
use crate::policy::rules::RuleSources;
use crate::policy::source::{VersionSourceDescriptor, VersionSourceKind};
use crate::policy::types::ApiEnvelope;

#[derive(Debug, Clone)]
pub enum VersionChecker {
    /// Runs a scalar query; the first column of the first row is the version.
    Database {
        db: DatabaseConnection,
        query: String,
        timeout: Duration,
    },
    /// GETs `{ "data": <version> }`.
    Http {
        client: reqwest::Client,
        endpoint: String,
        timeout: Duration,
    },
}

impl VersionChecker {
    pub fn from_descriptor(
        descriptor: &VersionSourceDescriptor,
        sources: &RuleSources,
        timeout: Duration,
    ) -> Result<Self, PolicyError> {
        match descriptor.kind {
            VersionSourceKind::Database => {
                let db = sources.database().cloned().ok_or_else(|| {
                    PolicyError::Config(
                        "database version source configured without database.url".into(),
                    )
                })?;
                Ok(VersionChecker::Database {
                    db,
                    query: descriptor.query.clone(),
                    timeout,
                })
            }
            VersionSourceKind::Http => Ok(VersionChecker::Http {
                client: sources.http().clone(),
                endpoint: descriptor.query.clone(),
                timeout,
            }),
        }
    }

    pub async fn current_version(&self) -> Option<i64> {
        match self {
            VersionChecker::Database { db, query, timeout } => {
                let stmt = Statement::from_string(db.get_database_backend(), query.clone());
                match tokio::time::timeout(*timeout, db.query_one(stmt)).await {
                    Ok(Ok(Some(row))) => scalar_i64(&row),
                    Ok(Ok(None)) => {
                        tracing::debug!(query = %query, "Version query returned no row");
                        None
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(error = %e, "Version query failed");
                        None
                    }
                    Err(_) => {
                        tracing::debug!(?timeout, "Version query timed out");
                        None
                    }
                }
            }
            VersionChecker::Http {
                client,
                endpoint,
                timeout,
            } => {
                let body = tokio::time::timeout(*timeout, fetch_body(client, endpoint))
                    .await
                    .ok()
                    .flatten()?;
                parse_version(&body)
            }
        }
    }

    pub async fn is_available(&self) -> bool {
        match self {
            VersionChecker::Database { db, timeout, .. } => {
                matches!(tokio::time::timeout(*timeout, db.ping()).await, Ok(Ok(())))
            }
            VersionChecker::Http {
                client,
                endpoint,
                timeout,
            } => tokio::time::timeout(*timeout, fetch_body(client, endpoint))
                .await
                .ok()
                .flatten()
                .is_some(),
        }
    }

    pub fn description(&self) -> String {
        match self {
            VersionChecker::Database { query, .. } => {
                format!("database version checker running `{query}`")
            }
            VersionChecker::Http { endpoint, .. } => {
                format!("API version checker calling {endpoint}")
            }
        }
    }
}

/// Non-empty body of a successful GET, or `None`.
async fn fetch_body(client: &reqwest::Client, endpoint: &str) -> Option<String> {
    let resp = match client.get(endpoint).send().await.and_then(|r| r.error_for_status()) {
        Ok(resp) => resp,
        Err(e) => {
            tracing::debug!(endpoint, error = %e, "Version API call failed");
            return None;
        }
    };
    let body = resp.text().await.ok()?;
    if body.trim().is_empty() {
        tracing::debug!(endpoint, "Empty response from version API");
        return None;
    }
    Some(body)
}

/// Decode `{ "data": <i64> }`; null, absent or unparseable data is `None`.
pub fn parse_version(body: &str) -> Option<i64> {
    match serde_json::from_str::<ApiEnvelope<i64>>(body) {
        Ok(envelope) => envelope.data,
        Err(e) => {
            tracing::debug!(error = %e, "Unparseable version response");
            None
        }
    }
}

fn scalar_i64(row: &QueryResult) -> Option<i64> {
    row.try_get_by_index::<i64>(0)
        .or_else(|_| row.try_get_by_index::<i32>(0).map(i64::from))
        .map_err(|e| tracing::debug!(error = %e, "Version column is not an integer"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version(r#"{"code": 200, "data": 42}"#), Some(42));
        assert_eq!(parse_version(r#"{"data": null}"#), None);
        assert_eq!(parse_version(r#"{}"#), None);
        assert_eq!(parse_version(r#"{"data": "forty-two"}"#), None);
        assert_eq!(parse_version("not json"), None);
    }

    #[tokio::test]
    async fn test_unreachable_api_folds_to_none() {
        let checker = VersionChecker::Http {
            client: reqwest::Client::new(),
            // Port 9 (discard) is closed on test hosts
            endpoint: "http://127.0.0.1:9/version".into(),
            timeout: Duration::from_secs(2),
        };
        assert_eq!(checker.current_version().await, None);
        assert!(!checker.is_available().await);
        assert!(checker.description().contains("http://127.0.0.1:9/version"));
    }
}
