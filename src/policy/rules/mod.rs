//! Rule loaders, one per source kind, behind a single dispatch.

pub mod database;
pub mod file;
pub mod http;

use std::time::Duration;

use sea_orm::DatabaseConnection;

use crate::policy::errors::PolicyError;
use crate::policy::source::{SourceDescriptor, SourceKind};
use crate::policy::types::{PolicyRule, ResourceFilter};

/// Transport handles shared by the rule loaders.
#[derive(Debug, Clone)]
pub struct RuleSources {
    db: Option<DatabaseConnection>,
    http: reqwest::Client,
    timeout: Duration,
}

impl RuleSources {
    pub fn new(db: Option<DatabaseConnection>, http: reqwest::Client, timeout: Duration) -> Self {
        Self { db, http, timeout }
    }

    pub fn database(&self) -> Option<&DatabaseConnection> {
        self.db.as_ref()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Fetch the complete rule set for `source`, or fail. Never returns a partial set.
    pub async fn fetch(
        &self,
        source: &SourceDescriptor,
        filter: &ResourceFilter,
    ) -> Result<Vec<PolicyRule>, PolicyError> {
        let load = async {
            match source.kind {
                SourceKind::Database => {
                    let db = self.db.as_ref().ok_or_else(|| {
                        PolicyError::Config(
                            "database policy source configured without database.url".into(),
                        )
                    })?;
                    database::load_rules(db, &source.query, filter).await
                }
                SourceKind::File => file::load_rules(&source.query, filter).await,
                SourceKind::Http => http::load_rules(&self.http, &source.query, filter).await,
            }
        };

        let rules = tokio::time::timeout(self.timeout, load)
            .await
            .map_err(|_| {
                PolicyError::unavailable(
                    source.kind.prefix(),
                    format!("timed out after {:?}", self.timeout),
                )
            })??;

        Ok(filter.apply(rules))
    }
}
