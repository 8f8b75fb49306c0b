use std::collections::HashSet;

use tokio::sync::Mutex;

use crate::policy::engine::PolicyEngine;
use crate::policy::errors::PolicyError;
use crate::policy::rules::RuleSources;
use crate::policy::source::{SourceDescriptor, SourceKind};
use crate::policy::types::{PolicyRule, ResourceFilter};

/// Outcome of one successful reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub source_kind: SourceKind,
    /// Rules returned by the source after filtering
    pub fetched: usize,
    /// Rules handed to the engine after de-duplication
    pub loaded: usize,
}

/// Fetches the configured rule set and swaps it into an engine.
///
/// Reloads are serialized: the scheduler tick, the invalidation listener and
/// manual reloads all queue on the same lock, so two clear/insert sequences
/// never interleave.
pub struct PolicyLoader {
    source: String,
    filter: ResourceFilter,
    sources: RuleSources,
    reload_lock: Mutex<()>,
}

impl PolicyLoader {
    pub fn new(source: impl Into<String>, filter: ResourceFilter, sources: RuleSources) -> Self {
        Self {
            source: source.into(),
            filter,
            sources,
            reload_lock: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn filter(&self) -> &ResourceFilter {
        &self.filter
    }

    pub fn sources(&self) -> &RuleSources {
        &self.sources
    }

    /// Parse the source, fetch every rule, then clear and repopulate `engine`.
    ///
    /// The fetch completes before the engine is touched. If insertion fails
    /// after the clear, the engine is left empty (every check denies) and the
    /// error is returned.
    pub async fn load_policies(&self, engine: &dyn PolicyEngine) -> Result<LoadReport, PolicyError> {
        let _guard = self.reload_lock.lock().await;

        tracing::info!(
            source = %self.source,
            resources = ?self.filter.codes(),
            "Starting policy load"
        );

        let descriptor = SourceDescriptor::parse(&self.source)?;
        let fetched = self
            .sources
            .fetch(&descriptor, &self.filter)
            .await
            .inspect_err(|e| {
                tracing::error!(source = %descriptor, error = %e, "Failed to fetch policy rules")
            })?;

        let fetched_count = fetched.len();
        let rules = dedupe(fetched);
        if rules.len() < fetched_count {
            tracing::debug!(
                duplicates = fetched_count - rules.len(),
                "Dropped duplicate policy rules"
            );
        }

        replace_rules(engine, &rules).await?;

        tracing::info!(
            kind = %descriptor.kind,
            count = rules.len(),
            "Policy load completed"
        );

        Ok(LoadReport {
            source_kind: descriptor.kind,
            fetched: fetched_count,
            loaded: rules.len(),
        })
    }
}

/// Keep the first occurrence of each (role, resource, action) grant.
pub fn dedupe(rules: Vec<PolicyRule>) -> Vec<PolicyRule> {
    let mut seen = HashSet::new();
    rules
        .into_iter()
        .filter(|r| {
            let (role_id, resource, action) = r.grant_key();
            seen.insert((role_id, resource.to_string(), action.to_string()))
        })
        .collect()
}

async fn replace_rules(engine: &dyn PolicyEngine, rules: &[PolicyRule]) -> Result<(), PolicyError> {
    engine.clear_rules().await?;

    if rules.is_empty() {
        tracing::info!("No policies to load");
        return Ok(());
    }

    match engine.add_rules(rules).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::warn!(count = rules.len(), "Engine reported that not every policy was added");
            Ok(())
        }
        Err(e) => {
            // Fail closed: drop whatever part of the batch made it in
            if let Err(clear_err) = engine.clear_rules().await {
                tracing::error!(error = %clear_err, "Failed to clear engine after insert failure");
            }
            tracing::error!(error = %e, "Failed to insert policies; engine left empty");
            Err(e)
        }
    }
}
