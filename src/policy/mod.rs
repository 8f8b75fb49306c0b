pub mod engine;
pub mod errors;
pub mod listener;
pub mod loader;
pub mod polling;
pub mod rules;
pub mod source;
pub mod types;
pub mod version;
pub mod web;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::settings::Policy;
use engine::PolicyEngine;
use errors::PolicyError;
use loader::PolicyLoader;
use polling::VersionPollingService;
use rules::RuleSources;
use source::SourceDescriptor;

/// Validate the policy source, perform the synchronous initial load and set
/// up version polling.
///
/// Any error here must abort startup: serving requests against an empty or
/// stale policy set is not acceptable.
pub async fn bootstrap(
    cfg: &Policy,
    db: Option<DatabaseConnection>,
    engine: Arc<dyn PolicyEngine>,
) -> Result<Arc<VersionPollingService>, PolicyError> {
    let source = SourceDescriptor::parse(&cfg.source)?;
    tracing::info!(source = %source, resources = ?cfg.resources, "Policy source configured");

    let timeout = cfg.fetch_timeout();
    let http = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PolicyError::Config(format!("failed to build HTTP client: {e}")))?;
    let sources = RuleSources::new(db, http, timeout);
    let loader = Arc::new(PolicyLoader::new(
        cfg.source.clone(),
        cfg.resource_filter(),
        sources,
    ));

    tracing::info!("Loading initial policies synchronously");
    let report = loader.load_policies(engine.as_ref()).await?;
    tracing::info!(rules = report.loaded, "Initial policies loaded");

    let polling = VersionPollingService::initialize(&cfg.polling, loader, engine, timeout).await;
    Ok(Arc::new(polling))
}
