use std::time::Duration;

use migration::MigratorTrait;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};

use crate::errors::SyncError;
use crate::settings::Database as DbCfg;

/// Connect to the configured database, if any.
///
/// File and HTTP deployments run without a database, so a missing url is not
/// an error here; the policy module rejects `database:` sources without one.
pub async fn init(cfg: &DbCfg) -> Result<Option<DatabaseConnection>, SyncError> {
    let Some(url) = cfg.url.as_deref() else {
        tracing::info!("No database configured");
        return Ok(None);
    };

    let mut opts = ConnectOptions::new(url.to_string());
    opts.connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    let db = Database::connect(opts).await?;
    tracing::info!(backend = ?db.get_database_backend(), "Connected to database");
    Ok(Some(db))
}

/// Apply pending schema migrations (policy_rules, auth_version).
pub async fn migrate(db: &DatabaseConnection) -> Result<(), SyncError> {
    migration::Migrator::up(db, None).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
