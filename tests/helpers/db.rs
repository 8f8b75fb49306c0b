use migration::MigratorTrait;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use tempfile::NamedTempFile;

/// Version query matching the seeded `auth_version` row
pub const VERSION_QUERY: &str =
    "SELECT version FROM auth_version WHERE code = 'policy_version'";

/// Rule query over the migrated `policy_rules` table
pub const RULES_QUERY: &str =
    "SELECT id, role_id, resource_code, action_code FROM policy_rules";

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        // Connect to database
        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        // Run migrations
        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// Insert one rule row
    pub async fn insert_rule(&self, role_id: i64, resource_code: &str, action_code: &str) {
        self.connection
            .execute(Statement::from_sql_and_values(
                DbBackend::Sqlite,
                "INSERT INTO policy_rules (role_id, resource_code, action_code) VALUES (?, ?, ?)",
                [role_id.into(), resource_code.into(), action_code.into()],
            ))
            .await
            .expect("Failed to insert policy rule");
    }

    /// Overwrite the seeded policy version
    pub async fn set_version(&self, version: i64) {
        self.connection
            .execute(Statement::from_sql_and_values(
                DbBackend::Sqlite,
                "UPDATE auth_version SET version = ? WHERE code = ?",
                [version.into(), migration::POLICY_VERSION_CODE.into()],
            ))
            .await
            .expect("Failed to update policy version");
    }
}
