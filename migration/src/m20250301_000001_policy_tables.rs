use sea_orm_migration::{prelude::*, schema::*};

/// Version code the default deployment polls for.
pub const POLICY_VERSION_CODE: &str = "policy_version";

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create policy_rules table with backend-specific ID type
        let id_col = match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => ColumnDef::new(PolicyRules::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
            _ => ColumnDef::new(PolicyRules::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
        };

        manager
            .create_table(
                Table::create()
                    .table(PolicyRules::Table)
                    .if_not_exists()
                    .col(id_col)
                    .col(big_integer(PolicyRules::RoleId))
                    .col(string(PolicyRules::ResourceCode))
                    .col(string(PolicyRules::ActionCode))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_policy_rules_resource")
                    .table(PolicyRules::Table)
                    .col(PolicyRules::ResourceCode)
                    .to_owned(),
            )
            .await?;

        // One monotonic counter per code; writers bump it after changing policy_rules
        manager
            .create_table(
                Table::create()
                    .table(AuthVersion::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthVersion::Code)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(big_integer(AuthVersion::Version))
                    .to_owned(),
            )
            .await?;

        let seed = Query::insert()
            .into_table(AuthVersion::Table)
            .columns([AuthVersion::Code, AuthVersion::Version])
            .values_panic([POLICY_VERSION_CODE.into(), 1i64.into()])
            .to_owned();
        manager.exec_stmt(seed).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuthVersion::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PolicyRules::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PolicyRules {
    Table,
    Id,
    RoleId,
    ResourceCode,
    ActionCode,
}

#[derive(DeriveIden)]
enum AuthVersion {
    Table,
    Code,
    Version,
}
