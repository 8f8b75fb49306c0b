use miette::Diagnostic;
use thiserror::Error;

use crate::policy::errors::PolicyError;

#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error("Database error: {0}")]
    #[diagnostic(code(policy_sync::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Scheduler error: {0}")]
    #[diagnostic(code(policy_sync::scheduler))]
    Scheduler(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Policy(#[from] PolicyError),
}

