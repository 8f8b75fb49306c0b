//! policy-sync - keeps an in-memory RBAC policy set in sync with its source
//! of truth (database table, csv resource or HTTP endpoint).
//!
//! It exposes all modules for testing purposes.

pub mod errors;
pub mod jobs;
pub mod policy;
pub mod settings;
pub mod storage;
pub mod web;
