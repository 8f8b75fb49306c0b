#![allow(dead_code)]

pub mod db;
pub mod engine;
pub mod sources;

pub use db::TestDb;
pub use engine::RecordingEngine;
