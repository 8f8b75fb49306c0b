use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use policy_sync::policy::engine::PolicyEngine;
use policy_sync::policy::errors::PolicyError;
use policy_sync::policy::types::PolicyRule;

/// In-memory engine that counts calls and can be told to reject inserts.
#[derive(Default)]
pub struct RecordingEngine {
    rules: Mutex<Vec<PolicyRule>>,
    clears: AtomicUsize,
    adds: AtomicUsize,
    fail_adds: AtomicBool,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine preloaded with `rules`, as if a previous load had succeeded
    pub fn with_rules(rules: Vec<PolicyRule>) -> Self {
        let engine = Self::default();
        *engine.rules.lock().unwrap() = rules;
        engine
    }

    pub fn fail_adds(&self, fail: bool) {
        self.fail_adds.store(fail, Ordering::SeqCst);
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn rules(&self) -> Vec<PolicyRule> {
        self.rules.lock().unwrap().clone()
    }
}

#[async_trait]
impl PolicyEngine for RecordingEngine {
    async fn clear_rules(&self) -> Result<(), PolicyError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.rules.lock().unwrap().clear();
        Ok(())
    }

    async fn add_rules(&self, rules: &[PolicyRule]) -> Result<bool, PolicyError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.rules.lock().unwrap();
        if self.fail_adds.load(Ordering::SeqCst) {
            // Half the batch lands before the failure
            stored.extend_from_slice(&rules[..rules.len() / 2]);
            return Err(PolicyError::Engine("insert rejected".into()));
        }
        stored.extend_from_slice(rules);
        Ok(true)
    }

    async fn rule_count(&self) -> usize {
        self.rules.lock().unwrap().len()
    }

    async fn evaluate(&self, role: &str, resource: &str, action: &str) -> Result<bool, PolicyError> {
        Ok(self.rules.lock().unwrap().iter().any(|r| {
            r.role_id.to_string() == role && r.resource_code == resource && r.action_code == action
        }))
    }
}
