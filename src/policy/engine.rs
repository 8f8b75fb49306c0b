//! The authorization engine seam.
//!
//! Rule storage and evaluation belong to the engine; this crate only decides
//! what it holds and when it is repopulated.

use async_trait::async_trait;
use casbin::{CoreApi, DefaultModel, Enforcer, MemoryAdapter, MgmtApi};
use tokio::sync::RwLock;

use crate::policy::errors::PolicyError;
use crate::policy::types::PolicyRule;

/// Role → resource → action, exact match on all three.
const MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
"#;

#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Remove every rule.
    async fn clear_rules(&self) -> Result<(), PolicyError>;

    /// Insert `rules` in one batch. `false` means the engine reported that not
    /// every rule was added.
    async fn add_rules(&self, rules: &[PolicyRule]) -> Result<bool, PolicyError>;

    async fn rule_count(&self) -> usize;

    async fn evaluate(&self, role: &str, resource: &str, action: &str)
        -> Result<bool, PolicyError>;
}

/// In-memory casbin enforcer.
pub struct CasbinEngine {
    enforcer: RwLock<Enforcer>,
}

impl CasbinEngine {
    pub async fn new() -> Result<Self, PolicyError> {
        let model = DefaultModel::from_str(MODEL).await?;
        let adapter = MemoryAdapter::default();
        let enforcer = Enforcer::new(model, adapter).await?;
        Ok(Self {
            enforcer: RwLock::new(enforcer),
        })
    }
}

#[async_trait]
impl PolicyEngine for CasbinEngine {
    async fn clear_rules(&self) -> Result<(), PolicyError> {
        self.enforcer.write().await.clear_policy().await?;
        Ok(())
    }

    async fn add_rules(&self, rules: &[PolicyRule]) -> Result<bool, PolicyError> {
        if rules.is_empty() {
            return Ok(true);
        }
        let rows = rules.iter().map(PolicyRule::to_engine_row).collect();
        let added = self.enforcer.write().await.add_policies(rows).await?;
        Ok(added)
    }

    async fn rule_count(&self) -> usize {
        self.enforcer.read().await.get_policy().len()
    }

    async fn evaluate(
        &self,
        role: &str,
        resource: &str,
        action: &str,
    ) -> Result<bool, PolicyError> {
        let allowed = self.enforcer.read().await.enforce((role, resource, action))?;
        Ok(allowed)
    }
}
