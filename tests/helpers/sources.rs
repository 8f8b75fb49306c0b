use std::sync::Arc;
use std::time::Duration;

use policy_sync::policy::loader::PolicyLoader;
use policy_sync::policy::rules::RuleSources;
use policy_sync::policy::types::ResourceFilter;
use policy_sync::policy::version::VersionChecker;
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn rule_sources(db: Option<DatabaseConnection>) -> RuleSources {
    RuleSources::new(db, reqwest::Client::new(), TIMEOUT)
}

pub fn loader(source: &str, resources: &[&str], db: Option<DatabaseConnection>) -> Arc<PolicyLoader> {
    Arc::new(PolicyLoader::new(
        source,
        ResourceFilter::new(resources.iter().copied()),
        rule_sources(db),
    ))
}

pub fn http_checker(endpoint: String) -> VersionChecker {
    VersionChecker::Http {
        client: reqwest::Client::new(),
        endpoint,
        timeout: TIMEOUT,
    }
}

/// `{"code": 200, "data": ...}` as returned by the auth service
pub fn envelope(data: Value) -> Value {
    json!({ "code": 200, "message": "ok", "data": data })
}

pub fn rule_json(id: i64, role_id: i64, resource: &str, action: &str) -> Value {
    json!({
        "id": id,
        "roleId": role_id,
        "resourceCode": resource,
        "actionCode": action,
    })
}

pub async fn mount_rules(server: &MockServer, rules: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/policies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(Value::Array(rules))))
        .mount(server)
        .await;
}

pub async fn mount_version(server: &MockServer, version: i64) {
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!(version))))
        .mount(server)
        .await;
}

/// Replace every mock on `server` with fresh rule and version responses
pub async fn remount(server: &MockServer, rules: Vec<Value>, version: i64) {
    server.reset().await;
    mount_rules(server, rules).await;
    mount_version(server, version).await;
}
