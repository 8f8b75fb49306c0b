mod helpers;

use helpers::sources::{envelope, http_checker, rule_json, rule_sources};
use policy_sync::policy::errors::PolicyError;
use policy_sync::policy::rules::http::RESOURCE_PARAM;
use policy_sync::policy::source::SourceDescriptor;
use policy_sync::policy::types::{PolicyRule, ResourceFilter};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_source(server: &MockServer) -> SourceDescriptor {
    SourceDescriptor::parse(&format!("api:{}/policies", server.uri())).unwrap()
}

#[tokio::test]
async fn test_api_source_sends_resource_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/policies"))
        .and(query_param(RESOURCE_PARAM, "user,order"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            rule_json(1, 1, "user", "read"),
            rule_json(2, 2, "order", "read"),
        ]))))
        .expect(1)
        .mount(&server)
        .await;

    let rules = rule_sources(None)
        .fetch(&api_source(&server), &ResourceFilter::new(["user", "order"]))
        .await
        .expect("fetch should succeed");

    assert_eq!(
        rules,
        vec![
            PolicyRule::new(1, 1, "user", "read"),
            PolicyRule::new(2, 2, "order", "read"),
        ]
    );
}

#[tokio::test]
async fn test_api_source_drops_invalid_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/policies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            rule_json(1, 1, "user", "read"),
            { "id": 2, "resourceCode": "user", "actionCode": "write" },
            rule_json(3, 3, "", "read"),
            rule_json(4, 4, "order", "  "),
            "not an object",
        ]))))
        .mount(&server)
        .await;

    let rules = rule_sources(None)
        .fetch(&api_source(&server), &ResourceFilter::default())
        .await
        .unwrap();

    assert_eq!(rules, vec![PolicyRule::new(1, 1, "user", "read")]);
}

#[tokio::test]
async fn test_api_source_filters_rules_the_server_did_not() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/policies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            rule_json(1, 1, "user", "read"),
            rule_json(2, 2, "invoice", "read"),
        ]))))
        .mount(&server)
        .await;

    let rules = rule_sources(None)
        .fetch(&api_source(&server), &ResourceFilter::new(["user"]))
        .await
        .unwrap();

    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].resource_code, "user");
}

#[tokio::test]
async fn test_api_source_null_data_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/policies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!(null))))
        .mount(&server)
        .await;

    let rules = rule_sources(None)
        .fetch(&api_source(&server), &ResourceFilter::default())
        .await
        .unwrap();
    assert!(rules.is_empty());
}

#[tokio::test]
async fn test_api_source_server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/policies"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = rule_sources(None)
        .fetch(&api_source(&server), &ResourceFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::SourceUnavailable { .. }));
}

#[tokio::test]
async fn test_api_source_bad_envelope_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/policies"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = rule_sources(None)
        .fetch(&api_source(&server), &ResourceFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::MalformedRuleData(_)));
}

#[tokio::test]
async fn test_http_version_checker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!(42))))
        .mount(&server)
        .await;

    let checker = http_checker(format!("{}/version", server.uri()));
    assert!(checker.is_available().await);
    assert_eq!(checker.current_version().await, Some(42));
}

#[tokio::test]
async fn test_http_version_checker_failures_are_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/null"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!(null))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let null = http_checker(format!("{}/null", server.uri()));
    assert_eq!(null.current_version().await, None);
    // A reachable endpoint with a null version still counts as available
    assert!(null.is_available().await);

    let empty = http_checker(format!("{}/empty", server.uri()));
    assert_eq!(empty.current_version().await, None);
    assert!(!empty.is_available().await);

    let down = http_checker(format!("{}/down", server.uri()));
    assert_eq!(down.current_version().await, None);
    assert!(!down.is_available().await);
}
