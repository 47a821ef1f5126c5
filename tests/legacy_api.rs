#![allow(clippy::unwrap_used)]
// Integration tests for `LegacyApi` using wiremock.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use simplisafe_bridge::{
    ApiGeneration, BridgeError, BusAlarmState, LegacyApi, RemoteAlarmApi, RemoteCommand,
    SessionConfig, SessionState, to_bus_vocabulary,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, LegacyApi) {
    let server = MockServer::start().await;
    let config = SessionConfig::builder()
        .generation(ApiGeneration::Legacy)
        .base_url(format!("{}/mobile", server.uri()))
        .build();
    let api = LegacyApi::new(&config).unwrap();
    (server, api)
}

fn password() -> SecretString {
    "hunter2".to_string().into()
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/mobile/login"))
        .and(body_string_contains("version=1200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "return_code": 1,
            "session": "0123456789abcdef",
            "uid": 1234,
            "username": "me@example.com"
        })))
        .mount(server)
        .await;
}

async fn mount_locations(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/mobile/1234/locations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

// ── Authentication tests ────────────────────────────────────────────

#[tokio::test]
async fn test_login_success() {
    let (server, api) = setup().await;
    mount_login(&server).await;

    api.login("me@example.com", &password()).await.unwrap();

    assert_eq!(api.session().state().await, SessionState::Authenticated);
    assert_eq!(api.session().identity().await.unwrap().0, "1234");
}

#[tokio::test]
async fn test_login_failure() {
    let (server, api) = setup().await;

    Mock::given(method("POST"))
        .and(path("/mobile/login"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let result = api.login("me@example.com", &password()).await;
    assert!(
        matches!(result, Err(BridgeError::Auth { .. })),
        "expected Auth error, got: {result:?}"
    );
    assert_eq!(api.session().state().await, SessionState::Failed);
}

#[tokio::test]
async fn test_login_without_uid_is_rejected() {
    let (server, api) = setup().await;

    Mock::given(method("POST"))
        .and(path("/mobile/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "return_code": 0,
            "session": "",
            "uid": ""
        })))
        .mount(&server)
        .await;

    let result = api.login("me@example.com", &password()).await;
    assert!(matches!(result, Err(BridgeError::Auth { .. })), "{result:?}");
}

#[tokio::test]
async fn test_slow_login_times_out() {
    let server = MockServer::start().await;
    let config = SessionConfig::builder()
        .generation(ApiGeneration::Legacy)
        .base_url(format!("{}/mobile", server.uri()))
        .request_timeout_ms(300)
        .build();
    let api = LegacyApi::new(&config).unwrap();

    Mock::given(method("POST"))
        .and(path("/mobile/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "session": "abc", "uid": 1234 }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let result = api.login("me@example.com", &password()).await;
    assert!(
        matches!(result, Err(BridgeError::Transport(_))),
        "expected Transport error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_fetch_before_login_is_not_ready() {
    let (server, api) = setup().await;

    let result = api.fetch_status().await;
    assert!(matches!(result, Err(BridgeError::NotReady { .. })), "{result:?}");
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ── Status tests ────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_status() {
    let (server, api) = setup().await;
    mount_login(&server).await;
    mount_locations(
        &server,
        json!({
            "num_locations": 1,
            "locations": { "4321": { "system_state": "Home" } }
        }),
    )
    .await;

    api.login("me@example.com", &password()).await.unwrap();
    let site = api.fetch_status().await.unwrap();

    assert_eq!(site.id, "4321");
    assert_eq!(to_bus_vocabulary(&site.state), BusAlarmState::Home);
}

#[tokio::test]
async fn test_first_location_wins() {
    let (server, api) = setup().await;
    mount_login(&server).await;
    mount_locations(
        &server,
        json!({
            "num_locations": 2,
            "locations": {
                "900": { "system_state": "Away" },
                "100": { "system_state": "Off" }
            }
        }),
    )
    .await;

    api.login("me@example.com", &password()).await.unwrap();
    let site = api.fetch_status().await.unwrap();

    assert_eq!(site.id, "900");
    assert_eq!(to_bus_vocabulary(&site.state), BusAlarmState::Away);
}

#[tokio::test]
async fn test_no_locations() {
    let (server, api) = setup().await;
    mount_login(&server).await;
    mount_locations(&server, json!({ "num_locations": 0, "locations": [] })).await;

    api.login("me@example.com", &password()).await.unwrap();
    let result = api.fetch_status().await;

    assert!(matches!(result, Err(BridgeError::NoSite)), "{result:?}");
}

#[tokio::test]
async fn test_null_locations() {
    let (server, api) = setup().await;
    mount_login(&server).await;
    mount_locations(&server, json!({ "num_locations": 0, "locations": null })).await;

    api.login("me@example.com", &password()).await.unwrap();
    let result = api.fetch_status().await;

    assert!(matches!(result, Err(BridgeError::NoSite)), "{result:?}");
}

#[tokio::test]
async fn test_location_list_with_entries_is_rejected() {
    let (server, api) = setup().await;
    mount_login(&server).await;
    mount_locations(
        &server,
        json!({ "num_locations": 1, "locations": [{ "system_state": "Home" }] }),
    )
    .await;

    api.login("me@example.com", &password()).await.unwrap();
    let result = api.fetch_status().await;

    assert!(matches!(result, Err(BridgeError::Parse { .. })), "{result:?}");
}

#[tokio::test]
async fn test_malformed_locations() {
    let (server, api) = setup().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/mobile/1234/locations"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    api.login("me@example.com", &password()).await.unwrap();
    let result = api.fetch_status().await;

    match result {
        Err(BridgeError::Parse { details }) => assert!(details.contains("maintenance")),
        other => panic!("expected Parse error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_fails_fast_afterwards() {
    let (server, api) = setup().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/mobile/1234/locations"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    api.login("me@example.com", &password()).await.unwrap();

    let first = api.fetch_status().await;
    assert!(matches!(first, Err(BridgeError::Auth { .. })), "{first:?}");
    assert_eq!(api.session().state().await, SessionState::Failed);

    // No second request reaches the server until a new login.
    let second = api.fetch_status().await;
    assert!(matches!(second, Err(BridgeError::Auth { .. })), "{second:?}");
}

// ── Command tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_set_state() {
    let (server, api) = setup().await;
    mount_login(&server).await;
    mount_locations(
        &server,
        json!({ "num_locations": 1, "locations": { "4321": { "system_state": "Off" } } }),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/mobile/1234/sid/4321/set-state"))
        .and(body_string_contains("state=away"))
        .and(body_string_contains("mobile=1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    api.login("me@example.com", &password()).await.unwrap();
    let site = api.fetch_status().await.unwrap();
    api.set_state(&site, RemoteCommand::Away).await.unwrap();
}

#[tokio::test]
async fn test_set_state_rejected() {
    let (server, api) = setup().await;
    mount_login(&server).await;
    mount_locations(
        &server,
        json!({ "num_locations": 1, "locations": { "4321": { "system_state": "Off" } } }),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/mobile/1234/sid/4321/set-state"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    api.login("me@example.com", &password()).await.unwrap();
    let site = api.fetch_status().await.unwrap();
    let result = api.set_state(&site, RemoteCommand::Home).await;

    assert!(
        matches!(result, Err(BridgeError::Status { status: 500, .. })),
        "{result:?}"
    );
}
