//! VlmClient wire-level tests against a local mock endpoint.

use httpmock::prelude::*;

use screen_pilot::observe::{MockScreen, Observation, ScreenObserver};
use screen_pilot::vlm::{BackendConfig, ModelBackend, VlmClient, VlmError, check_health};

fn observation() -> Observation {
    MockScreen::new(32, 32).observe().unwrap()
}

#[test]
fn query_returns_completion_text() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("content-type", "application/json")
            .json_body_includes(r#"{"model": "ui-tars"}"#);
        then.status(200).json_body(serde_json::json!({
            "choices": [{"message": {"content": "(812, 454)"}}]
        }));
    });

    let client = VlmClient::new(
        BackendConfig::new(server.url("/v1/chat/completions")).model("ui-tars"),
    );
    let answer = client
        .query("Query:the gear icon", Some(&observation()))
        .unwrap();

    mock.assert();
    assert_eq!(answer, "(812, 454)");
}

#[test]
fn query_sends_bearer_token() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("authorization", "Bearer hf_secret");
        then.status(200).json_body(serde_json::json!({
            "choices": [{"message": {"content": "ok"}}]
        }));
    });

    let client = VlmClient::new(
        BackendConfig::new(server.url("/v1/chat/completions")).api_key("hf_secret"),
    );
    let answer = client.query("hello", None).unwrap();

    mock.assert();
    assert_eq!(answer, "ok");
}

#[test]
fn non_json_body_is_invalid_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200).body("<html>gateway error</html>");
    });

    let client = VlmClient::new(BackendConfig::new(server.url("/v1/chat/completions")));
    let err = client.query("hello", None).unwrap_err();
    assert!(matches!(err, VlmError::InvalidResponse(_)));
}

#[test]
fn empty_completion_is_invalid_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200).json_body(serde_json::json!({
            "choices": [{"message": {"content": ""}}]
        }));
    });

    let client = VlmClient::new(BackendConfig::new(server.url("/v1/chat/completions")));
    let err = client.query("hello", None).unwrap_err();
    assert!(matches!(err, VlmError::InvalidResponse(_)));
}

#[test]
fn health_check_sees_live_server() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.any_request();
        then.status(404);
    });

    // Any HTTP status counts as reachable
    let ok = check_health(
        &server.url("/v1/chat/completions"),
        std::time::Duration::from_secs(2),
    )
    .unwrap();
    assert!(ok);
}
