// ABOUTME: Tests for the execution client against a mocked sandbox server
// ABOUTME: Covers auth headers, error surfacing, decoding and health probes

use agentrt_sandbox::{ContentKind, ExecutionClient, SandboxError};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, token: Option<&str>) -> ExecutionClient {
    ExecutionClient::new(
        &server.uri(),
        token.map(str::to_string),
        Duration::from_secs(5),
    )
    .expect("Failed to build client")
}

#[tokio::test]
async fn test_shell_command_with_token_sends_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/run_shell_command"))
        .and(header("authorization", "Bearer tok"))
        .and(body_json(json!({"command": "echo hi", "split_output": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "stdout", "text": "hi", "description": "Standard output"},
                {"type": "returncode", "text": "0"}
            ],
            "is_error": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server, Some("tok"))
        .run_shell_command("echo hi", true)
        .await
        .unwrap();

    assert!(!result.is_error);
    assert_eq!(result.text_of(&ContentKind::Stdout), Some("hi"));
    assert_eq!(result.text_of(&ContentKind::Returncode), Some("0"));
}

#[tokio::test]
async fn test_no_token_sends_no_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/run_ipython_cell"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "output", "text": "2"}],
            "is_error": false
        })))
        .mount(&server)
        .await;

    client(&server, None)
        .run_ipython_cell("print(1 + 1)", false)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_failing_program_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/run_ipython_cell"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "stderr", "text": "ZeroDivisionError"}],
            "is_error": true
        })))
        .mount(&server)
        .await;

    let result = client(&server, None)
        .run_ipython_cell("1/0", true)
        .await
        .unwrap();
    assert!(result.is_error);
    assert_eq!(
        result.text_of(&ContentKind::Stderr),
        Some("ZeroDivisionError")
    );
}

#[tokio::test]
async fn test_non_success_status_keeps_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/run_shell_command"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid token"))
        .mount(&server)
        .await;

    let err = client(&server, Some("wrong"))
        .run_shell_command("ls", false)
        .await
        .unwrap_err();

    match err {
        SandboxError::Http {
            endpoint,
            status,
            body,
        } => {
            assert!(endpoint.ends_with("/tools/run_shell_command"));
            assert_eq!(status, 401);
            assert_eq!(body, "Invalid token");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_unparsable_success_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/run_shell_command"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let err = client(&server, None)
        .run_shell_command("ls", false)
        .await
        .unwrap_err();

    match err {
        SandboxError::Decode { status, body, .. } => {
            assert_eq!(status, 200);
            assert_eq!(body, "<html>proxy</html>");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_health_check_accepts_plain_and_quoted_ok() {
    let plain = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&plain)
        .await;
    assert!(client(&plain, None).health_check().await);

    let quoted = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("OK")))
        .mount(&quoted)
        .await;
    assert!(client(&quoted, None).health_check().await);

    let unhealthy = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(503).set_body_string("OK"))
        .mount(&unhealthy)
        .await;
    assert!(!client(&unhealthy, None).health_check().await);
}

#[tokio::test]
async fn test_health_check_is_false_when_unreachable() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = ExecutionClient::new(&uri, None, Duration::from_secs(2)).unwrap();
    assert!(!client.health_check().await);

    let err = client.run_shell_command("ls", false).await.unwrap_err();
    assert!(matches!(err, SandboxError::Transport { .. }));
}

#[tokio::test]
async fn test_health_status_returns_map() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "healthy",
            "version": "1.0.0",
            "service": "sandbox-server"
        })))
        .mount(&server)
        .await;

    let status = client(&server, None).health_status().await.unwrap();
    assert_eq!(status["status"], "healthy");
    assert_eq!(status["service"], "sandbox-server");
}
