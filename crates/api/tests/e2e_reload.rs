mod common;

use common::*;
use serde_json::{json, Value};

async fn ask(ctx: &TestContext, message: &str) -> String {
    let response = ctx
        .server
        .post("/v1/chat/completions")
        .json(&json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": message}]
        }))
        .await;
    let body: Value = response.json();
    body["choices"][0]["message"]["content"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_health_reports_snapshot_version() {
    let ctx = setup_test_server();

    let response = ctx.server.get("/health").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["responses_version"], 1);
    assert_eq!(body["responses"], 3);
}

#[tokio::test]
async fn test_list_responses_in_document_order() {
    let ctx = setup_test_server();

    let body: Value = ctx.server.get("/mock/responses").await.json();

    let keys: Vec<&str> = body["responses"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["hello", "what colour is the sky?", "spelled"]);
    assert_eq!(body["default_response"], DEFAULT_RESPONSE);
    assert_eq!(body["on_miss"], "default");
    assert_eq!(body["version"], 1);
    assert_eq!(body["fingerprint"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn test_polling_picks_up_edited_document() {
    let ctx = setup_test_server();
    assert_eq!(ask(&ctx, "hello").await, "Hello, world!");

    ctx.write_responses(
        r#"
responses:
  hello: "Hi there, reloaded!"
"#,
    );
    wait_for_version(&ctx.snapshots, 2).await;

    assert_eq!(ask(&ctx, "hello").await, "Hi there, reloaded!");
    // Removed keys now fall through to the built-in default
    assert_eq!(ask(&ctx, "spelled").await, DEFAULT_RESPONSE);
}

#[tokio::test]
async fn test_forced_reload_endpoint() {
    let ctx = setup_test_server();

    let body: Value = ctx.server.post("/mock/reload").await.json();
    assert_eq!(body["status"], "unchanged");
    assert_eq!(body["version"], 1);

    ctx.write_responses("responses:\n  hello: \"Forced\"\n");
    let response = ctx.server.post("/mock/reload").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    // The poller may have published the edit first
    if body["status"] == "reloaded" {
        assert_eq!(body["entries"], 1);
    } else {
        assert_eq!(body["status"], "unchanged");
    }
    assert_eq!(ctx.snapshots.current().version(), 2);
    assert_eq!(ask(&ctx, "hello").await, "Forced");
}

#[tokio::test]
async fn test_malformed_document_keeps_previous_snapshot() {
    let ctx = setup_test_server();

    ctx.write_responses("responses: [unterminated");
    let response = ctx.server.post("/mock/reload").await;

    assert_eq!(response.status_code(), 422);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "reload_error");

    assert_eq!(ctx.snapshots.current().version(), 1);
    assert_eq!(ask(&ctx, "hello").await, "Hello, world!");

    // A fixed document is picked up again
    ctx.write_responses("responses:\n  hello: \"Fixed\"\n");
    wait_for_version(&ctx.snapshots, 2).await;
    assert_eq!(ask(&ctx, "hello").await, "Fixed");
}

#[tokio::test]
async fn test_reload_after_watcher_shutdown() {
    let ctx = setup_test_server();
    let TestContext {
        server, watcher, ..
    } = ctx;

    watcher.shutdown().await;

    let response = server.post("/mock/reload").await;
    assert_eq!(response.status_code(), 503);

    // Requests keep resolving against the last snapshot
    let body: Value = server
        .post("/v1/chat/completions")
        .json(&json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hello"}]
        }))
        .await
        .json();
    assert_eq!(body["choices"][0]["message"]["content"], "Hello, world!");
}

#[tokio::test]
async fn test_openapi_document() {
    let ctx = setup_test_server();

    let body: Value = ctx.server.get("/api-docs/openapi.json").await.json();

    assert!(body["paths"]["/v1/chat/completions"]["post"].is_object());
    assert!(body["paths"]["/v1/messages"]["post"].is_object());
    assert!(body["paths"]["/health"]["get"].is_object());
}
