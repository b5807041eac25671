#![allow(dead_code)]

use api::{build_app, AppState};
use config::{DialectsConfig, StreamGranularity, TokenizerKind};
use services::{ConfigWatcher, SnapshotHandle, TokenizerRegistry, WatcherHandle};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

pub const RESPONSES: &str = r#"
responses:
  hello: "Hello, world!"
  "what colour is the sky?":
    body: "The sky is blue during a clear day."
    finish_reason: length
  spelled:
    body: "abc"
    stream_granularity: character
defaults:
  unknown_response: "I don't know the answer to that."
"#;

pub const DEFAULT_RESPONSE: &str = "I don't know the answer to that.";

/// Running server over a temporary responses document
pub struct TestContext {
    pub server: axum_test::TestServer,
    pub snapshots: SnapshotHandle,
    pub file: NamedTempFile,
    pub watcher: WatcherHandle,
}

impl TestContext {
    /// Replace the responses document atomically so the poller never sees a
    /// half-written file
    pub fn write_responses(&self, content: &str) {
        let staged = self.file.path().with_extension("staged");
        std::fs::write(&staged, content).expect("Failed to stage responses file");
        std::fs::rename(&staged, self.file.path()).expect("Failed to replace responses file");
    }
}

/// Dialect settings that need no BPE data
pub fn test_dialects() -> DialectsConfig {
    let mut dialects = DialectsConfig::default();
    dialects.openai.tokenizer = TokenizerKind::Whitespace;
    dialects.openai.stream_granularity = StreamGranularity::Word;
    dialects.anthropic.tokenizer = TokenizerKind::Whitespace;
    dialects.anthropic.stream_granularity = StreamGranularity::Word;
    dialects
}

pub fn setup_test_server_with(content: &str) -> TestContext {
    let mut file = NamedTempFile::new().expect("Failed to create responses file");
    file.write_all(content.as_bytes())
        .expect("Failed to write responses file");
    file.flush().expect("Failed to flush responses file");

    let (watcher, snapshots) = ConfigWatcher::load(file.path(), Duration::from_millis(20))
        .expect("Failed to load responses file");
    let watcher = watcher.spawn();

    let dialects = test_dialects();
    let tokenizers = TokenizerRegistry::from_config(&dialects);
    let app_state =
        AppState::new(snapshots.clone(), tokenizers, &dialects).with_reload(watcher.trigger());

    let server = axum_test::TestServer::new(build_app(app_state)).unwrap();
    TestContext {
        server,
        snapshots,
        file,
        watcher,
    }
}

pub fn setup_test_server() -> TestContext {
    setup_test_server_with(RESPONSES)
}

/// `data:` payloads of an SSE body, in order
pub fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim_start().to_string())
        .collect()
}

/// `event:` names of an SSE body, in order
pub fn sse_events(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("event:"))
        .map(|event| event.trim_start().to_string())
        .collect()
}

/// Poll until the served snapshot reaches `version`
pub async fn wait_for_version(snapshots: &SnapshotHandle, version: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while snapshots.current().version() < version {
        assert!(
            tokio::time::Instant::now() < deadline,
            "snapshot never reached version {version}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
