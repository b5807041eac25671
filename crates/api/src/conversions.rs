use crate::models::*;
use axum::http::HeaderMap;
use services::{Dialect, NormalizedRequest, Role, Turn};

/// Header that selects a response key directly, bypassing message matching
pub const MOCK_KEY_HEADER: &str = "x-mock-key";

pub fn mock_key_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(MOCK_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn generate_completion_id(prefix: &str) -> String {
    format!("{prefix}{}", uuid::Uuid::new_v4().simple())
}

pub fn current_unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============================================================================
// HTTP to service conversions
// ============================================================================

impl MessageContent {
    /// Text parts concatenated in order
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    MessageContentPart::Text { text } => Some(text.as_str()),
                    MessageContentPart::Other => None,
                })
                .collect(),
        }
    }
}

fn block_text(blocks: &[AnthropicContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(text.as_str()),
            AnthropicContentBlock::Other => None,
        })
        .collect()
}

impl AnthropicContent {
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => block_text(blocks),
        }
    }
}

impl SystemPrompt {
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => block_text(blocks),
        }
    }
}

impl ChatCompletionRequest {
    pub fn to_normalized(&self, mock_key: Option<String>) -> NormalizedRequest {
        let turns = self
            .messages
            .iter()
            .map(|message| {
                Turn::new(
                    Role::parse(&message.role),
                    message
                        .content
                        .as_ref()
                        .map(MessageContent::text)
                        .unwrap_or_default(),
                )
            })
            .collect();

        NormalizedRequest::new(Dialect::OpenAi, self.model.clone(), turns)
            .streaming(self.stream.unwrap_or(false))
            .with_mock_key(mock_key)
    }
}

impl MessagesRequest {
    pub fn to_normalized(&self, mock_key: Option<String>) -> NormalizedRequest {
        // The system prompt is a top-level field here; it becomes the first turn
        let system = self
            .system
            .as_ref()
            .map(|system| Turn::new(Role::System, system.text()));

        let turns = system
            .into_iter()
            .chain(
                self.messages
                    .iter()
                    .map(|message| Turn::new(Role::parse(&message.role), message.content.text())),
            )
            .collect();

        NormalizedRequest::new(Dialect::Anthropic, self.model.clone(), turns)
            .streaming(self.stream.unwrap_or(false))
            .with_mock_key(mock_key)
    }
}
