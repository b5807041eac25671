use crate::common::{Dialect, FinishReason};
use crate::responses::MissPolicy;
use config::StreamGranularity;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Unknown roles are treated as user input
    pub fn parse(role: &str) -> Self {
        match role {
            "system" | "developer" => Self::System,
            "assistant" => Self::Assistant,
            "tool" | "function" => Self::Tool,
            _ => Self::User,
        }
    }
}

/// One prior turn of the conversation, reduced to its text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }
}

/// Dialect-agnostic request handed over by the HTTP adapters
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub dialect: Dialect,
    pub model: String,
    pub turns: Vec<Turn>,
    pub stream: bool,
    /// Explicitly requested mock key, bypassing message matching
    pub mock_key: Option<String>,
}

impl NormalizedRequest {
    pub fn new(dialect: Dialect, model: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            dialect,
            model: model.into(),
            turns,
            stream: false,
            mock_key: None,
        }
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_mock_key(mut self, mock_key: Option<String>) -> Self {
        self.mock_key = mock_key;
        self
    }

    /// Explicit mock key if given, otherwise the most recent user turn.
    /// Empty when the conversation has no user turn.
    pub fn lookup_key(&self) -> &str {
        if let Some(key) = self.mock_key.as_deref() {
            return key;
        }
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::User)
            .map(|turn| turn.text.as_str())
            .unwrap_or_default()
    }

    /// Text that prompt token usage is counted over
    pub fn prompt_text(&self) -> String {
        self.turns
            .iter()
            .map(|turn| turn.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Whether the response came from a configured key or the default entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchSource {
    Matched { key: String },
    Default { key: String },
}

impl MatchSource {
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default { .. })
    }

    /// The key that was looked up
    pub fn key(&self) -> &str {
        match self {
            Self::Matched { key } | Self::Default { key } => key,
        }
    }
}

/// The response chosen for one request. Created per request, never cached.
#[derive(Debug, Clone)]
pub struct ResolvedResponse {
    pub body: String,
    pub finish_reason: FinishReason,
    /// Completion tokens, from the entry hint or the dialect tokenizer
    pub token_count: u32,
    pub prompt_tokens: u32,
    pub source: MatchSource,
    pub snapshot_version: u64,
    pub miss_policy: MissPolicy,
    pub chunk_delay: Duration,
    pub response_delay: Duration,
    pub granularity: Option<StreamGranularity>,
}

impl ResolvedResponse {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.token_count)
    }

    /// Default-resolved under a `not_found` miss policy
    pub fn is_rejected_miss(&self) -> bool {
        self.source.is_default() && self.miss_policy == MissPolicy::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_key_uses_most_recent_user_turn() {
        let request = NormalizedRequest::new(
            Dialect::OpenAi,
            "gpt-4",
            vec![
                Turn::new(Role::System, "be nice"),
                Turn::user("first"),
                Turn::new(Role::Assistant, "reply"),
                Turn::user("hello"),
                Turn::new(Role::Assistant, "trailing"),
            ],
        );
        assert_eq!(request.lookup_key(), "hello");
    }

    #[test]
    fn test_explicit_mock_key_wins() {
        let request = NormalizedRequest::new(Dialect::Anthropic, "claude", vec![Turn::user("hello")])
            .with_mock_key(Some("scripted".to_string()));
        assert_eq!(request.lookup_key(), "scripted");
    }

    #[test]
    fn test_no_user_turn_gives_empty_key() {
        let request = NormalizedRequest::new(
            Dialect::OpenAi,
            "gpt-4",
            vec![Turn::new(Role::System, "only system")],
        );
        assert_eq!(request.lookup_key(), "");
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("developer"), Role::System);
        assert_eq!(Role::parse("assistant"), Role::Assistant);
        assert_eq!(Role::parse("whatever"), Role::User);
    }
}
