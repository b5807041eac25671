//! Immutable response table snapshots
//!
//! A [`ResponseStore`] is built once from a responses document and never
//! mutated afterwards. Reloads produce a brand new store which the
//! [`watcher::ConfigWatcher`] publishes in a single swap.

pub mod document;
pub mod watcher;

use crate::common::FinishReason;
use config::StreamGranularity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub use document::{parse_document, DocumentError};

/// Decline text served when the document does not configure a default
pub const BUILTIN_DEFAULT_RESPONSE: &str = "I don't know the answer to that.";

/// Optional per-entry overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntryOverrides {
    /// Reported completion token count instead of the tokenizer's count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    /// Delay between streamed chunks, applied even when global lag is disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lag_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_granularity: Option<StreamGranularity>,
}

/// One configured key to response mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MockEntry {
    pub key: String,
    pub body: String,
    pub finish_reason: FinishReason,
    pub metadata: EntryOverrides,
}

impl MockEntry {
    pub fn new(key: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            body: body.into(),
            finish_reason: FinishReason::Stop,
            metadata: EntryOverrides::default(),
        }
    }

    pub fn with_finish_reason(mut self, finish_reason: FinishReason) -> Self {
        self.finish_reason = finish_reason;
        self
    }

    pub fn with_overrides(mut self, metadata: EntryOverrides) -> Self {
        self.metadata = metadata;
        self
    }

    /// Entries need a non-empty key and body to be served
    pub fn validate(&self) -> Result<(), String> {
        if self.key.is_empty() {
            return Err("entry key is empty".to_string());
        }
        if self.body.is_empty() {
            return Err(format!("entry '{}' has an empty body", self.key));
        }
        Ok(())
    }
}

/// What to do when a request matches no configured key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissPolicy {
    /// Serve the default entry as a normal completion
    #[default]
    Default,
    /// Answer with the dialect's not-found error envelope
    NotFound,
}

impl MissPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::NotFound => "not_found",
        }
    }
}

/// Simulated latency
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LagSettings {
    pub enabled: bool,
    pub chunk_delay_ms: u64,
    pub response_delay_ms: u64,
}

/// Document-level settings, swapped together with the entries they govern
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseSettings {
    pub lag: LagSettings,
    pub on_miss: MissPolicy,
}

impl ResponseSettings {
    pub fn chunk_delay(&self, entry: &MockEntry) -> Duration {
        match entry.metadata.lag_ms {
            Some(ms) => Duration::from_millis(ms),
            None if self.lag.enabled => Duration::from_millis(self.lag.chunk_delay_ms),
            None => Duration::ZERO,
        }
    }

    pub fn response_delay(&self) -> Duration {
        if self.lag.enabled {
            Duration::from_millis(self.lag.response_delay_ms)
        } else {
            Duration::ZERO
        }
    }
}

/// Immutable snapshot of the response table
#[derive(Debug, Clone)]
pub struct ResponseStore {
    entries: Vec<MockEntry>,
    index: HashMap<String, usize>,
    default_entry: MockEntry,
    settings: ResponseSettings,
    version: u64,
    fingerprint: String,
}

impl ResponseStore {
    /// Build a store from already validated entries. Duplicate keys keep the
    /// position of the first occurrence and the content of the last one.
    pub fn new(
        entries: impl IntoIterator<Item = MockEntry>,
        default_entry: MockEntry,
        settings: ResponseSettings,
    ) -> Self {
        let mut ordered: Vec<MockEntry> = Vec::new();
        let mut index = HashMap::new();

        for entry in entries {
            match index.get(&entry.key) {
                Some(&position) => {
                    warn!(key = %entry.key, "Duplicate mock response key, last definition wins");
                    ordered[position] = entry;
                }
                None => {
                    index.insert(entry.key.clone(), ordered.len());
                    ordered.push(entry);
                }
            }
        }

        Self {
            entries: ordered,
            index,
            default_entry,
            settings,
            version: 0,
            fingerprint: String::new(),
        }
    }

    /// Store with no entries that answers everything with the built-in decline
    pub fn empty() -> Self {
        Self::new(
            Vec::new(),
            MockEntry::new("default", BUILTIN_DEFAULT_RESPONSE),
            ResponseSettings::default(),
        )
    }

    pub(crate) fn stamped(mut self, version: u64, fingerprint: String) -> Self {
        self.version = version;
        self.fingerprint = fingerprint;
        self
    }

    /// Entry for `key`, or the default entry when the key is unknown
    pub fn lookup(&self, key: &str) -> &MockEntry {
        self.get(key).unwrap_or(&self.default_entry)
    }

    pub fn get(&self, key: &str) -> Option<&MockEntry> {
        self.index.get(key).map(|&position| &self.entries[position])
    }

    pub fn entries(&self) -> &[MockEntry] {
        &self.entries
    }

    pub fn default_entry(&self) -> &MockEntry {
        &self.default_entry
    }

    pub fn settings(&self) -> &ResponseSettings {
        &self.settings
    }

    /// Monotonic version assigned on publish; 0 for stores never published
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Hex SHA-256 of the document this store was parsed from
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reading or parsing the responses document failed.
///
/// Fatal when it happens at startup; after startup the watcher logs it and
/// keeps serving the previous snapshot.
#[derive(Debug, thiserror::Error)]
pub enum ConfigSourceError {
    #[error("failed to read responses document {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid responses document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    #[error("config watcher is not running")]
    WatcherStopped,
}
