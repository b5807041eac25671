//! Responses document parsing
//!
//! The document is YAML. `responses` may be a mapping of key to entry or a
//! list of entries carrying their own `key`; an entry is either a bare string
//! (the body) or a mapping with `body` and optional overrides. Entries are
//! validated one by one so a single bad entry is dropped instead of failing
//! the whole document.

use super::{EntryOverrides, MockEntry, ResponseSettings, ResponseStore, BUILTIN_DEFAULT_RESPONSE};
use crate::common::FinishReason;
use config::StreamGranularity;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_yaml::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document is empty")]
    Empty,

    #[error("malformed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Hex SHA-256 of the raw document text
pub fn fingerprint(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Parse a responses document into an unpublished store
pub fn parse_document(content: &str) -> Result<ResponseStore, DocumentError> {
    if content.trim().is_empty() {
        return Err(DocumentError::Empty);
    }

    let raw: RawDocument = serde_yaml::from_str(content)?;

    let mut entries = Vec::with_capacity(raw.responses.0.len());
    for (position, (key, value)) in raw.responses.0.into_iter().enumerate() {
        match entry_from_yaml(key, value) {
            Ok(entry) => entries.push(entry),
            Err(reason) => {
                warn!(position, reason = %reason, "Dropping invalid mock response entry");
            }
        }
    }

    let default_entry = match raw.defaults.unknown_response {
        None => MockEntry::new("default", BUILTIN_DEFAULT_RESPONSE),
        Some(value) => match entry_from_yaml(Some(Value::String("default".to_string())), value) {
            Ok(entry) => entry,
            Err(reason) => {
                warn!(reason = %reason, "Invalid default response, using built-in decline");
                MockEntry::new("default", BUILTIN_DEFAULT_RESPONSE)
            }
        },
    };

    Ok(ResponseStore::new(entries, default_entry, raw.settings))
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    responses: RawResponses,
    #[serde(default)]
    defaults: RawDefaults,
    #[serde(default)]
    settings: ResponseSettings,
}

#[derive(Debug, Default, Deserialize)]
struct RawDefaults {
    #[serde(default)]
    unknown_response: Option<Value>,
}

/// Full form of an entry
#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    token_count: Option<u32>,
    #[serde(default)]
    lag_ms: Option<u64>,
    #[serde(default)]
    stream_granularity: Option<StreamGranularity>,
}

/// Entries in document order, before validation. The map key is `None` for
/// the list form.
#[derive(Debug, Default)]
struct RawResponses(Vec<(Option<Value>, Value)>);

impl<'de> Deserialize<'de> for RawResponses {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ResponsesVisitor;

        impl<'de> Visitor<'de> for ResponsesVisitor {
            type Value = RawResponses;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of key to response or a list of responses")
            }

            // Entries are collected one by one so duplicate keys reach the store
            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((key, value)) = map.next_entry::<Value, Value>()? {
                    entries.push((Some(key), value));
                }
                Ok(RawResponses(entries))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some(value) = seq.next_element::<Value>()? {
                    entries.push((None, value));
                }
                Ok(RawResponses(entries))
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(RawResponses::default())
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(RawResponses::default())
            }
        }

        deserializer.deserialize_any(ResponsesVisitor)
    }
}

fn scalar_key(value: Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("entry key must be a scalar, got {other:?}")),
    }
}

fn entry_from_yaml(map_key: Option<Value>, value: Value) -> Result<MockEntry, String> {
    let map_key = map_key.map(scalar_key).transpose()?;

    let entry = match value {
        Value::String(body) => {
            let key = map_key.ok_or("list entries need a `key` and a `body`")?;
            MockEntry::new(key, body)
        }
        value @ Value::Mapping(_) => {
            let raw: RawEntry =
                serde_yaml::from_value(value).map_err(|e| format!("invalid entry: {e}"))?;
            let key = map_key
                .or(raw.key)
                .ok_or("entry has no key")?;
            let body = raw
                .body
                .ok_or_else(|| format!("entry '{key}' has no body"))?;
            let finish_reason = match raw.finish_reason {
                Some(reason) => reason.parse::<FinishReason>()?,
                None => FinishReason::Stop,
            };
            MockEntry::new(key, body)
                .with_finish_reason(finish_reason)
                .with_overrides(EntryOverrides {
                    token_count: raw.token_count,
                    lag_ms: raw.lag_ms,
                    stream_granularity: raw.stream_granularity,
                })
        }
        other => return Err(format!("entry must be a string or a mapping, got {other:?}")),
    };

    entry.validate()?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responses::MissPolicy;

    const DOC: &str = r#"
responses:
  hello: "Hello, world!"
  "tell me more":
    body: "More text."
    finish_reason: length
    token_count: 3
    lag_ms: 20
    stream_granularity: character
defaults:
  unknown_response: "I don't know."
settings:
  lag:
    enabled: true
    chunk_delay_ms: 10
  on_miss: not_found
"#;

    #[test]
    fn test_parse_map_form() {
        let store = parse_document(DOC).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.lookup("hello").body, "Hello, world!");
        assert_eq!(store.lookup("hello").finish_reason, FinishReason::Stop);

        let more = store.lookup("tell me more");
        assert_eq!(more.finish_reason, FinishReason::Length);
        assert_eq!(more.metadata.token_count, Some(3));
        assert_eq!(more.metadata.lag_ms, Some(20));
        assert_eq!(
            more.metadata.stream_granularity,
            Some(StreamGranularity::Character)
        );

        assert_eq!(store.default_entry().body, "I don't know.");
        assert!(store.settings().lag.enabled);
        assert_eq!(store.settings().on_miss, MissPolicy::NotFound);
    }

    #[test]
    fn test_parse_list_form_with_duplicates() {
        let doc = r#"
responses:
  - key: hello
    body: first
  - key: other
    body: other body
  - key: hello
    body: second
"#;
        let store = parse_document(doc).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.lookup("hello").body, "second");
        assert_eq!(store.entries()[0].key, "hello");
    }

    #[test]
    fn test_duplicate_map_keys_do_not_fail_the_document() {
        let doc = "responses:\n  hello: one\n  hello: two\n";
        let store = parse_document(doc).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup("hello").body, "two");
    }

    #[test]
    fn test_invalid_entries_are_dropped() {
        let doc = r#"
responses:
  good: "fine"
  empty: ""
  no_body:
    finish_reason: stop
  bad_reason:
    body: "x"
    finish_reason: exploded
  nested: [1, 2]
  "": "empty key"
  42: "numeric key"
"#;
        let store = parse_document(doc).unwrap();
        let keys: Vec<_> = store.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["good", "42"]);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let store = parse_document("settings:\n  on_miss: default\n").unwrap();
        assert!(store.is_empty());
        assert_eq!(store.default_entry().body, BUILTIN_DEFAULT_RESPONSE);
        assert_eq!(store.settings().on_miss, MissPolicy::Default);
    }

    #[test]
    fn test_default_as_full_entry() {
        let doc = r#"
defaults:
  unknown_response:
    body: "Filtered."
    finish_reason: content_filter
"#;
        let store = parse_document(doc).unwrap();
        assert_eq!(store.default_entry().body, "Filtered.");
        assert_eq!(
            store.default_entry().finish_reason,
            FinishReason::ContentFilter
        );
    }

    #[test]
    fn test_invalid_default_falls_back_to_builtin() {
        let store = parse_document("defaults:\n  unknown_response: \"\"\n").unwrap();
        assert_eq!(store.default_entry().body, BUILTIN_DEFAULT_RESPONSE);
    }

    #[test]
    fn test_malformed_documents_are_rejected() {
        assert!(matches!(parse_document("   \n"), Err(DocumentError::Empty)));
        assert!(matches!(
            parse_document("responses: [unterminated"),
            Err(DocumentError::Yaml(_))
        ));
        assert!(matches!(
            parse_document("just a string"),
            Err(DocumentError::Yaml(_))
        ));
        assert!(matches!(
            parse_document("responses: 12"),
            Err(DocumentError::Yaml(_))
        ));
        assert!(matches!(
            parse_document("settings:\n  on_miss: sometimes\n"),
            Err(DocumentError::Yaml(_))
        ));
    }

    #[test]
    fn test_fingerprint_is_content_hash() {
        assert_eq!(fingerprint("a"), fingerprint("a"));
        assert_ne!(fingerprint("a"), fingerprint("b"));
        assert_eq!(fingerprint("").len(), 64);
    }
}
