// Configuration Management
//
// This crate handles process-level configuration for the mock LLM server.
// It provides:
// - Configuration structs and deserialization
// - Environment and file loading logic
// - Default configuration values
//
// The response table itself is not configured here; it lives in the
// hot-reloadable responses document owned by the services crate.

use std::path::Path;
use thiserror::Error;

pub mod types;

// Re-export all configuration types
pub use types::*;

/// Environment variable naming an optional YAML file with the full server config
pub const CONFIG_FILE_ENV: &str = "MOCKLLM_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to read configuration file: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {source}")]
    ParseError {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Main configuration loading interface
impl MockServerConfig {
    /// Load configuration from YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config: MockServerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from `MOCKLLM_CONFIG` if set, otherwise from the environment
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load_from_file(path.trim()),
            _ => Self::from_env().map_err(ConfigError::InvalidValue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file_with_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server:
  host: 127.0.0.1
  port: 9100
responses:
  path: fixtures/responses.yml
  poll_interval_ms: 250
dialects:
  anthropic:
    tokenizer: approximate
    stream_granularity: character
"#
        )
        .unwrap();

        let config = MockServerConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.responses.path, "fixtures/responses.yml");
        assert_eq!(config.responses.poll_interval_ms, 250);
        assert_eq!(config.dialects.anthropic.tokenizer, TokenizerKind::Approximate);
        assert_eq!(
            config.dialects.anthropic.stream_granularity,
            StreamGranularity::Character
        );
        // Sections left out fall back to defaults
        assert_eq!(config.dialects.openai.tokenizer, TokenizerKind::Cl100kBase);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_dialect_fields_default_independently() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "dialects:\n  openai:\n    tokenizer: o200k_base\n  anthropic:\n    stream_granularity: token"
        )
        .unwrap();

        let config = MockServerConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.dialects.openai.tokenizer, TokenizerKind::O200kBase);
        assert_eq!(config.dialects.openai.stream_granularity, StreamGranularity::Word);
        assert_eq!(config.dialects.anthropic.tokenizer, TokenizerKind::Whitespace);
        assert_eq!(
            config.dialects.anthropic.stream_granularity,
            StreamGranularity::Token
        );
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = MockServerConfig::load_from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_from_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server: [unterminated").unwrap();

        let err = MockServerConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_unknown_tokenizer_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dialects:\n  openai:\n    tokenizer: sentencepiece").unwrap();

        let err = MockServerConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
