use serde::{Deserialize, Serialize};
use std::{collections::HashMap, env, fmt, str::FromStr};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MockServerConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub responses: ResponsesConfig,
    pub dialects: DialectsConfig,
}

impl MockServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            responses: ResponsesConfig::from_env()?,
            dialects: DialectsConfig::from_env()?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| "SERVER_PORT must be a valid port number")?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Logging Configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub modules: HashMap<String, String>,
}

impl LoggingConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        let mut modules = HashMap::new();

        // Load module-specific log levels
        if let Ok(level) = env::var("LOG_MODULE_API") {
            modules.insert("api".to_string(), level);
        }
        if let Ok(level) = env::var("LOG_MODULE_SERVICES") {
            modules.insert("services".to_string(), level);
        }

        Ok(Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),
            modules,
        })
    }

    /// Filter directive string for `tracing_subscriber::EnvFilter`
    pub fn filter_directive(&self) -> String {
        let mut filter = self.level.clone();
        let mut modules: Vec<_> = self.modules.iter().collect();
        modules.sort();
        for (module, level) in modules {
            filter.push_str(&format!(",{module}={level}"));
        }
        filter
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            modules: HashMap::new(),
        }
    }
}

/// Where the responses document lives and how often it is polled
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResponsesConfig {
    pub path: String,
    pub poll_interval_ms: u64,
}

impl ResponsesConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            path: env::var("RESPONSES_FILE").unwrap_or_else(|_| "responses.yml".to_string()),
            poll_interval_ms: env::var("RESPONSES_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| "RESPONSES_POLL_INTERVAL_MS must be a number of milliseconds")?,
        })
    }
}

impl Default for ResponsesConfig {
    fn default() -> Self {
        Self {
            path: "responses.yml".to_string(),
            poll_interval_ms: 1000,
        }
    }
}

/// Per-dialect tokenizer and streaming choices
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "PartialDialects")]
pub struct DialectsConfig {
    pub openai: DialectConfig,
    pub anthropic: DialectConfig,
}

impl DialectsConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            openai: DialectConfig::from_env("OPENAI", defaults.openai)?,
            anthropic: DialectConfig::from_env("ANTHROPIC", defaults.anthropic)?,
        })
    }
}

impl Default for DialectsConfig {
    fn default() -> Self {
        Self {
            openai: DialectConfig {
                tokenizer: TokenizerKind::Cl100kBase,
                stream_granularity: StreamGranularity::Word,
            },
            anthropic: DialectConfig {
                tokenizer: TokenizerKind::Whitespace,
                stream_granularity: StreamGranularity::Word,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DialectConfig {
    pub tokenizer: TokenizerKind,
    pub stream_granularity: StreamGranularity,
}

/// File form of `dialects`: every field is optional and falls back to the dialect default
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialDialects {
    openai: PartialDialect,
    anthropic: PartialDialect,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialDialect {
    tokenizer: Option<TokenizerKind>,
    stream_granularity: Option<StreamGranularity>,
}

impl From<PartialDialects> for DialectsConfig {
    fn from(partial: PartialDialects) -> Self {
        let defaults = Self::default();
        Self {
            openai: defaults.openai.merge(partial.openai),
            anthropic: defaults.anthropic.merge(partial.anthropic),
        }
    }
}

impl DialectConfig {
    fn merge(self, partial: PartialDialect) -> Self {
        Self {
            tokenizer: partial.tokenizer.unwrap_or(self.tokenizer),
            stream_granularity: partial.stream_granularity.unwrap_or(self.stream_granularity),
        }
    }

    /// Load `<PREFIX>_TOKENIZER` and `<PREFIX>_STREAM_GRANULARITY`, keeping `fallback` for unset vars
    fn from_env(prefix: &str, fallback: DialectConfig) -> Result<Self, String> {
        let tokenizer = match env::var(format!("{prefix}_TOKENIZER")) {
            Ok(value) => value.parse()?,
            Err(_) => fallback.tokenizer,
        };
        let stream_granularity = match env::var(format!("{prefix}_STREAM_GRANULARITY")) {
            Ok(value) => value.parse()?,
            Err(_) => fallback.stream_granularity,
        };
        Ok(Self {
            tokenizer,
            stream_granularity,
        })
    }
}

/// Named tokenizer strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    /// One token per whitespace-separated word
    Whitespace,
    /// Roughly four characters per token
    Approximate,
    /// OpenAI BPE used by gpt-4 / gpt-3.5
    #[serde(rename = "cl100k_base")]
    Cl100kBase,
    /// OpenAI BPE used by gpt-4o
    #[serde(rename = "o200k_base")]
    O200kBase,
}

impl TokenizerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whitespace => "whitespace",
            Self::Approximate => "approximate",
            Self::Cl100kBase => "cl100k_base",
            Self::O200kBase => "o200k_base",
        }
    }
}

impl FromStr for TokenizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whitespace" => Ok(Self::Whitespace),
            "approximate" => Ok(Self::Approximate),
            "cl100k_base" => Ok(Self::Cl100kBase),
            "o200k_base" => Ok(Self::O200kBase),
            other => Err(format!("unknown tokenizer '{other}'")),
        }
    }
}

impl fmt::Display for TokenizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit size used when a response body is streamed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamGranularity {
    Word,
    Character,
    Token,
}

impl FromStr for StreamGranularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "word" => Ok(Self::Word),
            "character" | "char" => Ok(Self::Character),
            "token" => Ok(Self::Token),
            other => Err(format!("unknown stream granularity '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenizer_kind_from_str() {
        assert_eq!("cl100k_base".parse::<TokenizerKind>(), Ok(TokenizerKind::Cl100kBase));
        assert_eq!(" Whitespace ".parse::<TokenizerKind>(), Ok(TokenizerKind::Whitespace));
        assert!("bert".parse::<TokenizerKind>().is_err());
    }

    #[test]
    fn test_granularity_from_str() {
        assert_eq!("char".parse::<StreamGranularity>(), Ok(StreamGranularity::Character));
        assert_eq!("TOKEN".parse::<StreamGranularity>(), Ok(StreamGranularity::Token));
        assert!("sentence".parse::<StreamGranularity>().is_err());
    }

    #[test]
    fn test_filter_directive_is_stable() {
        let mut logging = LoggingConfig::default();
        logging.modules.insert("services".to_string(), "debug".to_string());
        logging.modules.insert("api".to_string(), "trace".to_string());

        assert_eq!(logging.filter_directive(), "info,api=trace,services=debug");
    }
}
