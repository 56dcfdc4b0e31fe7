//! Configuration loader and validator for the news→Telegram meme pipeline.
//!
//! Tunables (feed query, model ids, limits) live in a YAML file. Credentials
//! are read from the process environment and resolved through an injectable
//! lookup so tests never touch the real environment.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Missing required environment variable: {0}")]
    MissingEnv(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub feed: Feed,
    pub caption: Caption,
    pub image: Image,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub request_timeout_secs: u64,
    pub watch_interval_secs: u64,
}

/// News feed query settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feed {
    pub keyword: String,
    pub countries: Vec<String>,
    pub language: String,
    pub timespan: String,
    pub max_articles: usize,
}

/// Caption model settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Caption {
    pub model: String,
    pub max_attempts: u32,
    pub retry_pause_ms: u64,
}

/// Image model settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Image {
    pub model: String,
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid("app.request_timeout_secs must be > 0"));
    }
    if cfg.app.watch_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.watch_interval_secs must be > 0"));
    }

    if cfg.feed.keyword.trim().is_empty() {
        return Err(ConfigError::Invalid("feed.keyword must be non-empty"));
    }
    if cfg.feed.countries.is_empty() {
        return Err(ConfigError::Invalid("feed.countries must list at least one country"));
    }
    if cfg.feed.countries.iter().any(|c| c.trim().is_empty()) {
        return Err(ConfigError::Invalid("feed.countries must not contain empty entries"));
    }
    if cfg.feed.language.trim().is_empty() {
        return Err(ConfigError::Invalid("feed.language must be non-empty"));
    }
    if cfg.feed.timespan.trim().is_empty() {
        return Err(ConfigError::Invalid("feed.timespan must be non-empty"));
    }
    if cfg.feed.max_articles == 0 {
        return Err(ConfigError::Invalid("feed.max_articles must be > 0"));
    }

    if cfg.caption.model.trim().is_empty() {
        return Err(ConfigError::Invalid("caption.model must be non-empty"));
    }
    if cfg.caption.max_attempts == 0 {
        return Err(ConfigError::Invalid("caption.max_attempts must be > 0"));
    }

    if cfg.image.model.trim().is_empty() {
        return Err(ConfigError::Invalid("image.model must be non-empty"));
    }

    Ok(())
}

/// Credentials pulled from the process environment at startup.
///
/// Every field is required; a missing or blank variable is a fatal
/// startup error naming the variable.
#[derive(Clone)]
pub struct Secrets {
    pub bot_token: String,
    pub chat_id: String,
    pub llm_token: String,
    pub image_token: String,
    pub supabase_url: String,
    pub supabase_key: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("chat_id", &self.chat_id)
            .field("supabase_url", &self.supabase_url)
            .finish_non_exhaustive()
    }
}

impl Secrets {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve all required variables through `lookup`. Blank values count
    /// as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| match lookup(name) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ConfigError::MissingEnv(name)),
        };

        Ok(Self {
            bot_token: required("BOT_TOKEN")?,
            chat_id: required("CHAT_ID")?,
            llm_token: required("HUGGINGFACE_LLM_TOKEN")?,
            image_token: required("HUGGINGFACE_IMAGE_TOKEN")?,
            supabase_url: required("SUPABASE_URL")?,
            supabase_key: required("SUPABASE_KEY")?,
        })
    }
}

/// Returns the example YAML content shipped with the repository.
pub fn example() -> &'static str {
    r#"app:
  request_timeout_secs: 30
  watch_interval_secs: 3600

feed:
  keyword: "climate change"
  countries:
    - US
    - GB
    - CA
  language: "English"
  timespan: "1d"
  max_articles: 5

caption:
  model: "mistralai/Mistral-7B-Instruct-v0.3"
  max_attempts: 3
  retry_pause_ms: 1000

image:
  model: "stabilityai/stable-diffusion-3.5-large-turbo"
"#
}
