//! Service configuration, sourced from the environment once at startup.

use crate::error::{ParleyError, Result};
use crate::types::{LogFormat, ResponseStyle};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo-2024-04-09";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub generation: GenerationConfig,
    pub response: ResponseConfig,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub default_system_prompt: String,
    /// Idle time after which a conversation is dropped, in milliseconds.
    pub inactivity_window_ms: u64,
    /// Keyless `/ai` requests allowed per id before answering 429.
    pub max_requests_without_key: u64,
    /// Shared secret that lifts the request limit. `None` disables limiting.
    #[serde(skip_serializing)]
    pub access_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model: String,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    pub style: ResponseStyle,
    pub signature: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 3000 }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            inactivity_window_ms: 15 * 60 * 1000,
            max_requests_without_key: 1000,
            access_key: None,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            timeout_ms: 120_000,
        }
    }
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self { style: ResponseStyle::Api, signature: "ZishinDev".into() }
    }
}

impl SessionConfig {
    pub fn inactivity_window(&self) -> Duration {
        Duration::from_millis(self.inactivity_window_ms)
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ParleyConfig {
    /// Load from the process environment, reading a `.env` file first if present.
    pub fn from_env() -> Result<Self> {
        load_dotenv(dotenvy::dotenv())?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(host) = get("HOST") {
            cfg.server.host = host;
        }
        if let Some(port) = get("PORT") {
            cfg.server.port = parse("PORT", &port)?;
        }

        if let Some(prompt) = get("DEFAULT_SYSTEM") {
            cfg.session.default_system_prompt = prompt;
        }
        if let Some(ms) = get("TIMEOUT_DURATION") {
            cfg.session.inactivity_window_ms = parse("TIMEOUT_DURATION", &ms)?;
        }
        if let Some(max) = get("MAX_REQUESTS_WITHOUT_KEY") {
            cfg.session.max_requests_without_key = parse("MAX_REQUESTS_WITHOUT_KEY", &max)?;
        }
        cfg.session.access_key = get("API_KEY");

        if let Some(model) = get("MODEL") {
            cfg.generation.model = model;
        }
        if let Some(url) = get("GENERATION_BASE_URL") {
            cfg.generation.base_url = url.trim_end_matches('/').to_string();
        }
        cfg.generation.api_key = get("GENERATION_API_KEY");
        if let Some(ms) = get("GENERATION_TIMEOUT") {
            cfg.generation.timeout_ms = parse("GENERATION_TIMEOUT", &ms)?;
        }

        if let Some(style) = get("RESPONSE_STYLE") {
            cfg.response.style = ResponseStyle::parse(&style)
                .ok_or_else(|| invalid("RESPONSE_STYLE", &style))?;
        }
        if let Some(signature) = get("RESPONSE_SIGNATURE") {
            cfg.response.signature = signature;
        }

        if let Some(format) = get("LOG_FORMAT") {
            cfg.log_format = match format.to_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                _ => return Err(invalid("LOG_FORMAT", &format)),
            };
        }

        Ok(cfg)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// A missing `.env` is fine; one that exists but cannot be read or parsed is not.
pub(crate) fn load_dotenv(result: std::result::Result<PathBuf, dotenvy::Error>) -> Result<()> {
    match result {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "loaded .env");
            Ok(())
        }
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ParleyError {
    ParleyError::InvalidConfig { key: key.into(), value: value.into() }
}
