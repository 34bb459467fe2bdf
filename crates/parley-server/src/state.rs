//! Application state shared across all handlers.

use crate::envelope::Envelope;
use chrono::{DateTime, Utc};
use parley_core::ParleyConfig;
use parley_llm::Generator;
use parley_session::{SessionStore, StoreConfig};
use std::sync::Arc;
use std::time::Duration;

/// Per-request policy for the `/ai` route.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub model: String,
    pub access_key: Option<String>,
    pub max_requests_without_key: u64,
    pub generation_timeout: Duration,
}

impl RelaySettings {
    pub fn from_config(cfg: &ParleyConfig) -> Self {
        Self {
            model: cfg.generation.model.clone(),
            access_key: cfg.session.access_key.clone(),
            max_requests_without_key: cfg.session.max_requests_without_key,
            generation_timeout: cfg.generation.timeout(),
        }
    }

    /// Whether `key` lifts the keyless request limit. Always true when no
    /// access key is configured.
    pub fn is_privileged(&self, key: Option<&str>) -> bool {
        match &self.access_key {
            Some(secret) => key == Some(secret.as_str()),
            None => true,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: SessionStore,
    pub generator: Arc<dyn Generator>,
    pub settings: Arc<RelaySettings>,
    pub envelope: Envelope,
    pub start_time: std::time::Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: &ParleyConfig, generator: Arc<dyn Generator>) -> Self {
        Self {
            store: SessionStore::new(StoreConfig::from(&config.session)),
            generator,
            settings: Arc::new(RelaySettings::from_config(config)),
            envelope: Envelope::from_config(&config.response),
            start_time: std::time::Instant::now(),
            started_at: Utc::now(),
        }
    }
}
