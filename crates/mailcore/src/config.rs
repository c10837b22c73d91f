//! Engine configuration
//!
//! Loaded once at engine construction from `engine.json` in the shared
//! config directory; missing or unreadable files fall back to defaults so a
//! fresh install works with no setup. A first run writes the defaults out so
//! there is a file to edit. Environment variables override whatever was
//! loaded: `MAILCORE_PAGE_SIZE`, `MAILCORE_RETRY_MAX_ATTEMPTS`, and
//! `MAILCORE_RETRY_BASE_BACKOFF_MS`.

use serde::{Deserialize, Serialize};

use crate::pending::RetryPolicy;

/// Config file name within the shared config directory
pub const CONFIG_FILE: &str = "engine.json";

/// Tunables for the mailbox engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Conversations per paginator page
    pub page_size: usize,
    /// Retry behavior for the pending-action queue
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load from the shared config directory, falling back to defaults
    ///
    /// Environment overrides are applied last, so they win over the file.
    pub fn load() -> Self {
        let loaded = if config::config_exists(CONFIG_FILE) {
            match config::load_json(CONFIG_FILE) {
                Ok(loaded) => loaded,
                Err(e) => {
                    log::warn!("failed to load {}: {:#}; using defaults", CONFIG_FILE, e);
                    Self::default()
                }
            }
        } else {
            let defaults = Self::default();
            // Seed the file so there is something to edit
            if let Err(e) = config::save_json(CONFIG_FILE, &defaults) {
                log::warn!("could not write default {}: {:#}", CONFIG_FILE, e);
            }
            defaults
        };
        loaded.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_override("MAILCORE_PAGE_SIZE") {
            self.page_size = v;
        }
        if let Some(v) = env_override("MAILCORE_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = v;
        }
        if let Some(v) = env_override("MAILCORE_RETRY_BASE_BACKOFF_MS") {
            self.retry.base_backoff_ms = v;
        }
        self
    }
}

fn env_override<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring unparseable {}={}", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"page_size": 10}"#).unwrap();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_env_overrides_win() {
        unsafe {
            std::env::set_var("MAILCORE_PAGE_SIZE", "7");
            std::env::set_var("MAILCORE_RETRY_MAX_ATTEMPTS", "not a number");
        }

        let config = EngineConfig::default().with_env_overrides();
        assert_eq!(config.page_size, 7);
        // Garbage values are ignored, not fatal
        assert_eq!(config.retry.max_attempts, 5);

        unsafe {
            std::env::remove_var("MAILCORE_PAGE_SIZE");
            std::env::remove_var("MAILCORE_RETRY_MAX_ATTEMPTS");
        }
    }
}
