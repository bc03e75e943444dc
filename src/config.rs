//! Configuration file parser for ~/.config/blogroll/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged, since they are usually typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::blogroll::BlogrollOptions;
use crate::feed::{Diagnostics, DEFAULT_FEED_CACHE_CAPACITY};
use crate::util::HostPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

/// Top-level configuration.
///
/// Any subset of keys may be given; the rest keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Heading printed above the list.
    pub title: String,

    /// URL of the OPML subscription document. Required to build a blogroll.
    pub source_url: Option<String>,

    /// Cache namespace of this blogroll.
    pub instance_id: String,

    /// Lifetime of a cached aggregated list, in hours.
    pub cache_ttl_hours: u64,

    /// Maximum age of a reused feed copy, in minutes.
    pub feed_cache_ttl_minutes: u64,

    pub fetch_timeout_secs: u64,
    pub feed_timeout_secs: u64,
    pub max_concurrent_fetches: usize,
    pub feed_cache_capacity: usize,

    /// Log per-feed failures at debug instead of warn.
    pub quiet_feed_diagnostics: bool,

    /// Let the HTTP transport reach localhost and private networks.
    pub allow_private_hosts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "Blogroll".to_string(),
            source_url: None,
            instance_id: "default".to_string(),
            cache_ttl_hours: 168,
            feed_cache_ttl_minutes: 60,
            fetch_timeout_secs: 30,
            feed_timeout_secs: 20,
            max_concurrent_fetches: 10,
            feed_cache_capacity: DEFAULT_FEED_CACHE_CAPACITY,
            quiet_feed_diagnostics: true,
            allow_private_hosts: false,
        }
    }
}

impl Config {
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 11] = [
        "title",
        "source_url",
        "instance_id",
        "cache_ttl_hours",
        "feed_cache_ttl_minutes",
        "fetch_timeout_secs",
        "feed_timeout_secs",
        "max_concurrent_fetches",
        "feed_cache_capacity",
        "quiet_feed_diagnostics",
        "allow_private_hosts",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    ///
    /// Values are returned as written. Call [`validate`](Self::validate) once
    /// any command-line overrides have been applied.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            instance = %config.instance_id,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Repairs values that would stall the service and warns about odd ones.
    ///
    /// Never fails: a questionable setting still produces a working blogroll.
    pub fn validate(mut self) -> Self {
        if self.max_concurrent_fetches == 0 {
            tracing::warn!("max_concurrent_fetches is 0, using 1");
            self.max_concurrent_fetches = 1;
        }

        // A zero timeout would fail every fetch before it starts
        let defaults = Self::default();
        if self.fetch_timeout_secs == 0 {
            tracing::warn!(
                default = defaults.fetch_timeout_secs,
                "fetch_timeout_secs is 0, using the default"
            );
            self.fetch_timeout_secs = defaults.fetch_timeout_secs;
        }
        if self.feed_timeout_secs == 0 {
            tracing::warn!(
                default = defaults.feed_timeout_secs,
                "feed_timeout_secs is 0, using the default"
            );
            self.feed_timeout_secs = defaults.feed_timeout_secs;
        }

        if self.feed_cache_ttl() >= self.cache_ttl() {
            tracing::warn!(
                feed_cache_ttl_minutes = self.feed_cache_ttl_minutes,
                cache_ttl_hours = self.cache_ttl_hours,
                "Feed cache TTL is not shorter than the list TTL; invalidation will be the only way to see new posts early"
            );
        }

        if self.instance_id.trim().is_empty() {
            tracing::warn!("instance_id is empty, using \"default\"");
            self.instance_id = "default".to_string();
        }

        self
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours.saturating_mul(3600))
    }

    pub fn feed_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.feed_cache_ttl_minutes.saturating_mul(60))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        if self.quiet_feed_diagnostics {
            Diagnostics::Quiet
        } else {
            Diagnostics::Verbose
        }
    }

    pub fn host_policy(&self) -> HostPolicy {
        if self.allow_private_hosts {
            HostPolicy::AllowPrivate
        } else {
            HostPolicy::PublicOnly
        }
    }

    /// Service options derived from this config.
    pub fn to_options(&self) -> BlogrollOptions {
        BlogrollOptions {
            list_ttl: self.cache_ttl(),
            feed_ttl: self.feed_cache_ttl(),
            fetch_timeout: self.fetch_timeout(),
            feed_timeout: self.feed_timeout(),
            max_concurrent_fetches: self.max_concurrent_fetches.max(1),
            diagnostics: self.diagnostics(),
        }
    }
}
