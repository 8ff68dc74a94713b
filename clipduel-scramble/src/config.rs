//! Configuration for the Scramble engine
//!
//! Loaded from a single TOML file; every field has a built-in default so an
//! empty or missing file yields a working configuration.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--api-url, --token, --sport)
//! 2. Environment variables (read by clap for those same flags)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clipduel_common::config::{load_or_default, resolve_config_path, CONFIG_ENV_VAR};

use crate::duel::gesture::SwipeThresholds;
use crate::media::PlaybackParams;
use crate::prefetch::PreloadPolicy;
use crate::Result;

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrambleConfig {
    /// Events buffered per subscriber before the oldest are dropped
    pub event_bus_capacity: usize,

    pub api: ApiConfig,
    pub session: SessionConfig,
    pub prefetch: PrefetchConfig,
    pub duel: DuelConfig,
    pub logging: LoggingConfig,
}

impl Default for ScrambleConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: 100,
            api: ApiConfig::default(),
            session: SessionConfig::default(),
            prefetch: PrefetchConfig::default(),
            duel: DuelConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Backend connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    /// Bearer token; sessions cannot be created without one
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_ms: 10_000,
            token: None,
        }
    }
}

/// Session creation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Restrict duels to one sport; backend picks when unset
    pub sport: Option<String>,
}

/// Media prefetch pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Playback rate for duel clips and their preloads
    pub playback_rate: f64,
    /// Delay before a failed load is treated as ready anyway
    pub readiness_grace_ms: u64,
    /// Longest the trailing preload may stay silent before readiness is assumed
    pub trailing_timeout_ms: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            playback_rate: 1.1,
            readiness_grace_ms: 3_000,
            trailing_timeout_ms: 3_000,
        }
    }
}

impl PrefetchConfig {
    pub fn lead_policy(&self) -> PreloadPolicy {
        PreloadPolicy::lead(
            self.playback_rate,
            Duration::from_millis(self.readiness_grace_ms),
        )
    }

    pub fn trailing_policy(&self) -> PreloadPolicy {
        PreloadPolicy::trailing(
            self.playback_rate,
            Duration::from_millis(self.readiness_grace_ms),
            Duration::from_millis(self.trailing_timeout_ms),
        )
    }
}

/// Duel presentation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuelConfig {
    /// Fade-out between the vote and the result card
    pub fade_out_ms: u64,
    /// Surface offset (after friction) that completes a swipe
    pub swipe_threshold_px: f64,
    /// Finger travel per pixel of surface offset
    pub swipe_friction: f64,
    /// Release speed that completes a shorter swipe
    pub swipe_velocity_px_per_s: f64,
    /// Interval between playback position reports
    pub time_update_interval_ms: u64,
}

impl Default for DuelConfig {
    fn default() -> Self {
        Self {
            fade_out_ms: 1_000,
            swipe_threshold_px: 50.0,
            swipe_friction: 2.0,
            swipe_velocity_px_per_s: 800.0,
            time_update_interval_ms: 1_000,
        }
    }
}

impl DuelConfig {
    pub fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms)
    }

    pub fn swipe_thresholds(&self) -> SwipeThresholds {
        SwipeThresholds {
            distance: self.swipe_threshold_px,
            friction: self.swipe_friction,
            velocity: self.swipe_velocity_px_per_s,
        }
    }

    pub fn playback_params(&self, playback_rate: f64) -> PlaybackParams {
        PlaybackParams::duel(
            playback_rate,
            Duration::from_millis(self.time_update_interval_ms),
        )
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl ScrambleConfig {
    /// Resolve and load the config file
    ///
    /// `cli_path` wins over `CLIPDUEL_CONFIG`, which wins over the platform
    /// config directory. No file at all means built-in defaults.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR);
        Ok(load_or_default(path.as_deref())?)
    }

    /// Apply command-line overrides on top of the file
    pub fn with_overrides(
        mut self,
        api_url: Option<String>,
        token: Option<String>,
        sport: Option<String>,
    ) -> Self {
        if let Some(url) = api_url {
            self.api.base_url = url;
        }
        if token.is_some() {
            self.api.token = token;
        }
        if sport.is_some() {
            self.session.sport = sport;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ScrambleConfig::default();
        assert_eq!(config.api.base_url, "http://localhost:3000");
        assert_eq!(config.api.timeout_ms, 10_000);
        assert_eq!(config.prefetch.playback_rate, 1.1);
        assert_eq!(config.prefetch.readiness_grace_ms, 3_000);
        assert_eq!(config.duel.fade_out(), Duration::from_secs(1));
        assert_eq!(config.event_bus_capacity, 100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[api]\nbase_url = \"https://api.example\"\n\n[duel]\nfade_out_ms = 250"
        )
        .unwrap();

        let config = ScrambleConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.api.base_url, "https://api.example");
        assert_eq!(config.api.timeout_ms, 10_000);
        assert_eq!(config.duel.fade_out_ms, 250);
        assert_eq!(config.duel.swipe_threshold_px, 50.0);
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let config = ScrambleConfig::default().with_overrides(
            Some("https://staging.example".to_string()),
            Some("token-123".to_string()),
            None,
        );
        assert_eq!(config.api.base_url, "https://staging.example");
        assert_eq!(config.api.token.as_deref(), Some("token-123"));
        assert_eq!(config.session.sport, None);
    }

    #[test]
    fn test_policies_follow_prefetch_settings() {
        let prefetch = PrefetchConfig {
            playback_rate: 1.0,
            readiness_grace_ms: 500,
            trailing_timeout_ms: 2_000,
        };
        let trailing = prefetch.trailing_policy();
        assert_eq!(trailing.error_grace, Duration::from_millis(500));
        assert_eq!(trailing.readiness_timeout, Some(Duration::from_secs(2)));
        assert!(trailing.params.muted);

        let lead = prefetch.lead_policy();
        assert_eq!(lead.readiness_timeout, None);
    }

    #[test]
    fn test_dumped_config_loads_back() {
        let mut config = ScrambleConfig::default();
        config.session.sport = Some("cricket".to_string());
        let dumped = toml::to_string_pretty(&config).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", dumped).unwrap();
        let loaded = ScrambleConfig::load(Some(file.path())).unwrap();
        assert_eq!(loaded.session.sport.as_deref(), Some("cricket"));
        assert_eq!(loaded.event_bus_capacity, 100);
        assert_eq!(loaded.duel.swipe_friction, 2.0);
    }
}
