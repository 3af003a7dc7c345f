//! Player configuration loaded from `~/.config/vodplay/config.toml`.
//!
//! Every section is optional; a missing file yields the defaults.
//!
//! ```toml
//! [engine]
//! back_buffer_secs = 90
//! quality = "720"
//!
//! [recovery]
//! retry_budget = 1
//!
//! [catalog]
//! base_url = "http://127.0.0.1:5000"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::stream::{EngineConfig, StreamQuality};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub engine: EngineSection,
    pub recovery: RecoverySection,
    pub catalog: CatalogSection,
}

/// Adaptive engine tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Seconds of already-played media retained behind the playhead.
    pub back_buffer_secs: u64,
    /// Seconds buffered ahead of the playhead before fetching pauses.
    pub max_buffer_secs: u64,
    pub low_latency: bool,
    /// Probe segment containers on the blocking pool.
    pub enable_worker: bool,
    pub segment_retries: u32,
    pub request_timeout_secs: u64,
    pub max_concurrent: usize,
    /// `best`, `worst`, or a target height such as `720`.
    pub quality: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            back_buffer_secs: 90,
            max_buffer_secs: 30,
            low_latency: true,
            enable_worker: true,
            segment_retries: 3,
            request_timeout_secs: 30,
            max_concurrent: 4,
            quality: "best".to_string(),
        }
    }
}

impl EngineSection {
    /// Convert to the engine's runtime configuration.
    #[must_use]
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            back_buffer: Duration::from_secs(self.back_buffer_secs),
            max_buffer: Duration::from_secs(self.max_buffer_secs),
            low_latency: self.low_latency,
            enable_worker: self.enable_worker,
            segment_retries: self.segment_retries.max(1),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_concurrent: self.max_concurrent.max(1),
            quality: StreamQuality::parse(&self.quality),
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Fault recovery policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoverySection {
    /// Recoveries allowed per fault kind before escalating to a terminal fault.
    pub retry_budget: u32,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self { retry_budget: 1 }
    }
}

/// Catalog service location and credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

/// Load configuration from the default location.
///
/// Returns defaults if the file doesn't exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load() -> Result<PlayerConfig> {
    load_from(&config_path())
}

/// Load configuration from an explicit path, falling back to defaults when
/// the file is absent.
pub fn load_from(path: &Path) -> Result<PlayerConfig> {
    if !path.exists() {
        return Ok(PlayerConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
}

/// Return the path to the config file.
#[must_use]
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vodplay")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_empty_config() {
        let config: PlayerConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.back_buffer_secs, 90);
        assert!(config.engine.low_latency);
        assert!(config.engine.enable_worker);
        assert_eq!(config.recovery.retry_budget, 1);
        assert_eq!(config.catalog.base_url, "http://127.0.0.1:5000");
        assert!(config.catalog.token.is_none());
    }

    #[test]
    fn parse_partial_sections() {
        let toml_str = r#"
[engine]
quality = "720"
segment_retries = 5

[recovery]
retry_budget = 2
"#;
        let config: PlayerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.segment_retries, 5);
        assert_eq!(config.engine.max_buffer_secs, 30);
        assert_eq!(config.recovery.retry_budget, 2);

        let engine = config.engine.to_engine_config();
        assert_eq!(engine.quality, StreamQuality::Specific(720));
        assert_eq!(engine.back_buffer, Duration::from_secs(90));
    }

    #[test]
    fn zero_retries_clamped_to_one_attempt() {
        let section = EngineSection {
            segment_retries: 0,
            max_concurrent: 0,
            ..EngineSection::default()
        };
        let engine = section.to_engine_config();
        assert_eq!(engine.segment_retries, 1);
        assert_eq!(engine.max_concurrent, 1);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.recovery.retry_budget, 1);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[engine\nquality = ").unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(err.to_string().contains("invalid TOML"));
    }
}
