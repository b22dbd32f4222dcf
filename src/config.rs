//! TOML configuration and path resolution.
//!
//! Every key is optional. Paths resolve in priority order: command-line flag
//! (clap also reads the matching environment variable), then the config file,
//! then the platform default under the user's config or data directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::intake::IntakeOptions;
use crate::report::Thresholds;
use crate::validation::{HttpValidator, MockValidator, ValidationPolicy, VisualStandardValidator};

pub const APP_DIR: &str = "connectflow";
pub const CONFIG_FILE: &str = "config.toml";
pub const DATA_FILE: &str = "connectflow.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JSON store location, used when `--db` is not given.
    pub data_file: Option<PathBuf>,
    /// Base URL that relative standard document links are resolved against.
    pub standards_base_url: Option<String>,
    pub validator: ValidatorConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidatorMode {
    #[default]
    Mock,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub mode: ValidatorMode,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub mock_latency_ms: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            mode: ValidatorMode::Mock,
            endpoint: None,
            api_key: None,
            timeout_ms: 10_000,
            max_attempts: 3,
            retry_backoff_ms: 500,
            mock_latency_ms: 1500,
        }
    }
}

/// Completion band thresholds, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub warn_below: u32,
    pub good_at: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        let t = Thresholds::default();
        Self { warn_below: t.warn_below, good_at: t.good_at }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {} failed: {e}", path.display())))?;
        let config = Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.report.warn_below > self.report.good_at || self.report.good_at > 100 {
            return Err(Error::Config(format!(
                "report thresholds must satisfy warn_below <= good_at <= 100 (got {} and {})",
                self.report.warn_below, self.report.good_at
            )));
        }
        if let Some(base) = &self.standards_base_url {
            Url::parse(base).map_err(|e| Error::Config(format!("standards_base_url {base:?}: {e}")))?;
        }
        if self.validator.mode == ValidatorMode::Http && self.validator.endpoint.is_none() {
            return Err(Error::Config("validator.endpoint is required when validator.mode = \"http\"".into()));
        }
        Ok(())
    }

    /// The JSON store path: explicit path, then `data_file`, then the platform data dir.
    pub fn data_file_path(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = &self.data_file {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|d| d.join(APP_DIR).join(DATA_FILE))
            .ok_or_else(|| Error::Config("could not determine data directory; pass --db".into()))
    }

    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            timeout: Duration::from_millis(self.validator.timeout_ms),
            max_attempts: self.validator.max_attempts,
            backoff: Duration::from_millis(self.validator.retry_backoff_ms),
        }
    }

    pub fn intake_options(&self) -> IntakeOptions {
        IntakeOptions { policy: self.validation_policy(), standards_base_url: self.standards_base_url.clone() }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds { warn_below: self.report.warn_below, good_at: self.report.good_at }
    }

    /// Build the configured visual standard validator.
    pub fn validator(&self) -> Result<Box<dyn VisualStandardValidator>> {
        match self.validator.mode {
            ValidatorMode::Mock => Ok(Box::new(MockValidator::new(Duration::from_millis(self.validator.mock_latency_ms)))),
            ValidatorMode::Http => {
                let endpoint = self
                    .validator
                    .endpoint
                    .as_deref()
                    .ok_or_else(|| Error::Config("validator.endpoint is not set".into()))?;
                let http = HttpValidator::new(endpoint, self.validator.api_key.clone())
                    .map_err(|e| Error::Config(format!("validator: {e}")))?;
                Ok(Box::new(http))
            }
        }
    }
}

/// The config file path: explicit path, or the platform config dir.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.validation_policy(), ValidationPolicy::default());
        assert_eq!(config.thresholds(), Thresholds::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_config() {
        let config = Config::from_toml_str(
            r#"
            standards_base_url = "https://standards.connectflow.local"

            [validator]
            timeout_ms = 2000
            max_attempts = 5

            [report]
            warn_below = 50
            "#,
        )
        .unwrap();
        let policy = config.validation_policy();
        assert_eq!(policy.timeout, Duration::from_secs(2));
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff, Duration::from_millis(500));
        assert_eq!(config.thresholds(), Thresholds { warn_below: 50, good_at: 90 });
        assert_eq!(
            config.intake_options().standards_base_url.as_deref(),
            Some("https://standards.connectflow.local")
        );
    }

    #[test]
    fn test_invalid_configs_rejected() {
        for bad in [
            "[report]\nwarn_below = 95",
            "[validator]\nmode = \"http\"",
            "standards_base_url = \"not a url\"",
            "[validator]\nmode = \"carrier-pigeon\"",
        ] {
            assert!(matches!(Config::from_toml_str(bad), Err(Error::Config(_))), "{bad}");
        }
    }

    #[test]
    fn test_load_missing_and_present() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        assert_eq!(Config::load(&path).unwrap(), Config::default());

        fs::write(&path, "data_file = \"/srv/cf/store.json\"\n[logging]\nlevel = \"debug\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.data_file_path(None).unwrap(), PathBuf::from("/srv/cf/store.json"));
        assert_eq!(config.data_file_path(Some(Path::new("x.json"))).unwrap(), PathBuf::from("x.json"));
    }

    #[test]
    fn test_http_validator_built_from_config() {
        let config = Config::from_toml_str(
            "[validator]\nmode = \"http\"\nendpoint = \"https://vision.example.com/v1/compare\"\napi_key = \"k\"",
        )
        .unwrap();
        assert!(config.validator().is_ok());
    }
}
