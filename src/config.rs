//! Runtime configuration.
//!
//! Read from a TOML file (an explicit path, or `config.toml` in the
//! platform config directory), then overridden by `EARTRAINER_*`
//! environment variables. A missing default file is not an error.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

const ENV_API_URL: &str = "EARTRAINER_API_URL";
const ENV_SAMPLE_RATE: &str = "EARTRAINER_SAMPLE_RATE";
const ENV_SEED: &str = "EARTRAINER_SEED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the exercise backend, without a trailing slash.
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    /// Rate of offline renders and of the capture sink.
    pub sample_rate: u32,
    /// Scales everything sent to the output device.
    pub master_gain: f64,
    /// Seed of the guest-mode generator; random when absent.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            master_gain: 1.0,
            seed: None,
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Config::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(raw) = lookup(ENV_SAMPLE_RATE) {
            self.sample_rate = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{ENV_SAMPLE_RATE}={raw}")))?;
        }
        if let Some(raw) = lookup(ENV_SEED) {
            let seed = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{ENV_SEED}={raw}")))?;
            self.seed = Some(seed);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        self.api_base_url = self.api_base_url.trim_end_matches('/').to_string();
        if self.api_base_url.is_empty() {
            return Err(ConfigError::Invalid("api_base_url is empty".into()));
        }
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(ConfigError::Invalid(format!(
                "sample_rate {} is outside 8000..=192000",
                self.sample_rate
            )));
        }
        if !self.master_gain.is_finite() || !(0.0..=1.0).contains(&self.master_gain) {
            return Err(ConfigError::Invalid(format!(
                "master_gain {} is outside [0, 1]",
                self.master_gain
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

/// `config.toml` in the platform config directory.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "eartrainer", "eartrainer").map(|d| d.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_base_url = \"https://ears.example/api/\"\nseed = 7").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.api_base_url, "https://ears.example/api");
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "master_gain = 3.0").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sample_rate = \"fast\"").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = Config::default();
        config
            .apply_overrides(|key| match key {
                ENV_API_URL => Some("http://10.0.0.2:3000/api".into()),
                ENV_SAMPLE_RATE => Some("48000".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.api_base_url, "http://10.0.0.2:3000/api");
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.seed, None);

        let err = config
            .apply_overrides(|key| (key == ENV_SEED).then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
