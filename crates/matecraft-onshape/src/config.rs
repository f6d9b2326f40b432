//! Client configuration loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://cad.onshape.com";
pub const DEFAULT_API_VERSION: &str = "v6";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const CLASSIFY_SCRIPT: &str = include_str!("../scripts/classify_part_studio.fs");
const TARGET_SCRIPT: &str = include_str!("../scripts/resolve_target.fs");

#[derive(Debug, Clone)]
pub struct OnshapeConfig {
    /// Scheme and host, without a trailing slash.
    pub base_url: String,
    pub api_version: String,
    pub timeout_secs: u64,
    /// FeatureScript source run against every candidate part studio.
    pub classify_script: String,
    /// FeatureScript source run against every target part studio.
    pub target_script: String,
}

impl Default for OnshapeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            classify_script: CLASSIFY_SCRIPT.to_string(),
            target_script: TARGET_SCRIPT.to_string(),
        }
    }
}

impl OnshapeConfig {
    /// Load from environment variables
    ///
    /// - `ONSHAPE_BASE_URL`
    /// - `ONSHAPE_API_VERSION`
    /// - `ONSHAPE_TIMEOUT_SECS`
    /// - `MATECRAFT_CLASSIFY_SCRIPT`, `MATECRAFT_TARGET_SCRIPT`: paths of
    ///   FeatureScript files replacing the built-in scripts
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("ONSHAPE_BASE_URL") {
            config = config.with_base_url(&url)?;
        }
        if let Some(version) = lookup("ONSHAPE_API_VERSION") {
            let version = version.trim();
            if version.is_empty() {
                return Err(ConfigError::Invalid("ONSHAPE_API_VERSION is empty".to_string()));
            }
            config.api_version = version.to_string();
        }
        if let Some(secs) = lookup("ONSHAPE_TIMEOUT_SECS") {
            config.timeout_secs = parse_timeout(&secs)?;
        }
        if let Some(path) = lookup("MATECRAFT_CLASSIFY_SCRIPT") {
            config.classify_script = read_script(PathBuf::from(path))?;
        }
        if let Some(path) = lookup("MATECRAFT_TARGET_SCRIPT") {
            config.target_script = read_script(PathBuf::from(path))?;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, url: &str) -> Result<Self, ConfigError> {
        let parsed = Url::parse(url.trim()).map_err(|e| ConfigError::Invalid(format!("base URL `{url}`: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!("base URL `{url}` cannot be a base")));
        }
        self.base_url = parsed.as_str().trim_end_matches('/').to_string();
        Ok(self)
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `{base}/api/{version}/{rest}`
    pub fn endpoint(&self, rest: &str) -> String {
        format!("{}/api/{}/{}", self.base_url, self.api_version, rest)
    }
}

fn parse_timeout(value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid("ONSHAPE_TIMEOUT_SECS must be positive".to_string())),
        Ok(secs) => Ok(secs),
        Err(e) => Err(ConfigError::Invalid(format!("ONSHAPE_TIMEOUT_SECS `{value}`: {e}"))),
    }
}

fn read_script(path: PathBuf) -> Result<String, ConfigError> {
    std::fs::read_to_string(&path).map_err(|source| ConfigError::Script { path, source })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to read script {path:?}: {source}")]
    Script {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for matecraft_core::MateError {
    fn from(err: ConfigError) -> Self {
        matecraft_core::MateError::Config(err.to_string())
    }
}
