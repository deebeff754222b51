use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::error::GatewayError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_SELF_TEST_TIMEOUT_SECS: u64 = 10;

/// Tunables for query execution. Credentials are resolved separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    pub default_timeout: Duration,
    pub poll_interval: Duration,
    pub self_test_timeout: Duration,
    pub verbose: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            self_test_timeout: Duration::from_secs(DEFAULT_SELF_TEST_TIMEOUT_SECS),
            verbose: false,
        }
    }
}

// --- TOML config file structs ---

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    #[serde(default)]
    defaults: TomlDefaults,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TomlDefaults {
    timeout_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
    self_test_timeout_secs: Option<u64>,
    verbose: Option<bool>,
}

/// Config path plus whether the caller named it explicitly.
struct ResolvedConfigPath {
    path: PathBuf,
    /// true if the caller named the file
    explicit: bool,
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<ResolvedConfigPath> {
    if let Some(path) = explicit {
        return Some(ResolvedConfigPath {
            path: path.to_path_buf(),
            explicit: true,
        });
    }
    ProjectDirs::from("", "", "querygate").map(|dirs| ResolvedConfigPath {
        path: dirs.config_dir().join("config.toml"),
        explicit: false,
    })
}

fn load_toml_config(resolved: Option<&ResolvedConfigPath>) -> Result<TomlConfig, GatewayError> {
    let Some(resolved) = resolved else {
        return Ok(TomlConfig::default());
    };

    if !resolved.path.exists() {
        if resolved.explicit {
            return Err(GatewayError::Configuration {
                message: format!("config file not found: {}", resolved.path.display()),
            });
        }
        return Ok(TomlConfig::default());
    }

    let content =
        std::fs::read_to_string(&resolved.path).map_err(|e| GatewayError::Configuration {
            message: format!("cannot read config file {}: {}", resolved.path.display(), e),
        })?;

    parse_toml(&content).map_err(|e| GatewayError::Configuration {
        message: format!("invalid config file {}: {}", resolved.path.display(), e),
    })
}

fn parse_toml(content: &str) -> Result<TomlConfig, toml::de::Error> {
    toml::from_str(content)
}

impl GatewaySettings {
    /// Load settings from `explicit` or the per-user default location.
    ///
    /// A missing default file yields the built-in defaults; a missing
    /// explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, GatewayError> {
        let resolved = resolve_config_path(explicit);
        let toml_config = load_toml_config(resolved.as_ref())?;
        Self::from_defaults(toml_config.defaults)
    }

    /// Parse settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, GatewayError> {
        let toml_config = parse_toml(content).map_err(|e| GatewayError::Configuration {
            message: format!("invalid config: {e}"),
        })?;
        Self::from_defaults(toml_config.defaults)
    }

    fn from_defaults(defaults: TomlDefaults) -> Result<Self, GatewayError> {
        let fallback = GatewaySettings::default();

        let poll_interval = match defaults.poll_interval_ms {
            Some(0) => {
                return Err(GatewayError::Configuration {
                    message: "poll_interval_ms must be greater than zero".to_string(),
                });
            }
            Some(ms) => Duration::from_millis(ms),
            None => fallback.poll_interval,
        };

        Ok(Self {
            default_timeout: defaults
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(fallback.default_timeout),
            poll_interval,
            self_test_timeout: defaults
                .self_test_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(fallback.self_test_timeout),
            verbose: defaults.verbose.unwrap_or(fallback.verbose),
        })
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_self_test_timeout(mut self, timeout: Duration) -> Self {
        self.self_test_timeout = timeout;
        self
    }
}
