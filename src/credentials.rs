//! Credential resolution from layered configuration sources.
//!
//! Sources are consulted in order and the first one that yields a complete
//! credential set wins. Nothing here writes files, modifies the process
//! environment, or logs secret values.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use ini::{Ini, Properties};
use secrecy::{ExposeSecret, SecretString};

use crate::error::GatewayError;
use crate::masking;

pub const HOST_KEY: &str = "DATABRICKS_SERVER_HOSTNAME";
pub const TOKEN_KEY: &str = "DATABRICKS_ACCESS_TOKEN";
pub const HTTP_PATH_KEY: &str = "DATABRICKS_HTTP_PATH";

/// Values shipped in the credentials template; treated as unset.
const PLACEHOLDERS: &[(&str, &str)] = &[
    (HOST_KEY, "your_hostname"),
    (TOKEN_KEY, "your_token"),
    (HTTP_PATH_KEY, "/sql/1.0/warehouses/your_warehouse_id"),
];

/// Databricks CLI profile file, relative to the home directory.
pub const CLI_PROFILE_FILE: &str = ".databrickscfg";
/// Overrides the location of [`CLI_PROFILE_FILE`].
pub const CLI_CONFIG_FILE_ENV: &str = "DATABRICKS_CONFIG_FILE";
/// Workspace URL used to pick a profile from [`CLI_PROFILE_FILE`].
pub const CLI_HOST_ENV: &str = "DATABRICKS_HOST";
const DEFAULT_PROFILE: &str = "DEFAULT";

/// Relative fallbacks, checked from the working directory outwards.
const RELATIVE_FALLBACKS: &[&str] = &[".env", "../.env", "../../.env", "../../../.env"];

/// Connection secrets for one warehouse.
pub struct Credentials {
    host: String,
    access_token: SecretString,
    warehouse_path: String,
}

impl Credentials {
    pub fn new(
        host: impl Into<String>,
        access_token: SecretString,
        warehouse_path: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            access_token,
            warehouse_path: warehouse_path.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    pub fn warehouse_path(&self) -> &str {
        &self.warehouse_path
    }

    /// The warehouse id is the last segment of the HTTP path,
    /// e.g. `/sql/1.0/warehouses/abc123` → `abc123`.
    pub fn warehouse_id(&self) -> &str {
        self.warehouse_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    /// Scheme and host without a trailing slash. Hosts given without a
    /// scheme are reached over HTTPS.
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.starts_with("https://") || host.starts_with("http://") {
            host.to_string()
        } else {
            format!("https://{host}")
        }
    }

    /// Build credentials from key-value pairs, or name the keys that are
    /// missing (absent, empty, or still a template placeholder).
    fn from_values(values: &HashMap<String, String>) -> Result<Self, Vec<&'static str>> {
        let lookup = |key: &'static str| -> Option<String> {
            let value = values.get(key)?.trim();
            if value.is_empty() || PLACEHOLDERS.iter().any(|(k, v)| *k == key && *v == value) {
                return None;
            }
            Some(value.to_string())
        };

        let host = lookup(HOST_KEY);
        let token = lookup(TOKEN_KEY);
        let path = lookup(HTTP_PATH_KEY);

        match (host, token, path) {
            (Some(host), Some(token), Some(path)) => {
                Ok(Credentials::new(host, SecretString::from(token), path))
            }
            (host, token, path) => {
                let mut missing = Vec::new();
                if host.is_none() {
                    missing.push(HOST_KEY);
                }
                if token.is_none() {
                    missing.push(TOKEN_KEY);
                }
                if path.is_none() {
                    missing.push(HTTP_PATH_KEY);
                }
                Err(missing)
            }
        }
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            access_token: masking::clone_secret(&self.access_token),
            warehouse_path: self.warehouse_path.clone(),
        }
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.warehouse_path == other.warehouse_path
            && self.access_token.expose_secret() == other.access_token.expose_secret()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("access_token", &masking::redact(&self.access_token))
            .field("warehouse_path", &self.warehouse_path)
            .finish()
    }
}

/// A place credentials may be loaded from.
pub trait ConfigurationSource: Send + Sync {
    /// Human-readable location, used in diagnostics.
    fn describe(&self) -> String;

    /// Key-value pairs from this source, or `None` when the source does not
    /// exist. An error means the source exists but could not be read.
    fn load(&self) -> Result<Option<HashMap<String, String>>, GatewayError>;
}

/// A `KEY=value` file in dotenv syntax.
#[derive(Debug, Clone)]
pub struct EnvFileSource {
    path: PathBuf,
}

impl EnvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigurationSource for EnvFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Option<HashMap<String, String>>, GatewayError> {
        if !self.path.is_file() {
            return Ok(None);
        }

        let parse_error = |e: dotenvy::Error| GatewayError::Configuration {
            message: format!("cannot parse {}: {}", self.path.display(), e),
        };

        let mut values = HashMap::new();
        for item in dotenvy::from_path_iter(&self.path).map_err(parse_error)? {
            let (key, value) = item.map_err(parse_error)?;
            values.insert(key, value);
        }
        Ok(Some(values))
    }
}

/// A Databricks CLI profile file (`~/.databrickscfg`), read only.
///
/// With a target host, the first profile whose `host` matches it (trailing
/// slashes ignored) is used; otherwise the `DEFAULT` profile. The profile
/// supplies `host` and `token`, and the warehouse through `http_path` or
/// `warehouse_id`.
#[derive(Debug, Clone)]
pub struct DatabricksCfgSource {
    path: PathBuf,
    target_host: Option<String>,
}

impl DatabricksCfgSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            target_host: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.target_host = Some(host.into());
        self
    }

    /// The file the Databricks CLI itself would read, matched against
    /// `DATABRICKS_HOST` when that is set.
    pub fn from_environment() -> Option<Self> {
        let path = std::env::var_os(CLI_CONFIG_FILE_ENV)
            .map(PathBuf::from)
            .or_else(|| BaseDirs::new().map(|dirs| dirs.home_dir().join(CLI_PROFILE_FILE)))?;
        let source = Self::new(path);
        Some(match std::env::var(CLI_HOST_ENV) {
            Ok(host) if !host.trim().is_empty() => source.with_host(host),
            _ => source,
        })
    }

    fn select<'a>(&self, ini: &'a Ini) -> Option<&'a Properties> {
        match &self.target_host {
            Some(target) => ini
                .iter()
                .map(|(_, profile)| profile)
                .find(|profile| {
                    profile
                        .get("host")
                        .is_some_and(|host| normalize_host(host) == normalize_host(target))
                }),
            None => ini.section(Some(DEFAULT_PROFILE)),
        }
    }
}

fn normalize_host(host: &str) -> &str {
    host.trim().trim_end_matches('/')
}

impl ConfigurationSource for DatabricksCfgSource {
    fn describe(&self) -> String {
        match &self.target_host {
            Some(host) => format!("{} [profile for {}]", self.path.display(), host),
            None => format!("{} [{}]", self.path.display(), DEFAULT_PROFILE),
        }
    }

    fn load(&self) -> Result<Option<HashMap<String, String>>, GatewayError> {
        if !self.path.is_file() {
            return Ok(None);
        }

        let ini = Ini::load_from_file(&self.path).map_err(|e| GatewayError::Configuration {
            message: format!("cannot parse {}: {}", self.path.display(), e),
        })?;
        let Some(profile) = self.select(&ini) else {
            tracing::debug!(source = %self.describe(), "no matching profile");
            return Ok(None);
        };

        let mut values = HashMap::new();
        if let Some(host) = profile.get("host") {
            values.insert(HOST_KEY.to_string(), host.to_string());
        }
        if let Some(token) = profile.get("token") {
            values.insert(TOKEN_KEY.to_string(), token.to_string());
        }
        let warehouse_path = profile
            .get("http_path")
            .map(str::to_string)
            .or_else(|| {
                profile
                    .get("warehouse_id")
                    .map(|id| format!("/sql/1.0/warehouses/{id}"))
            });
        if let Some(path) = warehouse_path {
            values.insert(HTTP_PATH_KEY.to_string(), path);
        }
        Ok(Some(values))
    }
}

/// Fixed in-memory values, for embedding and tests.
#[derive(Clone)]
pub struct StaticSource {
    name: String,
    values: HashMap<String, String>,
}

impl StaticSource {
    pub fn new<K, V>(name: impl Into<String>, values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigurationSource for StaticSource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn load(&self) -> Result<Option<HashMap<String, String>>, GatewayError> {
        Ok(Some(self.values.clone()))
    }
}

/// Ordered list of credential sources.
pub struct CredentialResolver {
    sources: Vec<Box<dyn ConfigurationSource>>,
}

impl CredentialResolver {
    pub fn new(sources: Vec<Box<dyn ConfigurationSource>>) -> Self {
        Self { sources }
    }

    pub fn from_source(source: impl ConfigurationSource + 'static) -> Self {
        Self::new(vec![Box::new(source)])
    }

    /// The standard search: explicit path, then `.env` files from the
    /// working directory up to three levels out, then the per-user config
    /// directory, then the Databricks CLI profile file.
    pub fn layered(explicit: Option<&Path>) -> Self {
        let base_dir = match std::env::current_dir() {
            Ok(dir) => Some(dir),
            Err(e) => {
                tracing::debug!(error = %e, "working directory unavailable, skipping relative credential files");
                None
            }
        };
        let fallback = ProjectDirs::from("", "", "querygate")
            .map(|dirs| dirs.config_dir().join("credentials.env"));
        let resolver = Self::layered_from(explicit, base_dir.as_deref(), fallback);
        match DatabricksCfgSource::from_environment() {
            Some(profile) => resolver.with_source(profile),
            None => resolver,
        }
    }

    /// [`CredentialResolver::layered`] with the working directory and the
    /// last-resort file supplied by the caller.
    pub fn layered_from(
        explicit: Option<&Path>,
        base_dir: Option<&Path>,
        fallback: Option<PathBuf>,
    ) -> Self {
        let mut sources: Vec<Box<dyn ConfigurationSource>> = Vec::new();
        if let Some(path) = explicit {
            sources.push(Box::new(EnvFileSource::new(path)));
        }
        if let Some(base) = base_dir {
            for relative in RELATIVE_FALLBACKS {
                sources.push(Box::new(EnvFileSource::new(base.join(relative))));
            }
        }
        if let Some(path) = fallback {
            sources.push(Box::new(EnvFileSource::new(path)));
        }
        Self::new(sources)
    }

    /// Append a source with the lowest priority so far.
    pub fn with_source(mut self, source: impl ConfigurationSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Descriptions of every source, in priority order.
    pub fn describe_sources(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.describe()).collect()
    }

    /// Load credentials from the first source that provides all of them.
    pub fn resolve(&self) -> Result<Credentials, GatewayError> {
        let mut skipped = Vec::new();

        for source in &self.sources {
            let location = source.describe();
            tracing::debug!(source = %location, "trying credential source");

            let values = match source.load() {
                Ok(Some(values)) => values,
                Ok(None) => {
                    skipped.push(format!("{location} (not found)"));
                    continue;
                }
                Err(e) => {
                    skipped.push(format!("{location} ({e})"));
                    continue;
                }
            };

            match Credentials::from_values(&values) {
                Ok(credentials) => {
                    tracing::debug!(
                        source = %location,
                        host = %credentials.host(),
                        warehouse_id = %credentials.warehouse_id(),
                        token = %masking::redact(credentials.access_token()),
                        "credentials resolved"
                    );
                    return Ok(credentials);
                }
                Err(missing) => {
                    skipped.push(format!("{location} (missing {})", missing.join(", ")));
                }
            }
        }

        let tried = if skipped.is_empty() {
            "no sources configured".to_string()
        } else {
            skipped.join("; ")
        };
        Err(GatewayError::Configuration {
            message: format!(
                "no credential source provided {HOST_KEY}, {TOKEN_KEY} and {HTTP_PATH_KEY}; tried: {tried}"
            ),
        })
    }
}
