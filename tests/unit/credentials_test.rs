use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use querygate::credentials::{
    ConfigurationSource, CredentialResolver, DatabricksCfgSource, EnvFileSource, HOST_KEY,
    HTTP_PATH_KEY, StaticSource, TOKEN_KEY,
};
use querygate::error::GatewayError;
use secrecy::ExposeSecret;
use tempfile::TempDir;

const COMPLETE: &str = "\
DATABRICKS_SERVER_HOSTNAME=example.cloud.databricks.com
DATABRICKS_ACCESS_TOKEN=dapi-abc123
DATABRICKS_HTTP_PATH=/sql/1.0/warehouses/0468b6bc765c667c
";

fn write_env(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

/// Source that counts how often it is consulted.
struct CountingSource {
    inner: StaticSource,
    loads: Arc<AtomicUsize>,
}

impl ConfigurationSource for CountingSource {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn load(&self) -> Result<Option<HashMap<String, String>>, GatewayError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load()
    }
}

fn complete_static(name: &str, host: &str) -> StaticSource {
    StaticSource::new(
        name,
        [
            (HOST_KEY, host),
            (TOKEN_KEY, "dapi-static"),
            (HTTP_PATH_KEY, "/sql/1.0/warehouses/wh1"),
        ],
    )
}

#[test]
fn test_env_file_resolves_all_fields() {
    let dir = TempDir::new().unwrap();
    let path = write_env(dir.path(), "creds.env", COMPLETE);

    let creds = CredentialResolver::from_source(EnvFileSource::new(&path))
        .resolve()
        .unwrap();

    assert_eq!(creds.host(), "example.cloud.databricks.com");
    assert_eq!(creds.access_token().expose_secret(), "dapi-abc123");
    assert_eq!(creds.warehouse_path(), "/sql/1.0/warehouses/0468b6bc765c667c");
    assert_eq!(creds.warehouse_id(), "0468b6bc765c667c");
    assert_eq!(creds.base_url(), "https://example.cloud.databricks.com");
}

#[test]
fn test_env_file_supports_quotes_and_comments() {
    let dir = TempDir::new().unwrap();
    let path = write_env(
        dir.path(),
        ".env",
        "# workspace\nDATABRICKS_SERVER_HOSTNAME=\"example.cloud.databricks.com\"\n\
         DATABRICKS_ACCESS_TOKEN='dapi-quoted'\nDATABRICKS_HTTP_PATH=/sql/1.0/warehouses/abc/\n",
    );

    let creds = CredentialResolver::from_source(EnvFileSource::new(&path))
        .resolve()
        .unwrap();

    assert_eq!(creds.host(), "example.cloud.databricks.com");
    assert_eq!(creds.access_token().expose_secret(), "dapi-quoted");
    assert_eq!(creds.warehouse_id(), "abc");
}

#[test]
fn test_explicit_path_wins_over_relative_fallback() {
    let dir = TempDir::new().unwrap();
    let explicit = write_env(
        dir.path(),
        "explicit/creds.env",
        &COMPLETE.replace("example.cloud", "explicit.cloud"),
    );
    write_env(dir.path(), "project/.env", COMPLETE);

    let project = dir.path().join("project");
    let resolver = CredentialResolver::layered_from(Some(explicit.as_path()), Some(project.as_path()), None);
    let creds = resolver.resolve().unwrap();

    assert_eq!(creds.host(), "explicit.cloud.databricks.com");
}

#[test]
fn test_missing_explicit_path_falls_through_to_parent_directories() {
    let dir = TempDir::new().unwrap();
    write_env(dir.path(), "repo/.env", COMPLETE);
    let nested = dir.path().join("repo/notebooks/temp_code");
    fs::create_dir_all(&nested).unwrap();

    let missing = dir.path().join("does-not-exist.env");
    let creds = CredentialResolver::layered_from(Some(missing.as_path()), Some(nested.as_path()), None)
        .resolve()
        .unwrap();

    assert_eq!(creds.warehouse_id(), "0468b6bc765c667c");
}

#[test]
fn test_nearest_directory_wins() {
    let dir = TempDir::new().unwrap();
    write_env(dir.path(), "repo/.env", &COMPLETE.replace("example", "outer"));
    write_env(dir.path(), "repo/utils/.env", &COMPLETE.replace("example", "inner"));
    let cwd = dir.path().join("repo/utils");

    let creds = CredentialResolver::layered_from(None, Some(cwd.as_path()), None)
        .resolve()
        .unwrap();

    assert_eq!(creds.host(), "inner.cloud.databricks.com");
}

#[test]
fn test_incomplete_file_is_skipped() {
    let dir = TempDir::new().unwrap();
    write_env(
        dir.path(),
        "repo/utils/.env",
        "DATABRICKS_SERVER_HOSTNAME=partial.cloud.databricks.com\n",
    );
    write_env(dir.path(), "repo/.env", COMPLETE);

    let cwd = dir.path().join("repo/utils");
    let creds = CredentialResolver::layered_from(None, Some(cwd.as_path()), None)
        .resolve()
        .unwrap();

    assert_eq!(creds.host(), "example.cloud.databricks.com");
}

#[test]
fn test_absolute_fallback_used_last() {
    let dir = TempDir::new().unwrap();
    let fallback = write_env(dir.path(), "config/credentials.env", COMPLETE);
    let empty_cwd = dir.path().join("a/b/c/d");
    fs::create_dir_all(&empty_cwd).unwrap();

    let creds = CredentialResolver::layered_from(None, Some(empty_cwd.as_path()), Some(fallback))
        .resolve()
        .unwrap();

    assert_eq!(creds.host(), "example.cloud.databricks.com");
}

#[test]
fn test_no_source_is_configuration_error_listing_locations() {
    let dir = TempDir::new().unwrap();
    let partial = write_env(dir.path(), "partial.env", "DATABRICKS_ACCESS_TOKEN=dapi\n");

    let err = CredentialResolver::from_source(EnvFileSource::new(&partial))
        .resolve()
        .unwrap_err();

    match &err {
        GatewayError::Configuration { message } => {
            assert!(message.contains("partial.env"), "{}", message);
            assert!(message.contains(HOST_KEY), "{}", message);
            assert!(message.contains(HTTP_PATH_KEY), "{}", message);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.to_string().contains("dapi"), "secret leaked: {}", err);
}

#[test]
fn test_placeholder_values_are_rejected() {
    let source = StaticSource::new(
        "template",
        [
            (HOST_KEY, "your_hostname"),
            (TOKEN_KEY, "your_token"),
            (HTTP_PATH_KEY, "/sql/1.0/warehouses/your_warehouse_id"),
        ],
    );
    let err = CredentialResolver::from_source(source).resolve().unwrap_err();
    assert!(matches!(err, GatewayError::Configuration { .. }));
}

#[test]
fn test_empty_resolver_is_configuration_error() {
    let err = CredentialResolver::new(Vec::new()).resolve().unwrap_err();
    assert!(err.to_string().contains("no sources configured"), "{}", err);
}

#[test]
fn test_resolution_is_deterministic_and_stops_at_first_match() {
    let first_loads = Arc::new(AtomicUsize::new(0));
    let second_loads = Arc::new(AtomicUsize::new(0));
    let resolver = CredentialResolver::new(vec![
        Box::new(CountingSource {
            inner: complete_static("first", "first.example.com"),
            loads: first_loads.clone(),
        }),
        Box::new(CountingSource {
            inner: complete_static("second", "second.example.com"),
            loads: second_loads.clone(),
        }),
    ]);

    let a = resolver.resolve().unwrap();
    let b = resolver.resolve().unwrap();

    assert_eq!(a, b);
    assert_eq!(a.host(), "first.example.com");
    assert_eq!(first_loads.load(Ordering::SeqCst), 2);
    assert_eq!(second_loads.load(Ordering::SeqCst), 0);
}

#[test]
fn test_host_with_scheme_is_kept() {
    let creds = CredentialResolver::from_source(complete_static("s", "http://127.0.0.1:8080/"))
        .resolve()
        .unwrap();
    assert_eq!(creds.base_url(), "http://127.0.0.1:8080");
}

#[test]
fn test_describe_sources_in_priority_order() {
    let resolver = CredentialResolver::layered_from(
        Some(Path::new("/explicit/creds.env")),
        Some(Path::new("/work/repo")),
        Some("/home/u/.config/querygate/credentials.env".into()),
    );
    let sources = resolver.describe_sources();
    assert_eq!(sources.len(), 6);
    assert_eq!(sources[0], "/explicit/creds.env");
    assert!(sources[1].ends_with(".env"));
    assert_eq!(sources[5], "/home/u/.config/querygate/credentials.env");
}

// --- Databricks CLI profile file ---

const PROFILES: &str = "\
[DEFAULT]
host = https://default.cloud.databricks.com
token = dapi-default
warehouse_id = wh-default

[dev]
host = https://dev.cloud.databricks.com/
token = dapi-dev
http_path = /sql/1.0/warehouses/wh-dev

[tokenless]
host = https://tokenless.cloud.databricks.com
warehouse_id = wh-none
";

#[test]
fn test_cli_profile_matched_on_host_ignoring_trailing_slash() {
    let dir = TempDir::new().unwrap();
    let path = write_env(dir.path(), ".databrickscfg", PROFILES);

    let creds = CredentialResolver::from_source(
        DatabricksCfgSource::new(&path).with_host("https://dev.cloud.databricks.com"),
    )
    .resolve()
    .unwrap();

    assert_eq!(creds.host(), "https://dev.cloud.databricks.com/");
    assert_eq!(creds.access_token().expose_secret(), "dapi-dev");
    assert_eq!(creds.warehouse_id(), "wh-dev");
    assert_eq!(creds.base_url(), "https://dev.cloud.databricks.com");
}

#[test]
fn test_cli_default_profile_without_target_host() {
    let dir = TempDir::new().unwrap();
    let path = write_env(dir.path(), ".databrickscfg", PROFILES);

    let creds = CredentialResolver::from_source(DatabricksCfgSource::new(&path))
        .resolve()
        .unwrap();

    assert_eq!(creds.access_token().expose_secret(), "dapi-default");
    assert_eq!(creds.warehouse_path(), "/sql/1.0/warehouses/wh-default");
}

#[test]
fn test_cli_profile_without_token_is_incomplete() {
    let dir = TempDir::new().unwrap();
    let path = write_env(dir.path(), ".databrickscfg", PROFILES);

    let err = CredentialResolver::from_source(
        DatabricksCfgSource::new(&path).with_host("https://tokenless.cloud.databricks.com"),
    )
    .resolve()
    .unwrap_err();

    let message = err.to_string();
    assert!(message.contains(&format!("missing {TOKEN_KEY}")), "{message}");
}

#[test]
fn test_cli_profile_with_unknown_host_is_not_found() {
    let dir = TempDir::new().unwrap();
    let path = write_env(dir.path(), ".databrickscfg", PROFILES);

    let err = CredentialResolver::from_source(
        DatabricksCfgSource::new(&path).with_host("https://other.cloud.databricks.com"),
    )
    .resolve()
    .unwrap_err();

    assert!(matches!(err, GatewayError::Configuration { .. }), "got {err:?}");
    assert!(err.to_string().contains("not found"), "{err}");
    assert!(!err.to_string().contains("dapi-"), "secrets leaked: {err}");
}

#[test]
fn test_cli_profile_is_consulted_after_env_files() {
    let dir = TempDir::new().unwrap();
    let cfg = write_env(dir.path(), "home/.databrickscfg", PROFILES);
    let cwd = dir.path().join("repo");
    fs::create_dir_all(&cwd).unwrap();

    let resolver = CredentialResolver::layered_from(None, Some(cwd.as_path()), None)
        .with_source(DatabricksCfgSource::new(&cfg));
    assert_eq!(resolver.resolve().unwrap().access_token().expose_secret(), "dapi-default");

    write_env(&cwd, ".env", COMPLETE);
    assert_eq!(resolver.resolve().unwrap().access_token().expose_secret(), "dapi-abc123");
}

#[test]
fn test_cli_profile_file_is_not_modified() {
    let dir = TempDir::new().unwrap();
    let path = write_env(dir.path(), ".databrickscfg", PROFILES);

    CredentialResolver::from_source(DatabricksCfgSource::new(&path))
        .resolve()
        .unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), PROFILES);
}

#[test]
fn test_standard_search_ends_with_cli_profile_file() {
    let sources = CredentialResolver::layered(None).describe_sources();
    let last = sources.last().expect("standard search has sources");
    assert!(
        last.contains("[DEFAULT]") || last.contains("[profile for "),
        "last source should be the CLI profile file: {last}"
    );
}
