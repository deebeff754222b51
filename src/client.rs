use std::time::Duration;

use reqwest::Client;
use tokio::sync::OnceCell;
use tracing::Instrument;

use crate::backend::{self, databricks::DatabricksApi};
use crate::config::GatewaySettings;
use crate::credentials::{CredentialResolver, Credentials};
use crate::error::GatewayError;
use crate::logging::Timer;
use crate::table::ResultTable;
use crate::validation;

/// Statement used by [`QueryClient::test_connection`].
pub const SELF_TEST_SQL: &str = "SELECT 1 AS test";

/// One query to run.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub sql: String,
    /// Label for logs only.
    pub display_name: Option<String>,
    /// Falls back to the client's default timeout.
    pub timeout: Option<Duration>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            display_name: None,
            timeout: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Read-only query gateway to a single SQL warehouse.
///
/// Credentials are resolved on the first call that needs them and reused
/// for the life of the client.
pub struct QueryClient {
    resolver: CredentialResolver,
    settings: GatewaySettings,
    http: Client,
    api: OnceCell<DatabricksApi>,
}

impl QueryClient {
    pub fn new(resolver: CredentialResolver, settings: GatewaySettings) -> Self {
        Self {
            resolver,
            settings,
            http: Client::new(),
            api: OnceCell::new(),
        }
    }

    /// A client over already-known credentials.
    pub fn with_credentials(credentials: Credentials, settings: GatewaySettings) -> Self {
        let client = Self::new(CredentialResolver::new(Vec::new()), settings);
        let api = DatabricksApi::new(client.http.clone(), credentials);
        // A fresh cell cannot already be set.
        let _ = client.api.set(api);
        client
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Resolve credentials now instead of on first use.
    pub async fn credentials(&self) -> Result<&Credentials, GatewayError> {
        Ok(self.api().await?.credentials())
    }

    async fn api(&self) -> Result<&DatabricksApi, GatewayError> {
        self.api
            .get_or_try_init(|| async {
                let credentials = self.resolver.resolve()?;
                Ok::<_, GatewayError>(DatabricksApi::new(self.http.clone(), credentials))
            })
            .await
    }

    /// Validate and run one read-only statement.
    ///
    /// A blocked statement fails before credentials are resolved or any
    /// request is made.
    pub async fn execute(&self, request: &QueryRequest) -> Result<ResultTable, GatewayError> {
        let name = request.display_name.as_deref().unwrap_or("query");
        let timeout = request.timeout.unwrap_or(self.settings.default_timeout);
        let span = tracing::info_span!("query", name = %name);
        self.run(&request.sql, timeout).instrument(span).await
    }

    async fn run(&self, sql: &str, timeout: Duration) -> Result<ResultTable, GatewayError> {
        validation::ensure_read_only(sql).inspect_err(|e| {
            tracing::warn!(error = %e, "statement rejected");
        })?;

        let api = self.api().await?;

        tracing::info!(timeout_ms = timeout.as_millis() as u64, "executing statement");
        let timer = Timer::start();
        let result = backend::run_statement(api, sql, timeout, self.settings.poll_interval).await;

        match &result {
            Ok(table) => {
                tracing::info!(
                    elapsed_ms = timer.elapsed_ms() as u64,
                    rows = table.num_rows(),
                    columns = table.num_columns(),
                    "query complete"
                );
                if table.is_truncated() {
                    tracing::warn!(
                        rows = table.num_rows(),
                        "result truncated by the warehouse row cap"
                    );
                }
            }
            Err(e) => {
                tracing::info!(elapsed_ms = timer.elapsed_ms() as u64, error = %e, "query failed");
            }
        }
        result
    }

    /// Convenience form of [`QueryClient::execute`].
    pub async fn execute_query(
        &self,
        sql: &str,
        name: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<ResultTable, GatewayError> {
        let mut request = QueryRequest::new(sql);
        request.display_name = name.map(str::to_string);
        request.timeout = timeout;
        self.execute(&request).await
    }

    /// Whether a trivial query round-trips. Never returns an error.
    pub async fn test_connection(&self) -> bool {
        let request = QueryRequest::new(SELF_TEST_SQL)
            .with_name("connection test")
            .with_timeout(self.settings.self_test_timeout);

        match self.execute(&request).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "connection test failed");
                false
            }
        }
    }
}

/// A client over [`CredentialResolver::layered`] and the per-user settings
/// file. Credentials are still resolved lazily.
pub fn default_client() -> Result<QueryClient, GatewayError> {
    Ok(QueryClient::new(
        CredentialResolver::layered(None),
        GatewaySettings::load(None)?,
    ))
}

/// Run one read-only statement on a throwaway [`default_client`].
pub async fn query(
    sql: &str,
    name: Option<&str>,
    timeout: Option<Duration>,
) -> Result<ResultTable, GatewayError> {
    default_client()?.execute_query(sql, name, timeout).await
}

/// [`QueryClient::test_connection`] on a throwaway [`default_client`].
pub async fn test_connection() -> bool {
    match default_client() {
        Ok(client) => client.test_connection().await,
        Err(e) => {
            tracing::debug!(error = %e, "connection test could not load settings");
            false
        }
    }
}
