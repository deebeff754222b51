use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{RemoteFailure, ResultPage, StatementApi, StatementSnapshot, StatementState};
use crate::credentials::Credentials;
use crate::error::GatewayError;
use crate::table::{CellValue, ColumnMeta};

/// Added on top of the server-side wait so the HTTP call outlives it.
const REQUEST_GRACE: Duration = Duration::from_secs(10);

/// Timeout for status polls, page fetches and cancellation.
const SHORT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Databricks SQL Statement Execution API for one warehouse.
pub struct DatabricksApi {
    http: Client,
    credentials: Credentials,
}

#[derive(Serialize)]
struct StatementRequest<'a> {
    warehouse_id: &'a str,
    statement: &'a str,
    wait_timeout: String,
    on_wait_timeout: &'static str,
    format: &'static str,
    disposition: &'static str,
}

#[derive(Deserialize)]
struct StatementResponse {
    statement_id: Option<String>,
    status: Option<StatementStatus>,
    manifest: Option<Manifest>,
    result: Option<ResultData>,
}

#[derive(Deserialize)]
struct StatementStatus {
    state: String,
    error: Option<StatementError>,
}

#[derive(Deserialize)]
struct StatementError {
    error_code: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct Manifest {
    schema: Option<SchemaInfo>,
    truncated: Option<bool>,
}

#[derive(Deserialize)]
struct SchemaInfo {
    columns: Option<Vec<ColumnInfo>>,
}

#[derive(Deserialize)]
struct ColumnInfo {
    name: String,
    type_text: Option<String>,
    type_name: Option<String>,
}

#[derive(Deserialize)]
struct ResultData {
    data_array: Option<Vec<Vec<Value>>>,
    next_chunk_internal_link: Option<String>,
    manifest: Option<Manifest>,
}

/// Error body returned with non-2xx responses.
#[derive(Deserialize)]
struct ApiErrorBody {
    error_code: Option<String>,
    message: Option<String>,
}

impl DatabricksApi {
    pub fn new(http: Client, credentials: Credentials) -> Self {
        Self { http, credentials }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn statements_url(&self) -> String {
        format!("{}/api/2.0/sql/statements", self.credentials.base_url())
    }

    async fn send(
        &self,
        request: RequestBuilder,
        action: &str,
        timeout: Duration,
    ) -> Result<String, GatewayError> {
        let resp = request
            .bearer_auth(self.credentials.access_token().expose_secret())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, action, timeout))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| transport_error(e, action, timeout))?;

        if !status.is_success() {
            return Err(http_error(status, &body));
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        action: &str,
        timeout: Duration,
    ) -> Result<T, GatewayError> {
        let body = self.send(request, action, timeout).await?;
        serde_json::from_str(&body).map_err(|e| {
            GatewayError::remote(format!("failed to parse {action} response: {e}"))
        })
    }
}

impl StatementApi for DatabricksApi {
    async fn submit(&self, sql: &str, wait: Duration) -> Result<StatementSnapshot, GatewayError> {
        let request = StatementRequest {
            warehouse_id: self.credentials.warehouse_id(),
            statement: sql,
            wait_timeout: format!("{}s", wait.as_secs()),
            on_wait_timeout: "CONTINUE",
            format: "JSON_ARRAY",
            disposition: "INLINE",
        };

        let url = format!("{}/", self.statements_url());
        let response: StatementResponse = self
            .send_json(
                self.http.post(&url).json(&request),
                "execute statement",
                wait + REQUEST_GRACE,
            )
            .await?;
        Ok(snapshot_from(response))
    }

    async fn poll(&self, statement_id: &str) -> Result<StatementSnapshot, GatewayError> {
        let url = format!("{}/{}", self.statements_url(), statement_id);
        let response: StatementResponse = self
            .send_json(self.http.get(&url), "poll statement", SHORT_REQUEST_TIMEOUT)
            .await?;
        Ok(snapshot_from(response))
    }

    async fn fetch_page(&self, link: &str) -> Result<ResultPage, GatewayError> {
        let url = format!("{}{}", self.credentials.base_url(), link);
        let data: ResultData = self
            .send_json(self.http.get(&url), "fetch result chunk", SHORT_REQUEST_TIMEOUT)
            .await?;
        Ok(page_from(data))
    }

    async fn cancel(&self, statement_id: &str) -> Result<(), GatewayError> {
        let url = format!("{}/{}/cancel", self.statements_url(), statement_id);
        self.send(self.http.post(&url), "cancel statement", SHORT_REQUEST_TIMEOUT)
            .await
            .map(|_| ())
    }
}

fn snapshot_from(response: StatementResponse) -> StatementSnapshot {
    let (state, failure) = match response.status {
        Some(status) => (
            StatementState::parse(&status.state),
            status.error.map(|e| RemoteFailure {
                error_code: e.error_code,
                message: e.message,
            }),
        ),
        // Some gateways drop the status block on inline successes.
        None if response.result.is_some() => (StatementState::Succeeded, None),
        None => (StatementState::Unknown("missing status".to_string()), None),
    };

    let (page, nested_manifest) = match response.result {
        Some(mut data) => {
            let nested = data.manifest.take();
            (Some(page_from(data)), nested)
        }
        None => (None, None),
    };

    // The schema normally sits at the top level; older responses nest it
    // under `result`.
    let manifest = response.manifest.or(nested_manifest);
    let truncated = manifest
        .as_ref()
        .and_then(|m| m.truncated)
        .unwrap_or(false);
    let columns = manifest
        .and_then(|m| m.schema)
        .and_then(|s| s.columns)
        .map(|columns| {
            columns
                .into_iter()
                .map(|c| {
                    let type_name = c
                        .type_text
                        .or(c.type_name)
                        .unwrap_or_else(|| "STRING".to_string());
                    ColumnMeta::new(c.name, type_name)
                })
                .collect()
        });

    StatementSnapshot {
        statement_id: response.statement_id,
        state,
        failure,
        columns,
        truncated,
        page,
    }
}

fn page_from(data: ResultData) -> ResultPage {
    let rows = data
        .data_array
        .unwrap_or_default()
        .into_iter()
        .map(|row| row.into_iter().map(CellValue::from_json).collect())
        .collect();
    ResultPage {
        rows,
        next_link: data.next_chunk_internal_link,
    }
}

fn transport_error(e: reqwest::Error, action: &str, timeout: Duration) -> GatewayError {
    if e.is_timeout() {
        return GatewayError::Timeout { timeout };
    }
    GatewayError::Transport {
        message: format!("failed to {action}: {}", error_chain(&e)),
    }
}

/// `e` followed by its sources, so DNS and TLS causes are not lost.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn http_error(status: reqwest::StatusCode, body: &str) -> GatewayError {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
    let error_code = parsed.as_ref().and_then(|b| b.error_code.clone());
    let message = match parsed.and_then(|b| b.message) {
        Some(message) => message,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };

    GatewayError::RemoteExecution {
        status: Some(status.as_u16()),
        error_code,
        message,
    }
}
