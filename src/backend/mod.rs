//! Statement execution as a bounded poll loop.
//!
//! One execution moves through `Submitted → Running → Succeeded`, leaving
//! early with a remote failure or a timeout. The loop only talks to the
//! warehouse through [`StatementApi`], and every call it makes is bounded by
//! what is left of the caller's timeout.

pub mod databricks;

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::GatewayError;
use crate::table::{CellValue, ColumnMeta, ResultTable};

/// Statement lifecycle as reported by the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Closed,
    Unknown(String),
}

impl StatementState {
    pub fn parse(state: &str) -> Self {
        match state {
            "PENDING" => StatementState::Pending,
            "RUNNING" => StatementState::Running,
            "SUCCEEDED" => StatementState::Succeeded,
            "FAILED" => StatementState::Failed,
            "CANCELED" => StatementState::Canceled,
            "CLOSED" => StatementState::Closed,
            other => StatementState::Unknown(other.to_string()),
        }
    }
}

/// Diagnostic attached to a failed statement, kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteFailure {
    pub error_code: Option<String>,
    pub message: Option<String>,
}

/// One page of rows plus the link to the next page, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    pub rows: Vec<Vec<CellValue>>,
    pub next_link: Option<String>,
}

/// What the warehouse said about a statement at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementSnapshot {
    pub statement_id: Option<String>,
    pub state: StatementState,
    pub failure: Option<RemoteFailure>,
    pub columns: Option<Vec<ColumnMeta>>,
    pub truncated: bool,
    pub page: Option<ResultPage>,
}

/// Remote operations the poll loop needs.
pub trait StatementApi {
    /// Submit `sql`, letting the server hold the response for up to `wait`.
    fn submit(
        &self,
        sql: &str,
        wait: Duration,
    ) -> impl Future<Output = Result<StatementSnapshot, GatewayError>> + Send;

    fn poll(
        &self,
        statement_id: &str,
    ) -> impl Future<Output = Result<StatementSnapshot, GatewayError>> + Send;

    fn fetch_page(
        &self,
        link: &str,
    ) -> impl Future<Output = Result<ResultPage, GatewayError>> + Send;

    fn cancel(&self, statement_id: &str)
    -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Shortest and longest server-side wait the statement API accepts.
pub const MIN_WAIT: Duration = Duration::from_secs(5);
pub const MAX_WAIT: Duration = Duration::from_secs(50);

/// Upper bound on the best-effort cancel sent after the deadline.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Server-side wait window for a caller timeout.
pub fn wait_window(timeout: Duration) -> Duration {
    Duration::from_secs(timeout.as_secs()).clamp(MIN_WAIT, MAX_WAIT)
}

/// The caller's time budget for one execution.
struct Deadline {
    started: Instant,
    timeout: Duration,
}

impl Deadline {
    fn start(timeout: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
        }
    }

    fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.started.elapsed())
    }

    fn exceeded(&self) -> GatewayError {
        GatewayError::Timeout {
            timeout: self.timeout,
        }
    }

    /// Run one remote call within the remaining budget.
    ///
    /// Timeouts raised by the call itself are reported against the
    /// caller's budget too.
    async fn bound<T>(
        &self,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        match tokio::time::timeout(self.remaining(), call).await {
            Ok(Err(GatewayError::Timeout { .. })) | Err(_) => Err(self.exceeded()),
            Ok(result) => result,
        }
    }
}

enum ExecutionPhase {
    Submitted,
    Running { statement_id: String },
    Succeeded(StatementSnapshot),
}

/// Run `sql` to completion or until `timeout` has elapsed.
///
/// Polling is not a retry: the statement is submitted exactly once.
pub async fn run_statement<A: StatementApi>(
    api: &A,
    sql: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<ResultTable, GatewayError> {
    let deadline = Deadline::start(timeout);
    let mut phase = ExecutionPhase::Submitted;
    let mut polls = 0u32;

    loop {
        phase = match phase {
            ExecutionPhase::Submitted => {
                let snapshot = deadline
                    .bound(api.submit(sql, wait_window(timeout)))
                    .await
                    .inspect_err(|e| {
                        if matches!(e, GatewayError::Timeout { .. }) {
                            tracing::warn!("deadline reached before the statement was acknowledged");
                        }
                    })?;
                advance(snapshot, None)?
            }
            ExecutionPhase::Running { statement_id } => {
                let remaining = deadline.remaining();
                if remaining.is_zero() {
                    return Err(abandon(api, &statement_id, &deadline, polls).await);
                }

                tokio::time::sleep(poll_interval.min(remaining)).await;
                polls += 1;
                tracing::debug!(%statement_id, polls, "polling statement status");

                let snapshot = match deadline.bound(api.poll(&statement_id)).await {
                    Err(GatewayError::Timeout { .. }) => {
                        return Err(abandon(api, &statement_id, &deadline, polls).await);
                    }
                    other => other?,
                };
                advance(snapshot, Some(statement_id))?
            }
            ExecutionPhase::Succeeded(snapshot) => {
                return collect(api, snapshot, &deadline).await;
            }
        };
    }
}

/// Cancel a statement that outlived the deadline and return the timeout.
async fn abandon<A: StatementApi>(
    api: &A,
    statement_id: &str,
    deadline: &Deadline,
    polls: u32,
) -> GatewayError {
    tracing::debug!(%statement_id, polls, "deadline reached, canceling statement");
    match tokio::time::timeout(CANCEL_GRACE, api.cancel(statement_id)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(%statement_id, error = %e, "failed to cancel timed out statement");
        }
        Err(_) => {
            tracing::warn!(%statement_id, "cancel request did not complete in time");
        }
    }
    deadline.exceeded()
}

fn advance(
    snapshot: StatementSnapshot,
    known_id: Option<String>,
) -> Result<ExecutionPhase, GatewayError> {
    match snapshot.state {
        StatementState::Pending | StatementState::Running => {
            let statement_id = snapshot
                .statement_id
                .or(known_id)
                .ok_or_else(|| GatewayError::remote("no statement_id in pending response"))?;
            Ok(ExecutionPhase::Running { statement_id })
        }
        StatementState::Succeeded => Ok(ExecutionPhase::Succeeded(snapshot)),
        StatementState::Failed => {
            let failure = snapshot.failure.unwrap_or_default();
            Err(GatewayError::RemoteExecution {
                status: None,
                error_code: failure.error_code,
                message: failure
                    .message
                    .unwrap_or_else(|| "statement failed without a message".to_string()),
            })
        }
        StatementState::Canceled => Err(GatewayError::remote("statement was canceled")),
        StatementState::Closed => Err(GatewayError::remote("statement was closed")),
        StatementState::Unknown(state) => Err(GatewayError::remote(format!(
            "unexpected statement state: {state}"
        ))),
    }
}

async fn collect<A: StatementApi>(
    api: &A,
    snapshot: StatementSnapshot,
    deadline: &Deadline,
) -> Result<ResultTable, GatewayError> {
    let first = snapshot.page.unwrap_or_default();
    let mut rows = first.rows;
    let mut next_link = first.next_link;
    let mut pages = 1u32;

    while let Some(link) = next_link {
        let page = deadline.bound(api.fetch_page(&link)).await?;
        rows.extend(page.rows);
        next_link = page.next_link;
        pages += 1;
    }

    let columns = match snapshot.columns {
        Some(columns) => columns,
        None => positional_columns(&rows),
    };

    tracing::debug!(pages, rows = rows.len(), "result pages collected");

    Ok(ResultTable::new(columns, rows)?.with_truncated(snapshot.truncated))
}

/// Names for rows that arrived without a schema: `_c0`, `_c1`, ...
fn positional_columns(rows: &[Vec<CellValue>]) -> Vec<ColumnMeta> {
    let width = rows.first().map(Vec::len).unwrap_or(0);
    (0..width)
        .map(|i| ColumnMeta::new(format!("_c{i}"), "STRING"))
        .collect()
}
