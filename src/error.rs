use std::time::Duration;

use thiserror::Error;

use crate::validation::DenialKind;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration: {message}")]
    Configuration { message: String },

    #[error("unsafe statement: {detail}")]
    UnsafeStatement { kind: DenialKind, detail: String },

    #[error("transport: {message}")]
    Transport { message: String },

    #[error("remote execution: {}", remote_display(.status, .error_code, .message))]
    RemoteExecution {
        status: Option<u16>,
        error_code: Option<String>,
        message: String,
    },

    #[error("timeout: query timed out after {}", display_duration(.timeout))]
    Timeout { timeout: Duration },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("format: {message}")]
    Format { message: String },
}

impl GatewayError {
    pub(crate) fn remote(message: impl Into<String>) -> Self {
        GatewayError::RemoteExecution {
            status: None,
            error_code: None,
            message: message.into(),
        }
    }

    /// Whether re-issuing the same call unchanged can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport { .. } | GatewayError::Timeout { .. }
        )
    }
}

fn remote_display(status: &Option<u16>, error_code: &Option<String>, message: &str) -> String {
    match (status, error_code) {
        (Some(status), Some(code)) => format!("HTTP {status}: {message} (code: {code})"),
        (Some(status), None) => format!("HTTP {status}: {message}"),
        (None, Some(code)) => format!("{message} (code: {code})"),
        (None, None) => message.to_string(),
    }
}

fn display_duration(timeout: &Duration) -> String {
    if timeout.subsec_millis() == 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{}ms", timeout.as_millis())
    }
}
