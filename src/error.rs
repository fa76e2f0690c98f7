//! Failure taxonomy and the classifier that maps low-level causes into it.
//!
//! Every terminal failure surfaced by a run goes through [`classify`], so callers only
//! ever see an [`AgentError`] with a machine-checkable [`ErrorKind`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of failure kinds. Serialized as `SCREAMING_SNAKE_CASE` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationError,
    InvalidJson,
    BackendNotConfigured,
    Cancelled,
    Timeout,
    NetworkError,
    ParseError,
    InvalidResponse,
    ApiError,
    AgentError,
    /// The run was displaced by a newer `start` on the same controller.
    Superseded,
    UnknownError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 12] = [
        ErrorKind::ValidationError,
        ErrorKind::InvalidJson,
        ErrorKind::BackendNotConfigured,
        ErrorKind::Cancelled,
        ErrorKind::Timeout,
        ErrorKind::NetworkError,
        ErrorKind::ParseError,
        ErrorKind::InvalidResponse,
        ErrorKind::ApiError,
        ErrorKind::AgentError,
        ErrorKind::Superseded,
        ErrorKind::UnknownError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::InvalidJson => "INVALID_JSON",
            ErrorKind::BackendNotConfigured => "BACKEND_NOT_CONFIGURED",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::ParseError => "PARSE_ERROR",
            ErrorKind::InvalidResponse => "INVALID_RESPONSE",
            ErrorKind::ApiError => "API_ERROR",
            ErrorKind::AgentError => "AGENT_ERROR",
            ErrorKind::Superseded => "SUPERSEDED",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown error kind '{s}'"))
    }
}

/// Terminal failure of a run as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("[{kind}] {message}")]
pub struct AgentError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl AgentError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Whether re-submitting the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ErrorKind::ValidationError
            | ErrorKind::InvalidJson
            | ErrorKind::BackendNotConfigured
            | ErrorKind::ParseError
            | ErrorKind::InvalidResponse
            | ErrorKind::Superseded => false,
            ErrorKind::ApiError => self.status_code.map_or(true, |s| s >= 500),
            ErrorKind::Cancelled
            | ErrorKind::Timeout
            | ErrorKind::NetworkError
            | ErrorKind::AgentError
            | ErrorKind::UnknownError => true,
        }
    }
}

/// Structured error body returned by the backend on non-success status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Raw failure causes, as observed by validation, executors and the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureCause {
    /// Structural validation failure at submission time.
    Validation(String),
    /// Request body is not JSON at all.
    InvalidJson(String),
    BackendNotConfigured,
    /// Displaced by a newer run on the same controller.
    Superseded,
    /// Abort signal fired; `cancel_requested` records whether the caller asked for it.
    Aborted { cancel_requested: bool },
    /// DNS/TLS/refused-class transport failure.
    Connect(String),
    /// Response body is not the expected structured format.
    Parse(String),
    /// Response parsed but lacks `runId` or `status`.
    MissingIdentity,
    HttpStatus { status: u16, body: Option<ErrorBody> },
    /// Failure reported by the agent itself (including injected faults).
    AgentFault(String),
    Other(String),
}

/// Ambient facts the classifier needs for diagnosable messages.
#[derive(Debug, Clone, Default)]
pub struct ClassifyContext {
    pub backend_base: Option<String>,
}

impl ClassifyContext {
    pub fn with_backend(base: impl Into<String>) -> Self {
        Self {
            backend_base: Some(base.into()),
        }
    }
}

const DEFAULT_API_MESSAGE: &str = "An error occurred while running the agent";

/// Map a failure cause into the closed taxonomy.
pub fn classify(cause: FailureCause, ctx: &ClassifyContext) -> AgentError {
    match cause {
        FailureCause::Validation(msg) => {
            AgentError::new(ErrorKind::ValidationError, format!("Invalid request: {msg}"))
        }
        FailureCause::InvalidJson(detail) => AgentError::new(
            ErrorKind::InvalidJson,
            format!("Invalid JSON in request body: {detail}"),
        ),
        FailureCause::BackendNotConfigured => AgentError::new(
            ErrorKind::BackendNotConfigured,
            "Backend is not configured. Set AGENT_BACKEND_URL or pass --backend-url.",
        ),
        FailureCause::Superseded => AgentError::new(
            ErrorKind::Superseded,
            "Agent run was superseded by a newer run",
        ),
        FailureCause::Aborted {
            cancel_requested: true,
        } => AgentError::new(ErrorKind::Cancelled, "Agent run was cancelled"),
        FailureCause::Aborted {
            cancel_requested: false,
        } => AgentError::new(ErrorKind::Timeout, "Request timed out. Please try again."),
        FailureCause::Connect(detail) => {
            let base = ctx.backend_base.as_deref().unwrap_or("unset");
            AgentError::new(
                ErrorKind::NetworkError,
                format!(
                    "Failed to reach agent backend at {base}: {detail}. Check that the backend URL is correct and the backend is running."
                ),
            )
        }
        FailureCause::Parse(detail) => AgentError::new(
            ErrorKind::ParseError,
            format!("Failed to parse response from agent: {detail}"),
        ),
        FailureCause::MissingIdentity => AgentError::new(
            ErrorKind::InvalidResponse,
            "Invalid response format from agent: missing runId or status",
        ),
        FailureCause::HttpStatus { status, body } => {
            let body = body.unwrap_or_default();
            let kind = body
                .code
                .as_deref()
                .and_then(|c| c.parse::<ErrorKind>().ok())
                .unwrap_or(ErrorKind::ApiError);
            let message = body
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_API_MESSAGE.to_string());
            AgentError::new(kind, message).with_status(status)
        }
        FailureCause::AgentFault(msg) => AgentError::new(ErrorKind::AgentError, msg),
        FailureCause::Other(msg) => {
            let message = if msg.trim().is_empty() {
                "An unexpected error occurred".to_string()
            } else {
                msg
            };
            AgentError::new(ErrorKind::UnknownError, message)
        }
    }
}
