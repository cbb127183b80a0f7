//! Error taxonomy for the ladder agent.
//!
//! Every failure that crosses a component boundary is a `LadderError`.
//! The `kind()` classifier is what retry policies and the cycle-level
//! logger look at; callers should never match on message text.

use std::fmt;

/// Coarse classification used by retry predicates and structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or expired API credential. Never retried.
    Unauthorized,
    /// Timeouts, connection resets, 408/429/5xx. Retried with a bounded count.
    Transient,
    /// Any other non-success HTTP status (400, 404, 422...).
    Rejected,
    /// RPC, gas, revert or insufficient funds on-chain.
    Chain,
    /// Missing price entry, malformed response body.
    DataIntegrity,
    /// Order submitted but its canonical record could not be fetched.
    Untracked,
    /// Invalid configuration or key material.
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Transient => "transient",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Chain => "chain",
            ErrorKind::DataIntegrity => "data_integrity",
            ErrorKind::Untracked => "untracked",
            ErrorKind::Config => "config",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LadderError {
    #[error("Unauthorized (HTTP 401) calling {url}")]
    Unauthorized { url: String },

    #[error("Transient API failure calling {url}: {message}")]
    Transient {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("API rejected request to {url} with HTTP {status}: {body}")]
    Rejected { url: String, status: u16, body: String },

    #[error("On-chain {operation} failed: {message}")]
    Chain {
        operation: String,
        message: String,
        details: Option<String>,
    },

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Order {order_hash} was submitted but is not tracked: {source}")]
    Untracked {
        order_hash: String,
        #[source]
        source: Box<LadderError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LadderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LadderError::Unauthorized { .. } => ErrorKind::Unauthorized,
            LadderError::Transient { .. } => ErrorKind::Transient,
            LadderError::Rejected { .. } => ErrorKind::Rejected,
            LadderError::Chain { .. } => ErrorKind::Chain,
            LadderError::DataIntegrity(_) => ErrorKind::DataIntegrity,
            LadderError::Untracked { .. } => ErrorKind::Untracked,
            LadderError::Config(_) => ErrorKind::Config,
        }
    }

    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            LadderError::Unauthorized { .. } => Some(401),
            LadderError::Transient { status, .. } => *status,
            LadderError::Rejected { status, .. } => Some(*status),
            LadderError::Untracked { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Classify a non-success HTTP status returned by `url`.
    pub fn from_status(url: &str, status: u16, body: String) -> Self {
        match status {
            401 => LadderError::Unauthorized { url: url.to_string() },
            408 | 429 | 500..=599 => LadderError::Transient {
                url: url.to_string(),
                status: Some(status),
                message: body,
            },
            _ => LadderError::Rejected {
                url: url.to_string(),
                status,
                body,
            },
        }
    }

    pub fn chain(operation: &str, message: impl fmt::Display) -> Self {
        let message = message.to_string();
        let details = chain_failure_hint(&message).map(str::to_string);
        LadderError::Chain {
            operation: operation.to_string(),
            message,
            details,
        }
    }

    /// True when an on-chain failure was caused by the wallet running dry.
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, LadderError::Chain { details: Some(_), .. })
    }
}

fn chain_failure_hint(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    if lower.contains("insufficient funds") {
        Some("wallet has insufficient funds for gas")
    } else if lower.contains("gas required exceeds allowance") {
        Some("gas required exceeds allowance")
    } else {
        None
    }
}

impl From<reqwest::Error> for LadderError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map(|u| u.to_string()).unwrap_or_default();
        match e.status() {
            Some(status) => LadderError::from_status(&url, status.as_u16(), e.to_string()),
            None => LadderError::Transient {
                url,
                status: None,
                message: e.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
