//! Error types for the fetch pipeline.
//!
//! Request-level failures are [`FetchError`]; per-record validation
//! failures are [`RecordRejection`] and never abort a batch.

use thiserror::Error;

/// Failure of a single upstream request.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure or non-success HTTP status.
    #[error("upstream unavailable{}: {}", status_suffix(.status), .reason)]
    UpstreamUnavailable { status: Option<u16>, reason: String },

    /// The body did not carry an array-shaped `data` field.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl FetchError {
    pub fn status(status: u16, reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            status: Some(status),
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            status: None,
            reason: reason.into(),
        }
    }

    /// HTTP status code, when the server answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::UpstreamUnavailable { status, .. } => *status,
            Self::MalformedResponse(_) => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::transport(format!("request timed out: {}", err))
        } else if err.is_connect() {
            Self::transport(format!("connection failed: {}", err))
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::UpstreamUnavailable {
                status: err.status().map(|s| s.as_u16()),
                reason: err.to_string(),
            }
        }
    }
}

/// Why an upstream record was dropped before entering the relationship set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecordRejection {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record has no AVS id")]
    MissingAvs,
    #[error("record has no operator id")]
    MissingOperator,
    #[error("record has no strategy id")]
    MissingStrategy,
}
