//! # Errors
//!
//! Recovery failures are fatal for the restart attempt that hit them: there is no
//! skip path, so every error type here is meant to be propagated to the caller.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = RecoveryError> = std::result::Result<T, E>;

/// Broker operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerOperation {
    /// Fencing initialization for a transactional id.
    Abort,
    /// Introspection of open transactions.
    ListOpenTransactions,
}

impl std::fmt::Display for BrokerOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerOperation::Abort => f.write_str("abort"),
            BrokerOperation::ListOpenTransactions => f.write_str("list open transactions"),
        }
    }
}

/// Failure reported by a broker collaborator.
#[derive(Debug, Error)]
#[error("broker {operation} failed for `{target}`: {message}")]
pub struct BrokerError {
    pub operation: BrokerOperation,
    /// Transactional id or topic list the request was about.
    pub target: String,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BrokerError {
    pub fn abort(transactional_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: BrokerOperation::Abort,
            target: transactional_id.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn list(topics: &[String], message: impl Into<String>) -> Self {
        Self {
            operation: BrokerOperation::ListOpenTransactions,
            target: topics.join(","),
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying client error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

/// Errors raised while naming transactions or recovering stale ones.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecoveryError {
    /// Construction inputs rejected before any broker call.
    #[error("invalid argument `{field}`: {reason}")]
    InvalidArgument { field: &'static str, reason: String },
    /// Identity that does not follow the `<prefix>-<owner>-<sequence>` scheme.
    #[error("malformed transactional id `{raw}`: {reason}")]
    MalformedIdentity { raw: String, reason: String },
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl RecoveryError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        RecoveryError::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(raw: &str, reason: impl Into<String>) -> Self {
        RecoveryError::MalformedIdentity {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    /// True for failures talking to the broker.
    pub fn is_broker_failure(&self) -> bool {
        matches!(self, RecoveryError::Broker(_))
    }
}
