//! Error types for the Exchange deployment connector.

use thiserror::Error;

/// Result type alias using `ExchangeError`.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Errors that can occur while deploying disclaimer rules.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Local input validation failed before any network call.
    #[error("Validation error: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    /// Connector configuration or credential setup is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The identity provider rejected the credential exchange, or the remote
    /// surface rejected the token.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The token is valid but the operation is forbidden.
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// The remote surface cannot perform this mutation programmatically.
    #[error("Operation not supported by remote surface ({operation}): {message}")]
    UnsupportedOperation { operation: String, message: String },

    /// Connection failure or a 5xx from the remote side. No remote state changed.
    #[error("Network error: {0}")]
    Network(String),

    /// The caller's deadline elapsed.
    #[error("Operation timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Remote state is ambiguous, e.g. two rules share one name.
    #[error("Remote state error: {0}")]
    RemoteState(String),

    /// Any other error response from the remote surface.
    #[error("Remote API error: {status} {code} - {message}")]
    RemoteApi {
        status: u16,
        code: String,
        message: String,
    },

    /// The deployment record or audit store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl ExchangeError {
    /// Returns true for errors caused by conditions that may clear on their own.
    ///
    /// The connector never retries; this only drives operator messaging.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Network(_) | ExchangeError::Timeout { .. })
    }

    /// True when the error should route the operation to script generation.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ExchangeError::UnsupportedOperation { .. })
    }

    /// Stable code for logs and audit details.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            ExchangeError::Validation { .. } => "VALIDATION_ERROR",
            ExchangeError::Config(_) => "INVALID_CONFIG",
            ExchangeError::Authentication(_) => "AUTHENTICATION_FAILED",
            ExchangeError::Authorization(_) => "AUTHORIZATION_FAILED",
            ExchangeError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            ExchangeError::Network(_) => "NETWORK_ERROR",
            ExchangeError::Timeout { .. } => "TIMEOUT",
            ExchangeError::RemoteState(_) => "REMOTE_STATE_CONFLICT",
            ExchangeError::RemoteApi { .. } => "REMOTE_API_ERROR",
            ExchangeError::Storage(_) => "STORAGE_ERROR",
            ExchangeError::Json(_) => "JSON_ERROR",
            ExchangeError::Url(_) => "URL_ERROR",
        }
    }

    /// Individual messages for the `errors` field of a deployment result.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        match self {
            ExchangeError::Validation { errors } => errors.clone(),
            other => vec![other.to_string()],
        }
    }

    /// Operator-facing hint describing how to fix the failure.
    #[must_use]
    pub fn remediation(&self) -> &'static str {
        match self {
            ExchangeError::Authentication(_) => {
                "Authentication failed: the identity provider rejected the client credentials. \
                 Check the tenant id, client id and client secret, and that the application \
                 registration is enabled."
            }
            ExchangeError::Authorization(_) => {
                "Authorization failed: the credentials are valid but lack permission. \
                 Grant admin consent for the required application permissions."
            }
            ExchangeError::Network(_) | ExchangeError::Timeout { .. } => {
                "Network error: the remote service could not be reached. \
                 Check connectivity and try again."
            }
            ExchangeError::RemoteState(_) => {
                "Remote state conflict: more than one remote rule matches this name. \
                 Remove or rename the duplicates in the mail system."
            }
            ExchangeError::Validation { .. } => "Correct the highlighted fields and try again.",
            ExchangeError::Config(_) => "Review the connector settings for this organization.",
            _ => "The remote service returned an unexpected response.",
        }
    }
}

impl From<sqlx::Error> for ExchangeError {
    fn from(err: sqlx::Error) -> Self {
        ExchangeError::Storage(err.to_string())
    }
}
