//! Error types for psnsync operations

use thiserror::Error;

/// Failures raised by the raw HTTP transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request rejected: authentication required")]
    AuthRejected,

    #[error("Access denied")]
    AccessDenied,

    #[error("Backend unavailable")]
    Unavailable,

    #[error("Backend timed out")]
    Timeout,

    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Backend responded with status {status}")]
    Backend { status: u16 },
}

/// Payload shape violations found while parsing a backend reply.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Missing field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Malformed payload: {reason}")]
    Malformed { reason: String },
}

impl ParseError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField { field: field.into() }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Cache blob encode/decode failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Failed to encode cache: {reason}")]
    Encode { reason: String },

    #[error("Failed to decode cache: {reason}")]
    Decode { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file: {reason}")]
    Io { reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Failed to initialize tracing: {reason}")]
    Tracing { reason: String },
}

/// Master error type surfaced to the host.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PsnError {
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Access denied")]
    AccessDenied,

    #[error("Unknown backend response: {reason}")]
    UnknownBackendResponse { reason: String },

    #[error("Invalid params: {reason}")]
    InvalidParams { reason: String },

    #[error("Backend not available")]
    BackendUnavailable,

    #[error("Backend timeout")]
    BackendTimeout,

    #[error("Network error: {reason}")]
    NetworkError { reason: String },

    #[error("Backend error with status {status}")]
    BackendError { status: u16 },

    #[error("Unknown error: {reason}")]
    UnknownError { reason: String },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl PsnError {
    pub fn unknown_response(reason: impl Into<String>) -> Self {
        Self::UnknownBackendResponse {
            reason: reason.into(),
        }
    }

    pub fn unknown(reason: impl Into<String>) -> Self {
        Self::UnknownError {
            reason: reason.into(),
        }
    }

    /// Network or backend trouble unrelated to credentials.
    ///
    /// A refresh failing with one of these leaves the session intact.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable
                | Self::BackendTimeout
                | Self::NetworkError { .. }
                | Self::BackendError { .. }
        )
    }
}

impl From<TransportError> for PsnError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::AuthRejected => Self::AuthenticationRequired,
            TransportError::AccessDenied => Self::AccessDenied,
            TransportError::Unavailable => Self::BackendUnavailable,
            TransportError::Timeout => Self::BackendTimeout,
            TransportError::Network { reason } => Self::NetworkError { reason },
            TransportError::Backend { status } => Self::BackendError { status },
        }
    }
}

impl From<ParseError> for PsnError {
    fn from(err: ParseError) -> Self {
        Self::UnknownBackendResponse {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for psnsync operations.
pub type PsnResult<T> = Result<T, PsnError>;

// =============================================================================
// TESTS
// =============================================================================
