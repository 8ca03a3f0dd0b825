//! Error types for the load generator.
//!
//! Defines [`LoadTestError`] for failures that abort a run before any virtual
//! user starts, and [`InvokeError`] for per-call transport failures that are
//! only ever counted, never propagated past the iteration that produced them.

/// Errors that occur during configuration parsing, validation, file I/O, or
/// run setup. Every variant is fatal at run start.
#[derive(Debug, thiserror::Error)]
pub enum LoadTestError {
    /// TOML parse failure -- the config file contains invalid TOML syntax
    /// or does not match the expected schema.
    #[error("Failed to parse config TOML: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    /// Semantic validation failure -- the config parsed successfully but
    /// contains invalid values (e.g., zero virtual users, empty shard pool).
    #[error("Config validation error: {message}")]
    ConfigValidation { message: String },

    /// File I/O failure -- the config file could not be read from disk.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigIo {
        source: std::io::Error,
        path: String,
    },

    /// The operating system entropy source could not seed a generator.
    #[error("Entropy source unavailable: {message}")]
    Entropy { message: String },
}

impl LoadTestError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }
}

/// Transport and protocol failures for a single remote call.
///
/// A server that answers with a non-OK gRPC status is *not* an
/// `InvokeError`: that is a well-formed response and is judged by the
/// verifier instead.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum InvokeError {
    /// The endpoint was unreachable or refused the connection.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// No response arrived within the configured per-call timeout.
    #[error("Request timed out")]
    Timeout,

    /// The response could not be decoded or the HTTP/2 exchange was malformed.
    #[error("Protocol error: {message}")]
    Protocol { message: String },
}

impl InvokeError {
    /// Returns the error category as a static string for metrics classification.
    ///
    /// Categories: `"connection"`, `"timeout"`, `"protocol"`.
    pub fn error_category(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Timeout => "timeout",
            Self::Protocol { .. } => "protocol",
        }
    }

    /// Classify a [`tonic::Status`] raised on the client side of a call.
    ///
    /// Only statuses that tonic synthesized locally (they carry a source
    /// error or describe a decode failure) end up here; see
    /// [`crate::loadtest::client::classify_status`].
    pub fn from_local_status(status: &tonic::Status) -> Self {
        match status.code() {
            tonic::Code::Unavailable => Self::Connection {
                message: status.message().to_owned(),
            },
            tonic::Code::DeadlineExceeded | tonic::Code::Cancelled => Self::Timeout,
            _ => Self::Protocol {
                message: format!("{}: {}", status.code(), status.message()),
            },
        }
    }
}
