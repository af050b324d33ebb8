//! Error types for estpii

/// Result type alias using estpii's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for estpii operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or incomplete request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No recognizer set (and no generic fallback) for the language
    #[error("unsupported language: '{0}' has no configured recognizers")]
    UnsupportedLanguage(String),

    /// A single recognizer failed during a request
    #[error("recognizer '{recognizer}' failed: {message}")]
    Recognizer { recognizer: String, message: String },

    /// Every recognizer for a request failed
    #[error("all {count} recognizers failed: {summary}")]
    AllRecognizersFailed {
        count: usize,
        summary: String,
        /// True when every failure was a model outage
        model_outage: bool,
    },

    /// Statistical model could not be loaded or reached
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Anonymization operator could not produce a replacement
    #[error("operator error: {0}")]
    Operator(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No recognizer finished before the request deadline
    #[error("operation timed out")]
    Timeout,

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a new recognizer error
    pub fn recognizer(recognizer: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Recognizer {
            recognizer: recognizer.into(),
            message: msg.into(),
        }
    }

    /// Create a new model unavailable error
    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    /// Create a new operator error
    pub fn operator(msg: impl Into<String>) -> Self {
        Self::Operator(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error signals an unreachable or unloaded model
    pub fn is_model_outage(&self) -> bool {
        matches!(self, Self::ModelUnavailable(_))
    }
}
