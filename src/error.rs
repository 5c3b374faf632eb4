//! Error types for the client library.

use thiserror::Error;

/// Client error type.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned a non-success status.
    #[error("API Error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, or "Unknown error" if it could not be read.
        message: String,
    },

    /// A streaming response arrived without a body.
    #[error("Response body is missing")]
    MissingBody,

    /// The execution poller gave up after consecutive transport failures.
    #[error("Polling failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Number of failed attempts in the final streak.
        attempts: u32,
        /// Message of the last failure.
        message: String,
    },

    /// A flow parameter could not be built from user input.
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_message_matches_backend_format() {
        let err = Error::Api {
            status: 404,
            message: "flow not found".to_string(),
        };
        assert_eq!(err.to_string(), "API Error (404): flow not found");
    }

    #[test]
    fn config_errors_keep_their_message() {
        let err: Error = config::ConfigError::Message("bad layer".to_string()).into();
        assert!(matches!(&err, Error::Config(msg) if msg == "bad layer"));
        assert_eq!(err.to_string(), "Configuration error: bad layer");
    }
}
