//! Error handling for the upload transport
//!
//! Two families live here. [`RequestError`] is what a running upload reports
//! through its `on_error` callback: either the connection failed, or the server
//! answered with a non-2xx status. [`UploadError`] covers everything that can go
//! wrong before a request is ever issued (bad options, bad config, no runtime).

use crate::upload::types::Method;
use thiserror::Error;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, UploadError>;

/// Terminal error of a single upload invocation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    /// The request never produced an HTTP response (DNS, refused, reset, ...)
    #[error("cannot {method} {url}: {message}")]
    Transport {
        method: Method,
        url: String,
        message: String,
    },

    /// The server answered outside the 2xx range
    #[error("cannot {method} {url} {status}")]
    Status {
        status: u16,
        method: Method,
        url: String,
    },
}

impl RequestError {
    /// Create a new network-level error
    pub fn transport(method: Method, url: impl Into<String>, message: impl Into<String>) -> Self {
        RequestError::Transport {
            method,
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a new HTTP status error
    pub fn status_error(status: u16, method: Method, url: impl Into<String>) -> Self {
        RequestError::Status {
            status,
            method,
            url: url.into(),
        }
    }

    /// Response status, absent for network failures
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Transport { .. } => None,
            RequestError::Status { status, .. } => Some(*status),
        }
    }

    pub fn method(&self) -> Method {
        match self {
            RequestError::Transport { method, .. } | RequestError::Status { method, .. } => *method,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            RequestError::Transport { url, .. } | RequestError::Status { url, .. } => url,
        }
    }
}

/// Errors raised while setting up an upload
#[derive(Error, Debug)]
pub enum UploadError {
    /// Invalid parameter
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// No Tokio runtime to drive requests on
    #[error("No async runtime available: {message}")]
    RuntimeUnavailable { message: String },

    /// The HTTP client could not be built
    #[error("HTTP client error: {message}")]
    ClientError { message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UploadError {
    /// Create a new invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        UploadError::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        UploadError::ConfigError {
            message: message.into(),
        }
    }

    pub fn runtime_unavailable(message: impl Into<String>) -> Self {
        UploadError::RuntimeUnavailable {
            message: message.into(),
        }
    }

    pub fn client_error(message: impl Into<String>) -> Self {
        UploadError::ClientError {
            message: message.into(),
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        UploadError::client_error(err.to_string())
    }
}
