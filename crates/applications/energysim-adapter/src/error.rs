//! Error types for the adapter

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use energysim_engine::EngineError;
use thiserror::Error;

/// Adapter result type
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Errors that can occur in the adapter
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Unknown run id
    #[error("Run {0} does not exist")]
    RunNotFound(String),

    /// Malformed request body
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Simulation engine error
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AdapterError {
    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RunNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) | Self::Json(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}
