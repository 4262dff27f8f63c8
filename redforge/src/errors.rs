//! Error types for redforge

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Main error type for redforge
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("{tool} exited with code {code}")]
    ExternalToolError { tool: String, code: i32 },

    #[error("{tool} timed out after {secs}s")]
    ToolTimeout { tool: String, secs: u64 },

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Reconciliation error: {0}")]
    ReconciliationError(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ForgeError {
    /// HTTP status for errors surfaced synchronously to a caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            ForgeError::ValidationError(_)
            | ForgeError::ConfigError(_)
            | ForgeError::InvalidTransition(_)
            | ForgeError::TemplateError(_) => StatusCode::BAD_REQUEST,
            ForgeError::NotFound(_) => StatusCode::NOT_FOUND,
            ForgeError::Conflict(_) => StatusCode::CONFLICT,
            ForgeError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ForgeError::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ForgeError {
    fn from(err: anyhow::Error) -> Self {
        ForgeError::Internal(err.to_string())
    }
}

impl IntoResponse for ForgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
            "An unknown error occurred, please check the activity log for more details."
                .to_string()
        } else {
            self.to_string()
        };

        (status, Json(forge_api::ErrorResponse { error: message })).into_response()
    }
}
