//! Platform Error Types

use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::api::common::ApiError;

static EXPOSE_INTERNAL_DETAILS: AtomicBool = AtomicBool::new(false);

/// Include internal error causes in 500 responses (dev mode only)
pub fn expose_internal_details(enabled: bool) {
    EXPOSE_INTERNAL_DETAILS.store(enabled, Ordering::Relaxed);
}

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Duplicate entity: {entity_type} with {field}={value}")]
    Duplicate { entity_type: String, field: String, value: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Validation failed: {}", errors.join(", "))]
    InvalidFields { errors: Vec<String> },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Authorization error: {message}")]
    Unauthorized { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {message}")]
    InvalidToken { message: String },

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bson::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] bson::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Mail error: {message}")]
    Mail { message: String },

    #[error("Realtime error: {message}")]
    Realtime { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PlatformError {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(entity_type: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type: entity_type.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Validation { .. } | Self::InvalidFields { .. } | Self::InvalidState { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Duplicate { .. } | Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Unauthorized { .. }
            | Self::InvalidCredentials
            | Self::TokenExpired
            | Self::InvalidToken { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Database(_)
            | Self::Serialization(_)
            | Self::Deserialization(_)
            | Self::Json(_)
            | Self::Mail { .. }
            | Self::Realtime { .. }
            | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Duplicate { .. } => "DUPLICATE",
            Self::Validation { .. } | Self::InvalidFields { .. } => "VALIDATION_ERROR",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Conflict { .. } => "CONFLICT",
            Self::Unauthorized { .. } | Self::InvalidCredentials => "UNAUTHORIZED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidToken { .. } => "INVALID_TOKEN",
            Self::Forbidden { .. } => "FORBIDDEN",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Message safe to return to clients
    fn public_message(&self) -> String {
        match self {
            Self::NotFound { entity_type, .. } => format!("{} not found", entity_type),
            Self::Duplicate { entity_type, field, .. } => {
                format!("{} with this {} already exists", entity_type, field)
            }
            Self::Validation { message }
            | Self::InvalidState { message }
            | Self::Conflict { message }
            | Self::Unauthorized { message }
            | Self::Forbidden { message } => message.clone(),
            Self::InvalidFields { .. } => "Validation failed".to_string(),
            Self::InvalidCredentials => "Invalid credentials".to_string(),
            Self::TokenExpired => "Token has expired".to_string(),
            Self::InvalidToken { .. } => "Token is not valid".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let details = match &self {
            Self::InvalidFields { errors } => Some(serde_json::json!({ "errors": errors })),
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!(error = %self, "Request failed with internal error");
                EXPOSE_INTERNAL_DETAILS
                    .load(Ordering::Relaxed)
                    .then(|| serde_json::json!({ "cause": self.to_string() }))
            }
            _ => None,
        };

        let body = ApiError {
            error: self.error_code().to_string(),
            message: self.public_message(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;
