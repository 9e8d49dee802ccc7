use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use user_registry_database::DatabaseError;

pub type Result<T> = std::result::Result<T, AppError>;

pub const DUPLICATE_EMAIL_MESSAGE: &str = "El email ya está registrado";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Database connection error: {0}")]
    DatabaseConnectionError(String),

    #[error("{0}")]
    DuplicateEmailError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    UnexpectedStoreError(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
    pub code: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl AppError {
    pub fn duplicate_email() -> Self {
        AppError::DuplicateEmailError(DUPLICATE_EMAIL_MESSAGE.to_string())
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::ConfigurationError(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseConnectionError(_) => "DATABASE_CONNECTION_ERROR",
            AppError::DuplicateEmailError(_) => "DUPLICATE_EMAIL",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::UnexpectedStoreError(_) => "DATABASE_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::DuplicateEmailError(_) => StatusCode::BAD_REQUEST,
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DatabaseConnectionError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::UnexpectedStoreError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        let error_response = ErrorResponse {
            error: self.error_code().to_string(),
            detail: self.to_string(),
            code: format!("{}", status_code.as_u16()),
            timestamp: chrono::Utc::now(),
        };

        if self.is_server_error() {
            tracing::error!(code = self.error_code(), "Server error: {}", self);
        } else {
            tracing::info!(code = self.error_code(), "Client error: {}", self);
        }

        (status_code, Json(error_response)).into_response()
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Configuration(msg) => AppError::ConfigurationError(msg),
            DatabaseError::Connection(msg) => AppError::DatabaseConnectionError(msg),
            DatabaseError::Timeout(msg) => AppError::DatabaseConnectionError(msg),
            DatabaseError::DuplicateKey(_) => AppError::duplicate_email(),
            DatabaseError::Query(msg) => AppError::UnexpectedStoreError(msg),
        }
    }
}
