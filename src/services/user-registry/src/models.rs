//! Request and response payloads
//!
//! Field names follow the public contract (`nombre`, `mensaje`, `fecha_hora`).

use serde::{Deserialize, Serialize};
use user_registry_database::{ConnectionState, NewUser, StoreHealth, UserRecord};
use validator::Validate;

pub const WELCOME_MESSAGE: &str = "Bienvenido a la API de usuarios";

/// Registration payload
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, message = "nombre must not be empty"))]
    pub nombre: String,

    #[validate(email(message = "value is not a valid email address"))]
    pub email: String,
}

impl From<CreateUserRequest> for NewUser {
    fn from(request: CreateUserRequest) -> Self {
        NewUser::new(request.nombre, request.email)
    }
}

/// A registered user as returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub nombre: String,
    pub email: String,
}

impl From<UserRecord> for UserResponse {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            nombre: record.name,
            email: record.email,
        }
    }
}

/// Root status payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub mensaje: String,
    /// ISO-8601 local time with offset
    pub fecha_hora: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub database: StoreHealth,
}

impl HealthResponse {
    pub fn new(database: StoreHealth) -> Self {
        let status = match (&database.connection, database.healthy) {
            (ConnectionState::Connected, _) => "healthy",
            (_, true) => "idle",
            (_, false) => "degraded",
        };

        Self {
            status: status.to_string(),
            service: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            database,
        }
    }
}
