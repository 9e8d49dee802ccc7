//! Request handlers for the user registry API
//!
//! Each store-backed handler acquires the memoized collection handle, performs
//! its document operations and maps failures to [`AppError`]. A connection-class
//! failure also clears the memoized handle so the next request reconnects.

use axum::{extract::State, Json};
use chrono::SecondsFormat;
use tracing::{debug, info, warn};
use user_registry_database::{DatabaseError, NewUser, StoreHealth, UserRecord, UserStore};

use crate::error::{AppError, Result};
use crate::extract::ValidatedJson;
use crate::models::{
    CreateUserRequest, HealthResponse, StatusResponse, UserResponse, WELCOME_MESSAGE,
};
use crate::AppState;

/// `GET /`: welcome message and current time. Never touches the store.
pub async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        mensaje: WELCOME_MESSAGE.to_string(),
        fecha_hora: chrono::Local::now().to_rfc3339_opts(SecondsFormat::Micros, false),
    })
}

/// `GET /health`: service and connection state snapshot.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = StoreHealth::from_manager(&state.connections).await;
    Json(HealthResponse::new(database))
}

/// `POST /users`
pub async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateUserRequest>,
) -> Result<Json<UserResponse>> {
    let new_user = NewUser::from(request);
    info!(email = %new_user.email, "Registering user");

    let users = state.connections.acquire_collection().await?;
    let registration = match register(users.as_ref(), &new_user).await {
        Ok(registration) => registration,
        Err(e) => return Err(state.store_failure(&users, e).await),
    };

    match registration {
        Registration::Created(record) => {
            info!(user_id = %record.id, "User registered");
            Ok(Json(record.into()))
        }
        Registration::DuplicateEmail => {
            warn!(email = %new_user.email, "Rejected registration with duplicate email");
            Err(AppError::duplicate_email())
        }
    }
}

/// `GET /users`
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserResponse>>> {
    let users = state.connections.acquire_collection().await?;
    let records = match users.list().await {
        Ok(records) => records,
        Err(e) => return Err(state.store_failure(&users, e).await),
    };

    debug!(count = records.len(), "Listed users");
    Ok(Json(records.into_iter().map(UserResponse::from).collect()))
}

enum Registration {
    Created(UserRecord),
    DuplicateEmail,
}

/// Existence check, insert, then re-fetch by the assigned id.
///
/// The check and the insert are separate operations: two concurrent requests
/// with the same email can both pass the check unless the unique index is on.
async fn register(
    users: &dyn UserStore,
    user: &NewUser,
) -> std::result::Result<Registration, DatabaseError> {
    if users.find_by_email(&user.email).await?.is_some() {
        return Ok(Registration::DuplicateEmail);
    }

    let id = match users.insert(user).await {
        Ok(id) => id,
        Err(DatabaseError::DuplicateKey(_)) => return Ok(Registration::DuplicateEmail),
        Err(e) => return Err(e),
    };

    users
        .find_by_id(&id)
        .await?
        .map(Registration::Created)
        .ok_or_else(|| DatabaseError::Query(format!("User {} was not found after insert", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use user_registry_database::InMemoryUserStore;

    #[test]
    fn test_root_payload() {
        let Json(status) = tokio_test::block_on(root());
        assert_eq!(status.mensaje, WELCOME_MESSAGE);
        assert!(chrono::DateTime::parse_from_rfc3339(&status.fecha_hora).is_ok());
    }

    #[test]
    fn test_register_detects_existing_email() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryUserStore::new());
            let user = NewUser::new("Ana", "ana@example.com");

            let first = register(store.as_ref(), &user).await.unwrap();
            assert!(matches!(first, Registration::Created(ref r) if r.email == "ana@example.com"));

            let second = register(store.as_ref(), &user).await.unwrap();
            assert!(matches!(second, Registration::DuplicateEmail));
            assert_eq!(store.count().await.unwrap(), 1);
        });
    }

    #[test]
    fn test_register_propagates_connection_errors() {
        tokio_test::block_on(async {
            let store = InMemoryUserStore::new();
            store.set_reachable(false);

            let result = register(&store, &NewUser::new("Ana", "ana@example.com")).await;
            assert!(matches!(result, Err(DatabaseError::Connection(_))));
        });
    }
}
