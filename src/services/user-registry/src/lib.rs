//! User Registry Service Library
//!
//! A small registration API over a MongoDB `users` collection:
//!
//! - `GET /` returns a welcome message and the current time
//! - `POST /users` registers a user, rejecting duplicate emails
//! - `GET /users` lists every registered user
//! - `GET /health` reports the document store connection state
//!
//! The store connection is owned by a [`ConnectionManager`] held in
//! [`AppState`]; it connects on first use and reconnects after failures.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod routes;

use std::sync::Arc;

use user_registry_database::{CollectionHandle, ConnectionManager, DatabaseError};

pub use config::{Config, LogFormat};
pub use error::{AppError, Result};
pub use routes::create_router;

/// State shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub connections: Arc<ConnectionManager>,
}

impl AppState {
    pub fn new(config: Config, connections: ConnectionManager) -> Self {
        Self {
            config: Arc::new(config),
            connections: Arc::new(connections),
        }
    }

    /// State wired to the MongoDB driver using `config.mongodb`
    pub fn from_config(config: Config) -> Self {
        let connections = ConnectionManager::mongodb(config.mongodb.clone());
        Self::new(config, connections)
    }

    /// Map a failed store operation, dropping the handle if the link is broken.
    pub async fn store_failure(&self, handle: &CollectionHandle, error: DatabaseError) -> AppError {
        if error.is_connection_failure() {
            self.connections.invalidate(handle, &error).await;
        }
        AppError::from(error)
    }
}
