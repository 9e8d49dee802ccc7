//! Database connection management for the User Registry service
//!
//! This module holds the document store configuration and the [`StoreConnector`]
//! seam the [`crate::ConnectionManager`] uses to open and validate new links.

pub mod mongodb;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::DatabaseError;
use crate::repositories::CollectionHandle;

// Re-export connection types
pub use self::mongodb::{MongoConnection, MongoConnector};

/// Opens a validated link to the document store.
///
/// Implementations must either return a handle that passed its liveness probe
/// or an error; they never hand back a half-initialized handle.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(
        &self,
        config: &MongoConfig,
        connection_string: &str,
    ) -> Result<CollectionHandle, DatabaseError>;
}

/// MongoDB configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MongoConfig {
    /// Connection string; `None` or blank is reported per request, never at startup
    pub url: Option<String>,
    pub database: String,
    pub collection: String,
    pub server_selection_timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub operation_timeout_seconds: u64,
    pub enforce_unique_email: bool,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            url: None,
            database: "user_database".to_string(),
            collection: "users".to_string(),
            server_selection_timeout_seconds: 5,
            connect_timeout_seconds: 5,
            operation_timeout_seconds: 5,
            enforce_unique_email: false,
        }
    }
}

impl MongoConfig {
    /// Returns the connection string or a configuration error when it is absent.
    pub fn connection_string(&self) -> Result<&str, DatabaseError> {
        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(DatabaseError::Configuration(
                "MongoDB connection string is not configured (set MONGODB_URI)".to_string(),
            )),
        }
    }

    pub fn server_selection_timeout(&self) -> Duration {
        Duration::from_secs(self.server_selection_timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_seconds)
    }

    /// Upper bound for a whole connection attempt: option parsing (SRV lookup),
    /// server selection, socket connect and the ping.
    pub fn connect_deadline(&self) -> Duration {
        self.server_selection_timeout()
            .saturating_add(self.connect_timeout())
            .saturating_add(self.operation_timeout())
    }
}
