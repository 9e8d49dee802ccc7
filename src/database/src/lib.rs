//! Database Layer for the User Registry service
//!
//! This crate owns the single process-wide link to the MongoDB document store.
//! The [`ConnectionManager`] connects lazily on first demand, validates the link
//! with a `ping`, memoizes the resulting collection handle and clears it again
//! whenever a failure is detected so the next request reconnects from scratch.
//!
//! Request handlers never talk to the driver directly; they acquire a
//! [`CollectionHandle`] (an `Arc<dyn UserStore>`) and run one operation on it.

pub mod connections;
pub mod health;
pub mod manager;
pub mod repositories;

// Re-export specific items to avoid ambiguity
pub use connections::{MongoConfig, MongoConnection, MongoConnector, StoreConnector};
pub use health::StoreHealth;
pub use manager::{ConnectionManager, ConnectionState};
pub use repositories::{CollectionHandle, MongoUserRepository, NewUser, UserDocument, UserRecord, UserStore};

#[cfg(any(test, feature = "testing"))]
pub use repositories::memory::{InMemoryConnector, InMemoryUserStore};

/// Common database error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum DatabaseError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Query error: {0}")]
    Query(String),
}

impl DatabaseError {
    /// True when the error means the memoized link can no longer be trusted.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, DatabaseError::Connection(_) | DatabaseError::Timeout(_))
    }
}
