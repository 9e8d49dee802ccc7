//! Document store health reporting
//!
//! Health is derived from the [`ConnectionManager`] state snapshot only. No
//! probe is issued here, so health checks never open connections.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::manager::{ConnectionManager, ConnectionState};

/// Document store health status
#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub healthy: bool,
    pub database: String,
    pub collection: String,
    pub connection: ConnectionState,
    pub error_message: Option<String>,
    pub last_check: DateTime<Utc>,
}

impl StoreHealth {
    /// Build a report from the manager's current state.
    ///
    /// `Unconnected` counts as healthy: the first request will connect lazily.
    pub async fn from_manager(manager: &ConnectionManager) -> Self {
        let connection = manager.state().await;
        let error_message = match &connection {
            ConnectionState::Failed { error } => Some(error.clone()),
            _ => None,
        };

        Self {
            healthy: error_message.is_none(),
            database: manager.config().database.clone(),
            collection: manager.config().collection.clone(),
            connection,
            error_message,
            last_check: Utc::now(),
        }
    }
}
