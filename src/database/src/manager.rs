//! Lazy, memoized document store connection
//!
//! The manager walks a three-state machine:
//!
//! ```text
//! Unconnected --acquire ok--> Connected --failure detected--> Failed
//!      ^                                                         |
//!      +------------ shutdown              acquire (retry) <-----+
//! ```
//!
//! Connection attempts run without holding the slot lock, so concurrent cold
//! starts may race. Each attempt validates independently; the last success
//! wins the slot and a failed attempt never replaces a `Connected` slot. A
//! handle pushed out of the slot is closed. An attempt that finishes after
//! `shutdown` closes its own handle instead of installing it.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::connections::{MongoConfig, MongoConnector, StoreConnector};
use crate::repositories::CollectionHandle;
use crate::DatabaseError;

/// Externally visible connection state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ConnectionState {
    Unconnected,
    Connected,
    Failed { error: String },
}

enum Slot {
    Unconnected,
    Connected(CollectionHandle),
    Failed(String),
}

/// Owns the single memoized handle on the users collection.
pub struct ConnectionManager {
    config: MongoConfig,
    connector: Arc<dyn StoreConnector>,
    slot: RwLock<Slot>,
    /// Bumped by every `shutdown`
    epoch: AtomicU64,
}

impl ConnectionManager {
    pub fn new(config: MongoConfig, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            config,
            connector,
            slot: RwLock::new(Slot::Unconnected),
            epoch: AtomicU64::new(0),
        }
    }

    /// Manager backed by the MongoDB driver
    pub fn mongodb(config: MongoConfig) -> Self {
        Self::new(config, Arc::new(MongoConnector::new()))
    }

    pub fn config(&self) -> &MongoConfig {
        &self.config
    }

    /// Return the memoized handle, connecting first if there is none.
    pub async fn acquire_collection(&self) -> Result<CollectionHandle, DatabaseError> {
        if let Slot::Connected(handle) = &*self.slot.read().await {
            return Ok(handle.clone());
        }

        let connection_string = match self.config.connection_string() {
            Ok(connection_string) => connection_string,
            Err(e) => {
                self.record_failure(&e).await;
                return Err(e);
            }
        };

        debug!(
            database = %self.config.database,
            collection = %self.config.collection,
            "No live document store handle, connecting"
        );

        let epoch = self.epoch.load(Ordering::SeqCst);
        let start_time = Instant::now();
        let deadline = self.config.connect_deadline();
        let attempt = tokio::time::timeout(
            deadline,
            self.connector.connect(&self.config, connection_string),
        )
        .await;

        let result = match attempt {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(DatabaseError::Connection(message))) => Err(DatabaseError::Connection(message)),
            Ok(Err(other)) => Err(DatabaseError::Connection(other.to_string())),
            Err(_) => Err(DatabaseError::Connection(format!(
                "connection attempt did not finish within {:?}",
                deadline
            ))),
        };

        match result {
            Ok(handle) => {
                let replaced = {
                    let mut slot = self.slot.write().await;
                    if self.epoch.load(Ordering::SeqCst) != epoch {
                        None
                    } else {
                        Some(std::mem::replace(&mut *slot, Slot::Connected(handle.clone())))
                    }
                };

                let Some(replaced) = replaced else {
                    warn!("Connection manager shut down during connection attempt, closing new handle");
                    handle.close().await;
                    return Err(DatabaseError::Connection(
                        "connection manager was shut down during the connection attempt".to_string(),
                    ));
                };

                if let Slot::Connected(previous) = replaced {
                    if !Arc::ptr_eq(&previous, &handle) {
                        debug!("Replacing handle from a concurrent connection attempt");
                        previous.close().await;
                    }
                }

                info!(
                    database = %self.config.database,
                    collection = %self.config.collection,
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "Connected to document store"
                );
                Ok(handle)
            }
            Err(e) => {
                self.record_failure(&e).await;
                Err(e)
            }
        }
    }

    /// Clear the slot if it still holds `handle`.
    ///
    /// Returns `true` when this call cleared it. A stale handle (the slot was
    /// already cleared or replaced by a newer connection) leaves it untouched.
    pub async fn invalidate(&self, handle: &CollectionHandle, cause: &DatabaseError) -> bool {
        let mut slot = self.slot.write().await;
        match &*slot {
            Slot::Connected(current) if Arc::ptr_eq(current, handle) => {
                warn!(error = %cause, "Discarding document store handle after failure");
                *slot = Slot::Failed(cause.to_string());
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the current state; never touches the network.
    pub async fn state(&self) -> ConnectionState {
        match &*self.slot.read().await {
            Slot::Unconnected => ConnectionState::Unconnected,
            Slot::Connected(_) => ConnectionState::Connected,
            Slot::Failed(error) => ConnectionState::Failed {
                error: error.clone(),
            },
        }
    }

    pub async fn is_connected(&self) -> bool {
        matches!(&*self.slot.read().await, Slot::Connected(_))
    }

    /// Close the memoized handle, if any, and return to `Unconnected`.
    pub async fn shutdown(&self) {
        let previous = {
            let mut slot = self.slot.write().await;
            self.epoch.fetch_add(1, Ordering::SeqCst);
            std::mem::replace(&mut *slot, Slot::Unconnected)
        };
        if let Slot::Connected(handle) = previous {
            info!("Shutting down document store connection");
            handle.close().await;
        }
    }

    async fn record_failure(&self, error: &DatabaseError) {
        let mut slot = self.slot.write().await;
        if matches!(&*slot, Slot::Connected(_)) {
            debug!(error = %error, "Connection attempt failed but a concurrent attempt succeeded");
            return;
        }
        warn!(error = %error, "Document store connection failed");
        *slot = Slot::Failed(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::{InMemoryConnector, InMemoryUserStore};
    use crate::repositories::NewUser;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn test_config() -> MongoConfig {
        MongoConfig {
            url: Some("mongodb://localhost:27017".to_string()),
            ..MongoConfig::default()
        }
    }

    fn in_memory_manager() -> (ConnectionManager, Arc<InMemoryConnector>) {
        let connector = Arc::new(InMemoryConnector::new(Arc::new(InMemoryUserStore::new())));
        let manager = ConnectionManager::new(test_config(), connector.clone());
        (manager, connector)
    }

    #[tokio::test]
    async fn test_starts_unconnected() {
        let (manager, connector) = in_memory_manager();
        assert_eq!(manager.state().await, ConnectionState::Unconnected);
        assert_eq!(connector.attempts(), 0);
    }

    #[tokio::test]
    async fn test_acquire_memoizes_handle() {
        let (manager, connector) = in_memory_manager();

        let first = manager.acquire_collection().await.unwrap();
        let second = manager.acquire_collection().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.attempts(), 1);
        assert_eq!(manager.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_huge_timeouts_do_not_overflow_the_deadline() {
        let connector = Arc::new(InMemoryConnector::new(Arc::new(InMemoryUserStore::new())));
        let config = MongoConfig {
            server_selection_timeout_seconds: u64::MAX,
            connect_timeout_seconds: u64::MAX,
            ..test_config()
        };
        let manager = ConnectionManager::new(config, connector.clone());

        assert!(manager.acquire_collection().await.is_ok());
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_missing_connection_string_skips_connector() {
        let connector = Arc::new(InMemoryConnector::new(Arc::new(InMemoryUserStore::new())));
        let manager = ConnectionManager::new(MongoConfig::default(), connector.clone());

        let error = manager.acquire_collection().await.err().unwrap();

        assert!(matches!(error, DatabaseError::Configuration(_)));
        assert_eq!(connector.attempts(), 0);
        assert!(matches!(manager.state().await, ConnectionState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_failed_attempt_is_retried_on_next_call() {
        let (manager, connector) = in_memory_manager();
        let store = connector.store();

        store.set_reachable(false);
        let error = manager.acquire_collection().await.err().unwrap();
        assert!(matches!(error, DatabaseError::Connection(_)));
        assert!(matches!(manager.state().await, ConnectionState::Failed { .. }));

        store.set_reachable(true);
        let handle = manager.acquire_collection().await.unwrap();
        assert_eq!(handle.count().await.unwrap(), 0);
        assert_eq!(connector.attempts(), 2);
        assert_eq!(manager.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reconnect() {
        let (manager, connector) = in_memory_manager();
        let handle = manager.acquire_collection().await.unwrap();

        let cause = DatabaseError::Connection("socket closed".to_string());
        assert!(manager.invalidate(&handle, &cause).await);
        assert_eq!(
            manager.state().await,
            ConnectionState::Failed {
                error: "Connection error: socket closed".to_string()
            }
        );

        manager.acquire_collection().await.unwrap();
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_with_stale_handle_is_noop() {
        let (manager, _connector) = in_memory_manager();
        let current = manager.acquire_collection().await.unwrap();

        // A handle from an older connection
        let stale: CollectionHandle = Arc::new(InMemoryUserStore::new());
        let cause = DatabaseError::Timeout("find".to_string());

        assert!(!manager.invalidate(&stale, &cause).await);
        assert!(manager.is_connected().await);
        assert!(Arc::ptr_eq(
            &current,
            &manager.acquire_collection().await.unwrap()
        ));
    }

    #[tokio::test]
    async fn test_shutdown_closes_and_resets() {
        let (manager, connector) = in_memory_manager();
        manager.acquire_collection().await.unwrap();

        manager.shutdown().await;

        assert_eq!(manager.state().await, ConnectionState::Unconnected);
        assert_eq!(connector.store().close_count(), 1);

        // Shutting down twice does not close anything again
        manager.shutdown().await;
        assert_eq!(connector.store().close_count(), 1);
    }

    #[tokio::test]
    async fn test_data_survives_reconnect() {
        let (manager, connector) = in_memory_manager();
        let handle = manager.acquire_collection().await.unwrap();
        handle
            .insert(&NewUser::new("Ana", "ana@example.com"))
            .await
            .unwrap();

        let cause = DatabaseError::Connection("reset".to_string());
        manager.invalidate(&handle, &cause).await;

        let handle = manager.acquire_collection().await.unwrap();
        assert_eq!(handle.count().await.unwrap(), 1);
        assert_eq!(connector.attempts(), 2);
    }

    /// First attempt blocks until released, then fails or succeeds; later
    /// attempts succeed at once. Every attempt gets its own store.
    struct GatedConnector {
        gate: Notify,
        started: Notify,
        first_attempt_fails: bool,
        attempts: AtomicUsize,
        stores: Mutex<Vec<Arc<InMemoryUserStore>>>,
    }

    impl GatedConnector {
        fn new(first_attempt_fails: bool) -> Arc<Self> {
            Arc::new(Self {
                gate: Notify::new(),
                started: Notify::new(),
                first_attempt_fails,
                attempts: AtomicUsize::new(0),
                stores: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        /// Store handed out by the given attempt
        fn store(&self, attempt: usize) -> Arc<InMemoryUserStore> {
            self.stores.lock().unwrap()[attempt].clone()
        }
    }

    #[async_trait]
    impl StoreConnector for GatedConnector {
        async fn connect(
            &self,
            _config: &MongoConfig,
            _connection_string: &str,
        ) -> Result<CollectionHandle, DatabaseError> {
            let store = Arc::new(InMemoryUserStore::new());
            let attempt = {
                let mut stores = self.stores.lock().unwrap();
                stores.push(store.clone());
                self.attempts.fetch_add(1, Ordering::SeqCst)
            };

            if attempt == 0 {
                self.started.notify_one();
                self.gate.notified().await;
                if self.first_attempt_fails {
                    return Err(DatabaseError::Connection("ping failed".to_string()));
                }
            }
            let handle: CollectionHandle = store;
            Ok(handle)
        }
    }

    #[tokio::test]
    async fn test_late_failure_does_not_clobber_concurrent_success() {
        let connector = GatedConnector::new(true);
        let manager = Arc::new(ConnectionManager::new(test_config(), connector.clone()));

        let slow = tokio::spawn({
            let manager = manager.clone();
            async move { manager.acquire_collection().await }
        });
        connector.started.notified().await;

        let fast = manager.acquire_collection().await;
        assert!(fast.is_ok());

        connector.gate.notify_one();
        let slow_result = slow.await.unwrap();
        assert!(matches!(slow_result, Err(DatabaseError::Connection(_))));

        assert_eq!(manager.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_later_success_closes_the_handle_it_replaces() {
        let connector = GatedConnector::new(false);
        let manager = Arc::new(ConnectionManager::new(test_config(), connector.clone()));

        let slow = tokio::spawn({
            let manager = manager.clone();
            async move { manager.acquire_collection().await }
        });
        connector.started.notified().await;

        manager.acquire_collection().await.unwrap();

        connector.gate.notify_one();
        let slow_handle = slow.await.unwrap().unwrap();

        assert_eq!(connector.store(1).close_count(), 1);
        assert_eq!(connector.store(0).close_count(), 0);
        assert!(Arc::ptr_eq(
            &slow_handle,
            &manager.acquire_collection().await.unwrap()
        ));
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_attempt_finishing_after_shutdown_is_closed() {
        let connector = GatedConnector::new(false);
        let manager = Arc::new(ConnectionManager::new(test_config(), connector.clone()));

        let slow = tokio::spawn({
            let manager = manager.clone();
            async move { manager.acquire_collection().await }
        });
        connector.started.notified().await;

        manager.shutdown().await;
        connector.gate.notify_one();

        let slow_result = slow.await.unwrap();
        assert!(matches!(slow_result, Err(DatabaseError::Connection(_))));
        assert_eq!(connector.store(0).close_count(), 1);
        assert_eq!(manager.state().await, ConnectionState::Unconnected);

        manager.acquire_collection().await.unwrap();
        assert_eq!(manager.state().await, ConnectionState::Connected);
        assert_eq!(connector.store(1).close_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_attempt_leaves_slot_untouched() {
        let connector = GatedConnector::new(false);
        let manager = ConnectionManager::new(test_config(), connector.clone());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), manager.acquire_collection()).await;
        assert!(abandoned.is_err());
        assert_eq!(connector.attempts(), 1);
        assert_eq!(manager.state().await, ConnectionState::Unconnected);

        let handle = manager.acquire_collection().await.unwrap();
        assert_eq!(manager.state().await, ConnectionState::Connected);
        assert!(Arc::ptr_eq(
            &handle,
            &manager.acquire_collection().await.unwrap()
        ));
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_state_serializes_with_status_tag() {
        let failed = ConnectionState::Failed {
            error: "Connection error: refused".to_string(),
        };
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "Connection error: refused");

        let connected = serde_json::to_value(ConnectionState::Connected).unwrap();
        assert_eq!(connected["status"], "connected");
    }
}
