//! In-memory user store and connector
//!
//! Behaves like a MongoDB collection without a unique index. Reachability can
//! be toggled to simulate an outage: while unreachable both connection attempts
//! and operations on already-acquired handles fail with connection errors.

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{CollectionHandle, NewUser, UserRecord, UserStore};
use crate::connections::{MongoConfig, StoreConnector};
use crate::DatabaseError;

#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<Vec<UserRecord>>,
    unreachable: AtomicBool,
    closed: AtomicUsize,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        !self.unreachable.load(Ordering::SeqCst)
    }

    /// Number of times `close` was called
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_reachable(&self, operation: &str) -> Result<(), DatabaseError> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(DatabaseError::Connection(format!(
                "{} failed: in-memory store is unreachable",
                operation
            )))
        }
    }

    fn snapshot(&self) -> Result<Vec<UserRecord>, DatabaseError> {
        self.users
            .lock()
            .map(|users| users.clone())
            .map_err(|_| DatabaseError::Query("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError> {
        self.check_reachable("find user by email")?;
        Ok(self.snapshot()?.into_iter().find(|user| user.email == email))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, DatabaseError> {
        self.check_reachable("find user by id")?;
        Ok(self.snapshot()?.into_iter().find(|user| user.id == id))
    }

    async fn insert(&self, user: &NewUser) -> Result<String, DatabaseError> {
        self.check_reachable("insert user")?;
        let id = ObjectId::new().to_hex();
        let mut users = self
            .users
            .lock()
            .map_err(|_| DatabaseError::Query("in-memory store lock poisoned".to_string()))?;
        users.push(UserRecord {
            id: id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
        });
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<UserRecord>, DatabaseError> {
        self.check_reachable("find users")?;
        self.snapshot()
    }

    async fn count(&self) -> Result<u64, DatabaseError> {
        self.check_reachable("count users")?;
        Ok(self.snapshot()?.len() as u64)
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector handing out one shared [`InMemoryUserStore`]
pub struct InMemoryConnector {
    store: Arc<InMemoryUserStore>,
    attempts: AtomicUsize,
}

impl InMemoryConnector {
    pub fn new(store: Arc<InMemoryUserStore>) -> Self {
        Self {
            store,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> Arc<InMemoryUserStore> {
        self.store.clone()
    }

    /// Number of connection attempts made so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreConnector for InMemoryConnector {
    async fn connect(
        &self,
        _config: &MongoConfig,
        _connection_string: &str,
    ) -> Result<CollectionHandle, DatabaseError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.store.is_reachable() {
            return Err(DatabaseError::Connection(
                "ping failed: in-memory store is unreachable".to_string(),
            ));
        }
        let handle: CollectionHandle = self.store.clone();
        Ok(handle)
    }
}
