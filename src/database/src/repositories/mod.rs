//! Repository layer for registered users
//!
//! [`UserStore`] is the seam between request handlers and the document store.
//! The MongoDB implementation lives in [`users`]; an in-memory one for tests and
//! offline development lives in [`memory`] behind the `testing` feature.

pub mod users;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use users::MongoUserRepository;

use super::DatabaseError;

/// Ready-to-use handle on the users collection, shared by concurrent requests.
pub type CollectionHandle = Arc<dyn UserStore>;

/// Document operations the request handlers need
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find the user registered with `email`, if any
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError>;

    /// Find a user by its store-assigned identifier
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, DatabaseError>;

    /// Insert exactly the supplied fields and return the assigned identifier
    async fn insert(&self, user: &NewUser) -> Result<String, DatabaseError>;

    /// Every document in the collection, in store order
    async fn list(&self) -> Result<Vec<UserRecord>, DatabaseError>;

    async fn count(&self) -> Result<u64, DatabaseError>;

    /// Release driver resources. Called once on graceful shutdown.
    async fn close(&self) {}
}

/// Fields accepted on registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

impl NewUser {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// A stored user projected to plain strings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Stored document shape: `{ _id, nombre, email }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(rename = "nombre")]
    pub name: String,
    pub email: String,
}

impl From<&NewUser> for UserDocument {
    fn from(user: &NewUser) -> Self {
        Self {
            id: None,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

impl TryFrom<UserDocument> for UserRecord {
    type Error = DatabaseError;

    fn try_from(document: UserDocument) -> Result<Self, Self::Error> {
        let id = document.id.ok_or_else(|| {
            DatabaseError::Query(format!("Stored user {} has no _id", document.email))
        })?;

        Ok(Self {
            id: id.to_hex(),
            name: document.name,
            email: document.email,
        })
    }
}
