//! User repository implementation for MongoDB
//!
//! Every operation runs under the configured operation timeout so a request
//! never waits indefinitely on an unreachable store.

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    Client, Collection,
};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{NewUser, UserDocument, UserRecord, UserStore};
use crate::connections::mongodb::bounded;
use crate::DatabaseError;

/// User repository for MongoDB operations
#[derive(Clone)]
pub struct MongoUserRepository {
    client: Client,
    collection: Collection<UserDocument>,
    operation_timeout: Duration,
}

impl MongoUserRepository {
    /// Create new user repository
    pub fn new(
        client: Client,
        collection: Collection<UserDocument>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            client,
            collection,
            operation_timeout,
        }
    }
}

#[async_trait]
impl UserStore for MongoUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let document = bounded(
            "find user by email",
            self.operation_timeout,
            self.collection.find_one(doc! { "email": email }, None),
        )
        .await?;

        document.map(UserRecord::try_from).transpose()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let object_id = ObjectId::parse_str(id)
            .map_err(|e| DatabaseError::Query(format!("Invalid user id {}: {}", id, e)))?;

        let document = bounded(
            "find user by id",
            self.operation_timeout,
            self.collection.find_one(doc! { "_id": object_id }, None),
        )
        .await?;

        document.map(UserRecord::try_from).transpose()
    }

    async fn insert(&self, user: &NewUser) -> Result<String, DatabaseError> {
        let document = UserDocument::from(user);
        let result = bounded(
            "insert user",
            self.operation_timeout,
            self.collection.insert_one(&document, None),
        )
        .await?;

        let id = result.inserted_id.as_object_id().ok_or_else(|| {
            DatabaseError::Query(format!(
                "Store assigned a non-ObjectId identifier: {}",
                result.inserted_id
            ))
        })?;

        debug!(user_id = %id, "User document inserted");
        Ok(id.to_hex())
    }

    async fn list(&self) -> Result<Vec<UserRecord>, DatabaseError> {
        let cursor = bounded(
            "find users",
            self.operation_timeout,
            self.collection.find(None, None),
        )
        .await?;

        let documents: Vec<UserDocument> =
            bounded("collect users", self.operation_timeout, cursor.try_collect()).await?;

        documents.into_iter().map(UserRecord::try_from).collect()
    }

    async fn count(&self) -> Result<u64, DatabaseError> {
        bounded(
            "count users",
            self.operation_timeout,
            self.collection.count_documents(None, None),
        )
        .await
    }

    async fn close(&self) {
        info!(collection = %self.collection.name(), "Closing MongoDB connection");
        if tokio::time::timeout(self.operation_timeout, self.client.clone().shutdown())
            .await
            .is_err()
        {
            warn!("MongoDB client did not shut down within {:?}", self.operation_timeout);
        }
    }
}
