//! MongoDB connection management for the User Registry service
//!
//! This module opens a driver client with bounded timeouts, validates it with a
//! `ping` against the `admin` database and resolves the users collection.

use async_trait::async_trait;
use mongodb::{
    bson::{doc, Document},
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, IndexOptions},
    Client, Collection, Database, IndexModel,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{DatabaseError, MongoConfig, StoreConnector};
use crate::repositories::{CollectionHandle, MongoUserRepository, UserDocument};

const DUPLICATE_KEY_CODE: i32 = 11000;

/// A validated MongoDB link scoped to the configured database.
pub struct MongoConnection {
    client: Client,
    database: Database,
    config: MongoConfig,
}

impl MongoConnection {
    /// Open a client and confirm it answers a `ping`.
    ///
    /// The client is dropped before returning an error, so a failed attempt
    /// leaves nothing half-open behind.
    pub async fn new(config: MongoConfig, connection_string: &str) -> Result<Self, DatabaseError> {
        info!(
            database = %config.database,
            collection = %config.collection,
            "Initializing MongoDB connection"
        );

        let mut client_options = ClientOptions::parse(connection_string).await.map_err(|e| {
            DatabaseError::Connection(format!("Invalid MongoDB connection string: {}", e))
        })?;

        client_options.app_name = Some("user-registry".to_string());
        client_options.connect_timeout = Some(config.connect_timeout());
        client_options.server_selection_timeout = Some(config.server_selection_timeout());

        let client = Client::with_options(client_options).map_err(|e| {
            DatabaseError::Connection(format!("Failed to create MongoDB client: {}", e))
        })?;

        let start_time = Instant::now();
        let ping = tokio::time::timeout(
            config.operation_timeout(),
            client.database("admin").run_command(doc! { "ping": 1 }, None),
        )
        .await;

        match ping {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(DatabaseError::Connection(format!(
                    "MongoDB ping failed: {}",
                    e
                )))
            }
            Err(_) => {
                return Err(DatabaseError::Connection(format!(
                    "MongoDB ping did not answer within {:?}",
                    config.operation_timeout()
                )))
            }
        }

        info!(
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "MongoDB connection established successfully"
        );

        let database = client.database(&config.database);
        Ok(Self {
            client,
            database,
            config,
        })
    }

    /// Get database instance
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Typed users collection
    pub fn users_collection(&self) -> Collection<UserDocument> {
        self.database.collection::<UserDocument>(&self.config.collection)
    }

    /// Make `email` unique at the store level.
    pub async fn ensure_unique_email_index(&self) -> Result<String, DatabaseError> {
        let collection: Collection<Document> = self.database.collection(&self.config.collection);
        let index_model = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(
                IndexOptions::builder()
                    .name("email_unique".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let result = tokio::time::timeout(
            self.config.operation_timeout(),
            collection.create_index(index_model, None),
        )
        .await
        .map_err(|_| DatabaseError::Timeout("create unique email index".to_string()))?
        .map_err(|e| map_driver_error("create unique email index", e))?;

        info!(
            collection = %self.config.collection,
            index = %result.index_name,
            "Unique email index in place"
        );
        Ok(result.index_name)
    }

    /// Consume the connection into the repository handlers operate on.
    pub fn into_users(self) -> MongoUserRepository {
        let collection = self.users_collection();
        MongoUserRepository::new(self.client, collection, self.config.operation_timeout())
    }
}

/// Production connector backed by the MongoDB driver.
#[derive(Debug, Default, Clone)]
pub struct MongoConnector;

impl MongoConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StoreConnector for MongoConnector {
    async fn connect(
        &self,
        config: &MongoConfig,
        connection_string: &str,
    ) -> Result<CollectionHandle, DatabaseError> {
        let connection = MongoConnection::new(config.clone(), connection_string).await?;

        if config.enforce_unique_email {
            connection.ensure_unique_email_index().await.map_err(|e| {
                DatabaseError::Connection(format!("Failed to prepare users collection: {}", e))
            })?;
        }

        debug!(database = %connection.database().name(), "Users collection resolved");
        let handle: CollectionHandle = Arc::new(connection.into_users());
        Ok(handle)
    }
}

/// Classify a driver error so the manager knows whether the link is still usable.
pub(crate) fn map_driver_error(operation: &str, error: mongodb::error::Error) -> DatabaseError {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE =>
        {
            DatabaseError::DuplicateKey(format!("{}: {}", operation, write_error.message))
        }
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. }
        | ErrorKind::Authentication { .. } => {
            warn!(operation = %operation, error = %error, "MongoDB link failure");
            DatabaseError::Connection(format!("{} failed: {}", operation, error))
        }
        _ => DatabaseError::Query(format!("{} failed: {}", operation, error)),
    }
}

/// Run one driver future under the operation timeout.
pub(crate) async fn bounded<T, F>(
    operation: &str,
    timeout: Duration,
    future: F,
) -> Result<T, DatabaseError>
where
    F: std::future::Future<Output = mongodb::error::Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result.map_err(|e| map_driver_error(operation, e)),
        Err(_) => Err(DatabaseError::Timeout(format!(
            "{} did not complete within {:?}",
            operation, timeout
        ))),
    }
}
