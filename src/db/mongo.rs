//! MongoDB client and collection wrapper

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::{
    options::{IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{error, info};

use crate::db::schemas::Metadata;
use crate::types::StoreError;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping. `timeout` bounds server selection and connection
    /// setup so an unreachable server fails fast.
    pub async fn new(uri: &str, db_name: &str, timeout: Duration) -> Result<Self, StoreError> {
        info!("Connecting to MongoDB at {}", uri);

        let ms = timeout.as_millis();
        let timeout_uri = if uri.contains('?') {
            format!("{uri}&serverSelectionTimeoutMS={ms}&connectTimeoutMS={ms}")
        } else {
            format!("{uri}?serverSelectionTimeoutMS={ms}&connectTimeoutMS={ms}")
        };

        let client = Client::with_uri_str(&timeout_uri).await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to MongoDB: {}", e))
        })?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::Unavailable(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, StoreError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, StoreError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> Result<(), StoreError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner.create_indexes(indices).await?;

        Ok(())
    }

    /// Insert a document, setting metadata timestamps
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, StoreError> {
        item.mut_metadata().stamp_created();

        let result = self.inner.insert_one(item).await?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| StoreError::Corrupt("Failed to get inserted ID".into()))
    }

    /// Find one document by filter, skipping soft-deleted documents
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, StoreError> {
        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        Ok(self.inner.find_one(full_filter).await?)
    }

    /// Find many documents by filter in insertion order, skipping soft-deleted
    /// documents. A document that fails to decode fails the whole call.
    pub async fn find_many(&self, filter: Document) -> Result<Vec<T>, StoreError> {
        use futures_util::TryStreamExt;

        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        let cursor = self
            .inner
            .find(full_filter)
            .sort(doc! { "_id": 1 })
            .await?;

        cursor.try_collect().await.map_err(|e| {
            error!("Error reading document: {}", e);
            StoreError::from(e)
        })
    }

    /// Ids of matching documents in insertion order, without decoding the
    /// rest of each document
    pub async fn find_ids(&self, filter: Document) -> Result<Vec<ObjectId>, StoreError> {
        use futures_util::TryStreamExt;

        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        let docs: Vec<Document> = self
            .inner
            .clone_with_type::<Document>()
            .find(full_filter)
            .projection(doc! { "_id": 1 })
            .sort(doc! { "_id": 1 })
            .await?
            .try_collect()
            .await?;

        docs.iter()
            .map(|d| {
                d.get_object_id("_id")
                    .map_err(|e| StoreError::Corrupt(format!("document without ObjectId _id: {e}")))
            })
            .collect()
    }

    /// Update one document, stamping `metadata.updated_at`
    pub async fn update_set(
        &self,
        filter: Document,
        mut fields: Document,
    ) -> Result<UpdateResult, StoreError> {
        fields.insert("metadata.updated_at", DateTime::now());
        self.update_one(filter, doc! { "$set": fields }).await
    }

    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, StoreError> {
        Ok(self.inner.update_one(filter, update.into()).await?)
    }
}
