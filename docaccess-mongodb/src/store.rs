use async_trait::async_trait;
use bson::Document;
use futures::{TryStreamExt, future::join_all};
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{Acknowledgment, ClientOptions},
};
use std::time::Duration;

use docaccess_core::{
    backend::{
        BulkWriteOptions, BulkWriteResult, DeleteResult, InsertManyOptions, InsertManyResult, InsertOneResult,
        ReplaceOneModel, StoreBackend, StoreBackendBuilder, UpdateOptions, UpdateResult,
    },
    config::{StoreConfig, validate_connection_string, validate_database_name},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
    update::Update,
};

use crate::query::{MongoQueryTranslator, MongoUpdate, find_options};

const DUPLICATE_KEY: i32 = 11000;
const IMMUTABLE_FIELD: i32 = 66;

/// MongoDB implementation of the store contract.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
    acknowledged: bool,
}

impl MongoDbStore {
    /// Wraps a pre-built client.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] if `database` is not a valid name.
    pub fn new(client: Client, database: impl Into<String>) -> DocumentStoreResult<Self> {
        let database = database.into();
        validate_database_name(&database)?;

        // A write concern of w:0 never reports counts back.
        let acknowledged = client
            .write_concern()
            .and_then(|concern| concern.w.as_ref())
            .is_none_or(|w| !matches!(w, Acknowledgment::Nodes(0)));

        Ok(Self { client, database, acknowledged })
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    /// Returns the logical database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    async fn replace(&self, collection: &str, model: ReplaceOneModel) -> DocumentStoreResult<UpdateResult> {
        let filter = MongoQueryTranslator::translate(Some(&model.filter))?;

        self.get_collection(collection)
            .replace_one(filter, model.replacement)
            .upsert(model.upsert)
            .await
            .map(|result| self.update_result(result))
            .map_err(|e| map_error(e, collection))
    }

    fn update_result(&self, result: mongodb::results::UpdateResult) -> UpdateResult {
        UpdateResult {
            acknowledged: self.acknowledged,
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        }
    }
}

/// Maps driver errors onto the error taxonomy.
fn map_error(err: MongoError, collection: &str) -> DocumentStoreError {
    let code = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => Some(write_error.code),
        _ => None,
    };
    let message = err.to_string();

    if code == Some(DUPLICATE_KEY) || message.contains("E11000") {
        DocumentStoreError::DocumentAlreadyExists(message, collection.to_string())
    } else if code == Some(IMMUTABLE_FIELD) {
        DocumentStoreError::InvalidDocument(message)
    } else {
        DocumentStoreError::Backend(message)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        let filter = MongoQueryTranslator::translate(query.filter.as_ref())?;

        self.get_collection(collection)
            .find(filter)
            .with_options(find_options(&query))
            .await
            .map_err(|e| map_error(e, collection))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| map_error(e, collection))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<InsertOneResult> {
        let result = self
            .get_collection(collection)
            .insert_one(document)
            .await
            .map_err(|e| map_error(e, collection))?;

        Ok(InsertOneResult {
            acknowledged: self.acknowledged,
            inserted_id: result.inserted_id,
        })
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        options: InsertManyOptions,
    ) -> DocumentStoreResult<InsertManyResult> {
        let result = self
            .get_collection(collection)
            .insert_many(documents)
            .ordered(options.ordered)
            .await
            .map_err(|e| map_error(e, collection))?;

        Ok(InsertManyResult {
            acknowledged: self.acknowledged,
            inserted_count: result.inserted_ids.len() as u64,
        })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Expr,
        update: Update,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        let filter = MongoQueryTranslator::translate(Some(filter))?;
        let target = self.get_collection(collection);

        let result = match MongoUpdate::from(update) {
            MongoUpdate::Replace(replacement) => {
                target
                    .replace_one(filter, replacement)
                    .upsert(options.upsert)
                    .await
            }
            MongoUpdate::Modify(modifications) => {
                target
                    .update_one(filter, modifications)
                    .upsert(options.upsert)
                    .await
            }
        }
        .map_err(|e| map_error(e, collection))?;

        Ok(self.update_result(result))
    }

    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<ReplaceOneModel>,
        options: BulkWriteOptions,
    ) -> DocumentStoreResult<BulkWriteResult> {
        let mut outcomes = Vec::with_capacity(models.len());

        if options.ordered {
            for model in models {
                outcomes.push(self.replace(collection, model).await?);
            }
        } else {
            let mut first_error = None;

            for outcome in join_all(models.into_iter().map(|model| self.replace(collection, model))).await {
                match outcome {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(err) => {
                        first_error.get_or_insert(err);
                    }
                }
            }

            if let Some(err) = first_error {
                return Err(err);
            }
        }

        Ok(outcomes.into_iter().fold(
            BulkWriteResult { acknowledged: self.acknowledged, ..Default::default() },
            |mut total, outcome| {
                total.matched_count += outcome.matched_count;
                total.modified_count += outcome.modified_count;
                total.upserted_count += u64::from(outcome.upserted_id.is_some());
                total
            },
        ))
    }

    async fn delete_one(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<DeleteResult> {
        let result = self
            .get_collection(collection)
            .delete_one(MongoQueryTranslator::translate(Some(filter))?)
            .await
            .map_err(|e| map_error(e, collection))?;

        Ok(DeleteResult {
            acknowledged: self.acknowledged,
            deleted_count: result.deleted_count,
        })
    }

    async fn delete_many(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<DeleteResult> {
        let result = self
            .get_collection(collection)
            .delete_many(MongoQueryTranslator::translate(Some(filter))?)
            .await
            .map_err(|e| map_error(e, collection))?;

        Ok(DeleteResult {
            acknowledged: self.acknowledged,
            deleted_count: result.deleted_count,
        })
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;
        tracing::info!(database = %self.database, "MongoDB client shut down");

        Ok(())
    }
}

/// Builder for [`MongoDbStore`].
#[derive(Debug, Clone)]
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
    app_name: Option<String>,
    max_pool_size: Option<u32>,
    connect_timeout: Option<Duration>,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            app_name: None,
            max_pool_size: None,
            connect_timeout: None,
        }
    }

    /// Copies every connection setting from `config`.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            app_name: config.app_name.clone(),
            max_pool_size: config.max_pool_size,
            connect_timeout: config.connect_timeout(),
            ..Self::new(&config.connection_string, &config.database)
        }
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn max_pool_size(mut self, max_pool_size: u32) -> Self {
        self.max_pool_size = Some(max_pool_size);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        validate_connection_string(&self.dsn)?;
        validate_database_name(&self.database)?;

        let mut options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Configuration(e.to_string()))?;

        if self.app_name.is_some() {
            options.app_name = self.app_name;
        }
        if self.max_pool_size.is_some() {
            options.max_pool_size = self.max_pool_size;
        }
        if self.connect_timeout.is_some() {
            options.connect_timeout = self.connect_timeout;
        }

        let client = Client::with_options(options)
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;
        tracing::info!(database = %self.database, "Connected to MongoDB");

        MongoDbStore::new(client, self.database)
    }
}
