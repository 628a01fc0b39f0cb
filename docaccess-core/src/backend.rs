//! The store contract consumed by the accessor.
//!
//! [`StoreBackend`] is the only thing the accessor knows about the underlying document
//! store. Any implementation honouring it (the in-memory store, MongoDB, or a test double)
//! can be swapped in, statically through the type parameter of
//! [`DocumentStore`](crate::store::DocumentStore) or at runtime through [`DynStoreBackend`].
//!
//! Every write returns a result carrying the store's acknowledged flag alongside the
//! relevant counts; collapsing those into booleans is the accessor's job, not the backend's.
//!
//! # Example
//!
//! ```ignore
//! use docaccess::backend::{StoreBackend, InsertManyOptions};
//! use bson::doc;
//!
//! let result = backend
//!     .insert_many("users", vec![doc! { "_id": 1, "name": "a" }], InsertManyOptions::default())
//!     .await?;
//! assert_eq!(result.inserted_count, 1);
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{any::Any, fmt::Debug};

use crate::{error::DocumentStoreResult, query::{Expr, Query}, update::Update};

/// Options for inserting several documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertManyOptions {
    /// Process documents in list order and stop at the first failure.
    ///
    /// Documents before the failure point stay persisted.
    pub ordered: bool,
}

impl Default for InsertManyOptions {
    fn default() -> Self {
        Self { ordered: true }
    }
}

/// Options for single-document updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a new document when nothing matches the filter.
    pub upsert: bool,
}

/// Options for bulk writes.
///
/// The default is unordered, best-effort execution: every operation is attempted and the
/// first failure is reported afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteOptions {
    /// Process operations in list order and halt at the first failure.
    pub ordered: bool,
}

/// A replace-one operation inside a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceOneModel {
    /// Filter selecting the document to replace.
    pub filter: Expr,
    /// The new document.
    pub replacement: Document,
    /// Insert the replacement when nothing matches.
    pub upsert: bool,
}

/// Outcome of a single insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    /// Whether the store acknowledged the write.
    pub acknowledged: bool,
    /// Identity of the inserted document.
    pub inserted_id: Bson,
}

/// Outcome of a multi-document insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertManyResult {
    /// Whether the store acknowledged the write.
    pub acknowledged: bool,
    /// Number of documents persisted.
    pub inserted_count: u64,
}

/// Outcome of a single-document update or replacement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    /// Whether the store acknowledged the write.
    pub acknowledged: bool,
    /// Number of documents matching the filter.
    pub matched_count: u64,
    /// Number of documents actually changed.
    pub modified_count: u64,
    /// Identity of the inserted document when the update upserted.
    pub upserted_id: Option<Bson>,
}

impl UpdateResult {
    /// `true` if the write was acknowledged and changed or inserted a document.
    pub fn is_effective(&self) -> bool {
        self.acknowledged && (self.modified_count > 0 || self.upserted_id.is_some())
    }
}

/// Outcome of a bulk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    /// Whether the store acknowledged the write.
    pub acknowledged: bool,
    /// Number of documents matched by the operation filters.
    pub matched_count: u64,
    /// Number of documents actually changed.
    pub modified_count: u64,
    /// Number of documents inserted by upserts.
    pub upserted_count: u64,
}

impl BulkWriteResult {
    /// `true` if the write was acknowledged and changed or inserted at least one document.
    pub fn is_effective(&self) -> bool {
        self.acknowledged && self.modified_count + self.upserted_count > 0
    }
}

/// Outcome of a delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    /// Whether the store acknowledged the write.
    pub acknowledged: bool,
    /// Number of documents removed.
    pub deleted_count: u64,
}

impl DeleteResult {
    /// `true` if the write was acknowledged and removed at least one document.
    pub fn is_effective(&self) -> bool {
        self.acknowledged && self.deleted_count > 0
    }
}

/// Abstract interface for document stores.
///
/// Collections are created lazily on first write; reads from a collection that does not
/// exist return nothing. Filters handed to these methods have already been validated by
/// the accessor, but implementations must still fail with
/// [`DocumentStoreError::Translation`](crate::error::DocumentStoreError::Translation)
/// rather than panic on anything they cannot express.
///
/// # Thread Safety
///
/// Implementations must support concurrent calls from multiple async tasks. This layer
/// performs no locking of its own.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the documents matching `query`, honouring its sort, offset and limit.
    ///
    /// Without a sort the order is store-defined (natural order for both bundled stores).
    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>>;

    /// Inserts one document.
    ///
    /// Fails with `DocumentAlreadyExists` if a document with the same `_id` is present.
    /// A document without `_id` receives a store-generated one.
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<InsertOneResult>;

    /// Inserts several documents.
    ///
    /// In ordered mode the store stops at the first failure, keeping earlier documents.
    /// In unordered mode every document is attempted and the first failure is reported
    /// afterwards.
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        options: InsertManyOptions,
    ) -> DocumentStoreResult<InsertManyResult>;

    /// Applies `update` to the first document matching `filter`.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Expr,
        update: Update,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult>;

    /// Executes independent replace operations in one call.
    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<ReplaceOneModel>,
        options: BulkWriteOptions,
    ) -> DocumentStoreResult<BulkWriteResult>;

    /// Removes the first document matching `filter`.
    async fn delete_one(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<DeleteResult>;

    /// Removes every document matching `filter`.
    async fn delete_many(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<DeleteResult>;

    /// Cleanly shuts down the backend, releasing its connection.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Object-safe mirror of [`StoreBackend`] for runtime backend selection.
#[async_trait]
pub trait DynStoreBackend: Send + Sync + Debug {
    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>>;
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<InsertOneResult>;
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        options: InsertManyOptions,
    ) -> DocumentStoreResult<InsertManyResult>;
    async fn update_one(
        &self,
        collection: &str,
        filter: &Expr,
        update: Update,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult>;
    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<ReplaceOneModel>,
        options: BulkWriteOptions,
    ) -> DocumentStoreResult<BulkWriteResult>;
    async fn delete_one(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<DeleteResult>;
    async fn delete_many(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<DeleteResult>;
    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()>;

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<B: StoreBackend + 'static> DynStoreBackend for B {
    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        StoreBackend::find(self, collection, query).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<InsertOneResult> {
        StoreBackend::insert_one(self, collection, document).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        options: InsertManyOptions,
    ) -> DocumentStoreResult<InsertManyResult> {
        StoreBackend::insert_many(self, collection, documents, options).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Expr,
        update: Update,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        StoreBackend::update_one(self, collection, filter, update, options).await
    }

    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<ReplaceOneModel>,
        options: BulkWriteOptions,
    ) -> DocumentStoreResult<BulkWriteResult> {
        StoreBackend::bulk_write(self, collection, models, options).await
    }

    async fn delete_one(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<DeleteResult> {
        StoreBackend::delete_one(self, collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<DeleteResult> {
        StoreBackend::delete_many(self, collection, filter).await
    }

    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()> {
        StoreBackend::shutdown(*self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl StoreBackend for Box<dyn DynStoreBackend> {
    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        DynStoreBackend::find(&**self, collection, query).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<InsertOneResult> {
        DynStoreBackend::insert_one(&**self, collection, document).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        options: InsertManyOptions,
    ) -> DocumentStoreResult<InsertManyResult> {
        DynStoreBackend::insert_many(&**self, collection, documents, options).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Expr,
        update: Update,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        DynStoreBackend::update_one(&**self, collection, filter, update, options).await
    }

    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<ReplaceOneModel>,
        options: BulkWriteOptions,
    ) -> DocumentStoreResult<BulkWriteResult> {
        DynStoreBackend::bulk_write(&**self, collection, models, options).await
    }

    async fn delete_one(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<DeleteResult> {
        DynStoreBackend::delete_one(&**self, collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<DeleteResult> {
        DynStoreBackend::delete_many(&**self, collection, filter).await
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        DynStoreBackend::shutdown_boxed(self).await
    }
}

/// Factory for backends, used by [`DocumentStore::connect`](crate::store::DocumentStore::connect).
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
