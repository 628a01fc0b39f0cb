//! Blocking variants of the store handle and accessor.
//!
//! [`BlockingDocumentStore`] owns a Tokio runtime and drives the async operations to
//! completion on it, so synchronous callers get the same semantics without an executor of
//! their own. Do not use these types from inside an async context; `block_on` panics when
//! called from a runtime worker thread.

use bson::Bson;
use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;

use crate::{
    backend::{BulkWriteOptions, InsertManyOptions, StoreBackend, StoreBackendBuilder, UpdateOptions},
    collection::CollectionRef,
    document::{Decoder, Entity},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
    store::DocumentStore,
};

/// A store handle whose operations block the calling thread.
#[derive(Debug)]
pub struct BlockingDocumentStore<B: StoreBackend> {
    store: Option<DocumentStore<B>>,
    runtime: Runtime,
}

impl<B: StoreBackend> BlockingDocumentStore<B> {
    /// Wraps an existing store, starting a dedicated runtime for it.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Initialization`] if the runtime cannot be started.
    pub fn new(store: DocumentStore<B>) -> DocumentStoreResult<Self> {
        Ok(Self {
            store: Some(store),
            runtime: runtime()?,
        })
    }

    /// Builds a backend on a dedicated runtime and wraps it.
    ///
    /// Backends that spawn background tasks on construction keep them on this runtime.
    pub fn connect<T>(builder: T, decoder: Decoder) -> DocumentStoreResult<Self>
    where
        T: StoreBackendBuilder<Backend = B>,
    {
        let runtime = runtime()?;
        let store = runtime.block_on(DocumentStore::connect_with(builder, decoder))?;

        Ok(Self { store: Some(store), runtime })
    }

    /// Resolves a blocking handle to the collection `name` holding entities of type `E`.
    ///
    /// # Errors
    ///
    /// Fails once [`shutdown`](Self::shutdown) has been called.
    pub fn collection<E: Entity>(&self, name: &str) -> DocumentStoreResult<BlockingCollection<'_, B, E>> {
        Ok(BlockingCollection {
            inner: self.store()?.collection(name),
            runtime: &self.runtime,
        })
    }

    /// Returns the wrapped async store.
    pub fn store(&self) -> DocumentStoreResult<&DocumentStore<B>> {
        self.store
            .as_ref()
            .ok_or_else(|| DocumentStoreError::Backend("Store has been shut down".to_string()))
    }

    /// Shuts down the store, releasing the backend connection.
    ///
    /// Further calls are no-ops; resolving collections afterwards fails.
    pub fn shutdown(&mut self) -> DocumentStoreResult<()> {
        match self.store.take() {
            Some(store) => self.runtime.block_on(store.shutdown()),
            None => Ok(()),
        }
    }
}

impl<B: StoreBackend> Drop for BlockingDocumentStore<B> {
    fn drop(&mut self) {
        // Backend clients may spawn cleanup work when dropped.
        let _guard = self.runtime.enter();
        drop(self.store.take());
    }
}

fn runtime() -> DocumentStoreResult<Runtime> {
    Builder::new_multi_thread()
        .enable_all()
        .thread_name("docaccess-blocking")
        .build()
        .map_err(|err| DocumentStoreError::Initialization(format!("Failed to start runtime: {}", err)))
}

/// Blocking counterpart of [`CollectionRef`] with identical semantics.
#[derive(Debug)]
pub struct BlockingCollection<'a, B: StoreBackend, E: Entity> {
    inner: CollectionRef<'a, B, E>,
    runtime: &'a Runtime,
}

impl<'a, B: StoreBackend, E: Entity> BlockingCollection<'a, B, E> {
    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Rebinds the same collection to another entity type.
    pub fn with_type<T: Entity>(self) -> BlockingCollection<'a, B, T> {
        BlockingCollection {
            inner: self.inner.with_type(),
            runtime: self.runtime,
        }
    }

    /// See [`CollectionRef::with_cancellation`].
    pub fn with_cancellation(self, token: CancellationToken) -> Self {
        Self {
            inner: self.inner.with_cancellation(token),
            runtime: self.runtime,
        }
    }

    pub fn find_one(&self, filter: Expr) -> DocumentStoreResult<Option<E>> {
        self.runtime.block_on(self.inner.find_one(filter))
    }

    pub fn select(&self, filter: Expr) -> DocumentStoreResult<Vec<E>> {
        self.runtime.block_on(self.inner.select(filter))
    }

    pub fn select_by<K, F>(&self, f: F, keys: impl IntoIterator<Item = K>) -> DocumentStoreResult<Vec<E>>
    where
        F: Fn(&K) -> Expr,
    {
        self.runtime.block_on(self.inner.select_by(f, keys))
    }

    pub fn select_with_limit(&self, filter: Expr, limit: usize) -> DocumentStoreResult<Vec<E>> {
        self.runtime
            .block_on(self.inner.select_with_limit(filter, limit))
    }

    pub fn select_by_key_value(&self, field: &str, value: &str) -> DocumentStoreResult<Vec<E>> {
        self.runtime
            .block_on(self.inner.select_by_key_value(field, value))
    }

    pub fn select_all(&self) -> DocumentStoreResult<Vec<E>> {
        self.runtime.block_on(self.inner.select_all())
    }

    pub fn query(&self, query: Query) -> DocumentStoreResult<Vec<E>> {
        self.runtime.block_on(self.inner.query(query))
    }

    pub fn insert_one(&self, entity: &E) -> DocumentStoreResult<()> {
        self.runtime.block_on(self.inner.insert_one(entity))
    }

    pub fn insert_many(&self, entities: &[E]) -> DocumentStoreResult<()> {
        self.runtime.block_on(self.inner.insert_many(entities))
    }

    pub fn insert_many_with(&self, entities: &[E], options: InsertManyOptions) -> DocumentStoreResult<()> {
        self.runtime
            .block_on(self.inner.insert_many_with(entities, options))
    }

    pub fn replace_one(&self, filter: Expr, entity: &E) -> DocumentStoreResult<bool> {
        self.runtime
            .block_on(self.inner.replace_one(filter, entity))
    }

    pub fn replace_one_with(&self, filter: Expr, entity: &E, options: UpdateOptions) -> DocumentStoreResult<bool> {
        self.runtime
            .block_on(self.inner.replace_one_with(filter, entity, options))
    }

    pub fn push(&self, filter: Expr, field: &str, value: impl Into<Bson>) -> DocumentStoreResult<bool> {
        self.runtime
            .block_on(self.inner.push(filter, field, value))
    }

    pub fn add_to_set(&self, filter: Expr, field: &str, value: impl Into<Bson>) -> DocumentStoreResult<bool> {
        self.runtime
            .block_on(self.inner.add_to_set(filter, field, value))
    }

    pub fn bulk_write<F>(&self, f: F, entities: &[E]) -> DocumentStoreResult<bool>
    where
        F: Fn(&E) -> Expr,
    {
        self.runtime
            .block_on(self.inner.bulk_write(f, entities))
    }

    pub fn bulk_write_with<F>(&self, f: F, entities: &[E], options: BulkWriteOptions) -> DocumentStoreResult<bool>
    where
        F: Fn(&E) -> Expr,
    {
        self.runtime
            .block_on(self.inner.bulk_write_with(f, entities, options))
    }

    pub fn delete_one(&self, filter: Expr) -> DocumentStoreResult<bool> {
        self.runtime.block_on(self.inner.delete_one(filter))
    }

    pub fn delete_many(&self, filter: Expr) -> DocumentStoreResult<bool> {
        self.runtime.block_on(self.inner.delete_many(filter))
    }
}
