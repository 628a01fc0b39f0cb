//! The generic accessor.
//!
//! A [`CollectionRef`] binds a collection name to an entity type and exposes the whole
//! CRUD and query surface for it. Every operation validates its filter or update before
//! the store is contacted, so a predicate the store cannot express fails immediately with
//! [`DocumentStoreError::Translation`] and is never retried.
//!
//! Boolean results follow one rule: `true` only when the store acknowledged the write and
//! the relevant count is non-zero. A write that matched nothing is `false`, not an error.
//!
//! # Example
//!
//! ```ignore
//! use docaccess::query::Filter;
//!
//! let users = store.collection::<User>("users");
//! users.insert_one(&User { id: 1, name: "a".into(), tags: vec![] }).await?;
//!
//! assert!(users.add_to_set(Filter::eq("_id", 1), "tags", "admin").await?);
//! assert!(users.delete_one(Filter::eq("_id", 1)).await?);
//! ```

use bson::{Bson, Document};
use std::{fmt, future::Future, marker::PhantomData};
use tokio_util::sync::CancellationToken;

use crate::{
    backend::{BulkWriteOptions, InsertManyOptions, ReplaceOneModel, StoreBackend, UpdateOptions},
    document::{Decoder, DocumentExt, Entity},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Filter, Query},
    update::Update,
};

/// A typed handle to one collection.
///
/// Handles are cheap: they hold the collection name, a borrow of the backend and the
/// store's decoder. Nothing is cached between calls.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the store the handle was resolved from
/// * `B` - The backend implementation type
/// * `E` - The entity type stored in the collection
pub struct CollectionRef<'a, B: StoreBackend, E: Entity> {
    name: String,
    backend: &'a B,
    decoder: Decoder,
    cancellation: Option<CancellationToken>,
    _entity: PhantomData<fn() -> E>,
}

impl<B: StoreBackend, E: Entity> fmt::Debug for CollectionRef<'_, B, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionRef")
            .field("name", &self.name)
            .field("entity", &std::any::type_name::<E>())
            .field("decoder", &self.decoder)
            .field("cancellable", &self.cancellation.is_some())
            .finish()
    }
}

impl<B: StoreBackend, E: Entity> Clone for CollectionRef<'_, B, E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            backend: self.backend,
            decoder: self.decoder,
            cancellation: self.cancellation.clone(),
            _entity: PhantomData,
        }
    }
}

impl<'a, B: StoreBackend, E: Entity> CollectionRef<'a, B, E> {
    pub(crate) fn new(name: String, backend: &'a B, decoder: Decoder) -> Self {
        Self {
            name,
            backend,
            decoder,
            cancellation: None,
            _entity: PhantomData,
        }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rebinds the same collection to another entity type.
    pub fn with_type<T: Entity>(self) -> CollectionRef<'a, B, T> {
        CollectionRef {
            name: self.name,
            backend: self.backend,
            decoder: self.decoder,
            cancellation: self.cancellation,
            _entity: PhantomData,
        }
    }

    /// Makes every operation on this handle abandonable through `token`.
    ///
    /// Once the token fires, pending and future operations report
    /// [`DocumentStoreError::Cancelled`]. Whether a cancelled batch was partially applied is
    /// unknown; re-query to find out.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns the first document matching `filter`, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Translation`] if `filter` is not expressible and
    /// [`DocumentStoreError::Serialization`] if the stored document does not decode.
    pub async fn find_one(&self, filter: Expr) -> DocumentStoreResult<Option<E>> {
        self.check_filter("find_one", &filter)?;
        let query = Query::builder().filter(filter).limit(1).build();
        let documents = self
            .run("find_one", StoreBackend::find(self.backend, &self.name, query))
            .await?;

        documents
            .into_iter()
            .next()
            .map(|document| self.decoder.decode(document))
            .transpose()
    }

    /// Returns every document matching `filter`.
    pub async fn select(&self, filter: Expr) -> DocumentStoreResult<Vec<E>> {
        self.check_filter("select", &filter)?;

        self.fetch("select", Query::filtered(filter)).await
    }

    /// Builds one predicate per key with `f`, joins them with AND, and returns the matches.
    ///
    /// Because the per-key predicates are joined with AND, distinct keys on the same field
    /// generally match nothing. An empty key list matches every document.
    pub async fn select_by<K, F>(&self, f: F, keys: impl IntoIterator<Item = K>) -> DocumentStoreResult<Vec<E>>
    where
        F: Fn(&K) -> Expr,
    {
        let filter = Filter::and(keys.into_iter().map(|key| f(&key)));
        self.check_filter("select_by", &filter)?;

        self.fetch("select_by", Query::filtered(filter)).await
    }

    /// Returns at most `limit` documents matching `filter`.
    ///
    /// A limit of zero returns nothing without contacting the store.
    pub async fn select_with_limit(&self, filter: Expr, limit: usize) -> DocumentStoreResult<Vec<E>> {
        self.check_filter("select_with_limit", &filter)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query = Query::builder().filter(filter).limit(limit).build();
        self.fetch("select_with_limit", query).await
    }

    /// Returns documents whose `field` equals `value` as a string.
    ///
    /// Stored values of other types never match, even if their textual form does.
    pub async fn select_by_key_value(&self, field: &str, value: &str) -> DocumentStoreResult<Vec<E>> {
        let filter = Filter::eq(field, value);
        self.check_filter("select_by_key_value", &filter)?;

        self.fetch("select_by_key_value", Query::filtered(filter)).await
    }

    /// Returns every document in the collection.
    pub async fn select_all(&self) -> DocumentStoreResult<Vec<E>> {
        self.fetch("select_all", Query::filtered(Filter::all())).await
    }

    /// Runs a structured query with sort, offset and limit.
    pub async fn query(&self, query: Query) -> DocumentStoreResult<Vec<E>> {
        if let Some(filter) = &query.filter {
            self.check_filter("query", filter)?;
        }

        self.fetch("query", query).await
    }

    /// Inserts one entity.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentAlreadyExists`] if the identity is taken.
    pub async fn insert_one(&self, entity: &E) -> DocumentStoreResult<()> {
        let document = entity.to_document()?;
        self.run(
            "insert_one",
            StoreBackend::insert_one(self.backend, &self.name, document),
        )
        .await?;

        Ok(())
    }

    /// Inserts several entities in order, stopping at the first failure.
    pub async fn insert_many(&self, entities: &[E]) -> DocumentStoreResult<()> {
        self.insert_many_with(entities, InsertManyOptions::default())
            .await
    }

    /// Inserts several entities with explicit ordering.
    ///
    /// In ordered mode entities before the failure point stay persisted. An empty slice is a
    /// no-op.
    pub async fn insert_many_with(&self, entities: &[E], options: InsertManyOptions) -> DocumentStoreResult<()> {
        if entities.is_empty() {
            return Ok(());
        }

        let documents = to_documents(entities)?;
        self.run(
            "insert_many",
            StoreBackend::insert_many(self.backend, &self.name, documents, options),
        )
        .await?;

        Ok(())
    }

    /// Replaces the first document matching `filter` with `entity`.
    ///
    /// Nothing is inserted when no document matches.
    pub async fn replace_one(&self, filter: Expr, entity: &E) -> DocumentStoreResult<bool> {
        self.replace_one_with(filter, entity, UpdateOptions::default())
            .await
    }

    /// Replaces the first document matching `filter`, optionally inserting `entity` when
    /// nothing matches.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] if the replacement would change the
    /// identity of the matched document.
    pub async fn replace_one_with(&self, filter: Expr, entity: &E, options: UpdateOptions) -> DocumentStoreResult<bool> {
        self.update("replace_one", filter, Update::replace(entity.to_document()?), options)
            .await
    }

    /// Appends `value` to the array `field` of the first matching document.
    ///
    /// Duplicates are kept. A missing field is created as a one-element array.
    pub async fn push(&self, filter: Expr, field: &str, value: impl Into<Bson>) -> DocumentStoreResult<bool> {
        self.update("push", filter, Update::push(field, value), UpdateOptions::default())
            .await
    }

    /// Appends `value` to the array `field` of the first matching document unless an equal
    /// value is already present, in which case `false` is returned.
    pub async fn add_to_set(&self, filter: Expr, field: &str, value: impl Into<Bson>) -> DocumentStoreResult<bool> {
        self.update("add_to_set", filter, Update::add_to_set(field, value), UpdateOptions::default())
            .await
    }

    /// Replaces or inserts every entity, matching each one with the filter `f` builds for it.
    ///
    /// Runs unordered: every entity is attempted and the first failure is reported
    /// afterwards. An empty slice returns `false` without contacting the store.
    pub async fn bulk_write<F>(&self, f: F, entities: &[E]) -> DocumentStoreResult<bool>
    where
        F: Fn(&E) -> Expr,
    {
        self.bulk_write_with(f, entities, BulkWriteOptions::default())
            .await
    }

    /// Replaces or inserts every entity with explicit ordering.
    pub async fn bulk_write_with<F>(&self, f: F, entities: &[E], options: BulkWriteOptions) -> DocumentStoreResult<bool>
    where
        F: Fn(&E) -> Expr,
    {
        if entities.is_empty() {
            return Ok(false);
        }

        let models = entities
            .iter()
            .map(|entity| {
                let filter = f(entity);
                self.check_filter("bulk_write", &filter)?;

                Ok(ReplaceOneModel {
                    filter,
                    replacement: entity.to_document()?,
                    upsert: true,
                })
            })
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        let result = self
            .run(
                "bulk_write",
                StoreBackend::bulk_write(self.backend, &self.name, models, options),
            )
            .await?;

        Ok(result.is_effective())
    }

    /// Removes the first document matching `filter`.
    pub async fn delete_one(&self, filter: Expr) -> DocumentStoreResult<bool> {
        self.check_filter("delete_one", &filter)?;
        let result = self
            .run(
                "delete_one",
                StoreBackend::delete_one(self.backend, &self.name, &filter),
            )
            .await?;

        Ok(result.is_effective())
    }

    /// Removes every document matching `filter`.
    pub async fn delete_many(&self, filter: Expr) -> DocumentStoreResult<bool> {
        self.check_filter("delete_many", &filter)?;
        let result = self
            .run(
                "delete_many",
                StoreBackend::delete_many(self.backend, &self.name, &filter),
            )
            .await?;

        Ok(result.is_effective())
    }

    async fn fetch(&self, operation: &'static str, query: Query) -> DocumentStoreResult<Vec<E>> {
        let documents = self
            .run(operation, StoreBackend::find(self.backend, &self.name, query))
            .await?;

        self.decoder.decode_all(documents)
    }

    async fn update(
        &self,
        operation: &'static str,
        filter: Expr,
        update: Update,
        options: UpdateOptions,
    ) -> DocumentStoreResult<bool> {
        self.check_filter(operation, &filter)?;
        update
            .validate()
            .inspect_err(|err| self.rejected(operation, err))?;

        let result = self
            .run(
                operation,
                StoreBackend::update_one(self.backend, &self.name, &filter, update, options),
            )
            .await?;

        Ok(result.is_effective())
    }

    fn check_filter(&self, operation: &'static str, filter: &Expr) -> DocumentStoreResult<()> {
        filter
            .validate()
            .inspect_err(|err| self.rejected(operation, err))
    }

    fn rejected(&self, operation: &'static str, err: &DocumentStoreError) {
        tracing::warn!(collection = %self.name, operation, "Rejected before reaching the store: {}", err);
    }

    /// Drives a store round-trip, racing it against the cancellation token if one is set.
    async fn run<T>(
        &self,
        operation: &'static str,
        future: impl Future<Output = DocumentStoreResult<T>>,
    ) -> DocumentStoreResult<T> {
        tracing::debug!(collection = %self.name, operation, "Executing");

        let Some(token) = &self.cancellation else {
            return future.await;
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::warn!(collection = %self.name, operation, "Operation cancelled");
                Err(DocumentStoreError::Cancelled(format!(
                    "{} on collection '{}'",
                    operation, self.name
                )))
            }
            result = future => result,
        }
    }
}

fn to_documents<E: Entity>(entities: &[E]) -> DocumentStoreResult<Vec<Document>> {
    entities
        .iter()
        .map(DocumentExt::to_document)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{BulkWriteResult, DeleteResult, InsertManyResult, InsertOneResult, UpdateResult},
        store::DocumentStore,
    };
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, Ordering},
        },
        time::Duration,
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        #[serde(rename = "_id")]
        id: i32,
        text: String,
    }

    impl Entity for Note {
        type Id = i32;

        fn id(&self) -> &i32 {
            &self.id
        }
    }

    /// Records what reaches the store and answers with canned results.
    #[derive(Debug, Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        queries: Mutex<Vec<Query>>,
        acknowledged: bool,
    }

    impl Recorder {
        fn acknowledging() -> Self {
            Self { acknowledged: true, ..Self::default() }
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StoreBackend for Recorder {
        async fn find(&self, _collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
            self.record("find");
            self.queries.lock().unwrap().push(query);
            Ok(vec![bson::doc! { "_id": 1, "text": "hello", "extra": true }])
        }

        async fn insert_one(&self, _collection: &str, document: Document) -> DocumentStoreResult<InsertOneResult> {
            self.record("insert_one");
            Ok(InsertOneResult {
                acknowledged: self.acknowledged,
                inserted_id: document.get("_id").cloned().unwrap_or(Bson::Null),
            })
        }

        async fn insert_many(
            &self,
            _collection: &str,
            documents: Vec<Document>,
            _options: InsertManyOptions,
        ) -> DocumentStoreResult<InsertManyResult> {
            self.record("insert_many");
            Ok(InsertManyResult { acknowledged: self.acknowledged, inserted_count: documents.len() as u64 })
        }

        async fn update_one(
            &self,
            _collection: &str,
            _filter: &Expr,
            _update: Update,
            _options: UpdateOptions,
        ) -> DocumentStoreResult<UpdateResult> {
            self.record("update_one");
            Ok(UpdateResult { acknowledged: self.acknowledged, matched_count: 1, modified_count: 1, upserted_id: None })
        }

        async fn bulk_write(
            &self,
            _collection: &str,
            models: Vec<ReplaceOneModel>,
            _options: BulkWriteOptions,
        ) -> DocumentStoreResult<BulkWriteResult> {
            self.record("bulk_write");
            Ok(BulkWriteResult {
                acknowledged: self.acknowledged,
                upserted_count: models.len() as u64,
                ..Default::default()
            })
        }

        async fn delete_one(&self, _collection: &str, _filter: &Expr) -> DocumentStoreResult<DeleteResult> {
            self.record("delete_one");
            Ok(DeleteResult { acknowledged: self.acknowledged, deleted_count: 1 })
        }

        async fn delete_many(&self, _collection: &str, _filter: &Expr) -> DocumentStoreResult<DeleteResult> {
            self.record("delete_many");
            Ok(DeleteResult { acknowledged: self.acknowledged, deleted_count: 2 })
        }
    }

    #[tokio::test]
    async fn empty_bulk_write_never_reaches_the_store() {
        let store = DocumentStore::new(Recorder::acknowledging());
        let notes = store.collection::<Note>("notes");

        assert!(!notes.bulk_write(Note::id_filter, &[]).await.unwrap());
        assert!(store.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn untranslatable_filter_is_rejected_before_the_store() {
        let store = DocumentStore::new(Recorder::acknowledging());
        let notes = store.collection::<Note>("notes");

        let err = notes
            .select(Filter::starts_with("text", 5))
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::Translation(_)));
        assert!(store.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn identity_updates_are_rejected_before_the_store() {
        let store = DocumentStore::new(Recorder::acknowledging());
        let notes = store.collection::<Note>("notes");

        let err = notes
            .push(Filter::eq("_id", 1), "_id", 2)
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
        assert!(store.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn unacknowledged_writes_collapse_to_false() {
        let store = DocumentStore::new(Recorder::default());
        let notes = store.collection::<Note>("notes");
        let note = Note { id: 1, text: "a".to_string() };

        assert!(!notes.delete_one(Filter::eq("_id", 1)).await.unwrap());
        assert!(!notes.replace_one(Filter::eq("_id", 1), &note).await.unwrap());
        assert!(!notes.bulk_write(Note::id_filter, &[note]).await.unwrap());
    }

    #[tokio::test]
    async fn select_by_joins_keys_with_and() {
        let store = DocumentStore::new(Recorder::acknowledging());
        let notes = store.collection::<Note>("notes");

        notes
            .select_by(|id: &i32| Filter::eq("_id", *id), vec![1, 2])
            .await
            .unwrap();
        notes
            .select_by(|id: &i32| Filter::eq("_id", *id), Vec::new())
            .await
            .unwrap();

        let queries = store.backend().queries.lock().unwrap().clone();
        assert_eq!(
            queries[0].filter,
            Some(Expr::And(vec![Filter::eq("_id", 1), Filter::eq("_id", 2)]))
        );
        assert!(queries[1].filter.as_ref().is_some_and(Expr::matches_all));
    }

    #[tokio::test]
    async fn find_one_limits_to_a_single_document() {
        let store = DocumentStore::new(Recorder::acknowledging());
        let notes = store.collection::<Note>("notes");

        let note = notes.find_one(Filter::eq("_id", 1)).await.unwrap();

        assert_eq!(note, Some(Note { id: 1, text: "hello".to_string() }));
        assert_eq!(store.backend().queries.lock().unwrap()[0].limit, Some(1));
    }

    #[tokio::test]
    async fn zero_limit_returns_nothing() {
        let store = DocumentStore::new(Recorder::acknowledging());
        let notes = store.collection::<Note>("notes");

        assert!(notes.select_with_limit(Filter::all(), 0).await.unwrap().is_empty());
        assert!(store.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn strict_decoder_applies_to_resolved_handles() {
        let store = DocumentStore::with_decoder(Recorder::acknowledging(), Decoder::strict());
        let notes = store.collection::<Note>("notes");

        let err = notes.select_all().await.unwrap_err();

        assert!(matches!(err, DocumentStoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_the_store() {
        let store = DocumentStore::new(Recorder::acknowledging());
        let token = CancellationToken::new();
        let notes = store
            .collection::<Note>("notes")
            .with_cancellation(token.clone());

        token.cancel();
        let err = notes.delete_many(Filter::all()).await.unwrap_err();

        assert!(matches!(err, DocumentStoreError::Cancelled(_)));
        assert!(store.backend().calls().is_empty());
    }

    /// Never answers `find`; flags when the call starts and when its future is dropped.
    #[derive(Debug, Default)]
    struct Stalled {
        started: AtomicBool,
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StoreBackend for Stalled {
        async fn find(&self, _collection: &str, _query: Query) -> DocumentStoreResult<Vec<Document>> {
            let _flag = DropFlag(self.dropped.clone());
            self.started.store(true, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(Vec::new())
        }

        async fn insert_one(&self, _collection: &str, _document: Document) -> DocumentStoreResult<InsertOneResult> {
            Ok(InsertOneResult { acknowledged: false, inserted_id: Bson::Null })
        }

        async fn insert_many(
            &self,
            _collection: &str,
            _documents: Vec<Document>,
            _options: InsertManyOptions,
        ) -> DocumentStoreResult<InsertManyResult> {
            Ok(InsertManyResult::default())
        }

        async fn update_one(
            &self,
            _collection: &str,
            _filter: &Expr,
            _update: Update,
            _options: UpdateOptions,
        ) -> DocumentStoreResult<UpdateResult> {
            Ok(UpdateResult::default())
        }

        async fn bulk_write(
            &self,
            _collection: &str,
            _models: Vec<ReplaceOneModel>,
            _options: BulkWriteOptions,
        ) -> DocumentStoreResult<BulkWriteResult> {
            Ok(BulkWriteResult::default())
        }

        async fn delete_one(&self, _collection: &str, _filter: &Expr) -> DocumentStoreResult<DeleteResult> {
            Ok(DeleteResult::default())
        }

        async fn delete_many(&self, _collection: &str, _filter: &Expr) -> DocumentStoreResult<DeleteResult> {
            Ok(DeleteResult::default())
        }
    }

    #[tokio::test]
    async fn cancelling_mid_flight_abandons_the_store_call() {
        let store = DocumentStore::new(Stalled::default());
        let token = CancellationToken::new();
        let notes = store
            .collection::<Note>("notes")
            .with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let err = notes.select_all().await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, DocumentStoreError::Cancelled(_)));
        assert!(store.backend().started.load(Ordering::SeqCst));
        assert!(store.backend().dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn with_type_keeps_the_collection_name() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Raw {
            #[serde(rename = "_id")]
            id: i32,
        }

        impl Entity for Raw {
            type Id = i32;

            fn id(&self) -> &i32 {
                &self.id
            }
        }

        let store = DocumentStore::new(Recorder::acknowledging());
        let raw = store.collection::<Note>("notes").with_type::<Raw>();

        assert_eq!(raw.name(), "notes");
        assert_eq!(raw.select_all().await.unwrap()[0].id, 1);
    }
}
