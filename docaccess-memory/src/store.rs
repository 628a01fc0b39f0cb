//! In-memory storage implementation of the store contract.
//!
//! Collections are vectors of BSON documents kept in insertion order behind a single
//! async-aware read-write lock. Every write takes the lock once, so each operation is
//! atomic with respect to concurrent callers; batch operations are atomic as a whole, which
//! is stronger than what a networked store guarantees.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};

use docaccess_core::{
    backend::{
        BulkWriteOptions, BulkWriteResult, DeleteResult, InsertManyOptions, InsertManyResult, InsertOneResult,
        ReplaceOneModel, StoreBackend, StoreBackendBuilder, UpdateOptions, UpdateResult,
    },
    config::{StoreConfig, validate_database_name},
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, Query, SortDirection},
    update::Update,
};

use crate::evaluator::{DocumentEvaluator, compare, lookup, values_equal};

type StoreMap = HashMap<String, Vec<Document>>;

/// Name used when no database name is given.
pub const DEFAULT_DATABASE: &str = "memory";

/// Thread-safe in-memory document store.
///
/// `InMemoryStore` is cloneable; clones share the same underlying data, so a test can keep
/// one clone to inspect what the code under test wrote through another.
///
/// # Performance
///
/// Every query scans the whole collection. There are no indexes beyond the implicit
/// uniqueness of `_id`.
///
/// # Example
///
/// ```ignore
/// use docaccess_memory::InMemoryStore;
/// use docaccess::{store::DocumentStore, query::Filter};
///
/// let store = DocumentStore::new(InMemoryStore::new());
/// let users = store.collection::<User>("users");
/// users.insert_one(&user).await?;
/// assert!(users.find_one(Filter::eq("_id", user.id)).await?.is_some());
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    database: String,
    collections: Arc<RwLock<StoreMap>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store named [`DEFAULT_DATABASE`].
    pub fn new() -> Self {
        Self::named(DEFAULT_DATABASE)
    }

    fn named(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collections: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore` with custom options.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Returns the logical database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the number of documents in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let documents = match collections.get(collection) {
            Some(documents) => documents,
            None => return Ok(vec![]),
        };

        let mut matched = match &query.filter {
            Some(filter) => DocumentEvaluator::filter_documents(documents, filter)?,
            None => documents.clone(),
        };

        if let Some(sort) = &query.sort {
            // Stable sort keeps natural order among equal keys.
            matched.sort_by(|a, b| {
                let ordering = compare(lookup(a, &sort.field), lookup(b, &sort.field));
                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        Ok(matched
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<InsertOneResult> {
        let mut collections = self.collections.write().await;
        let documents = collections
            .entry(collection.to_string())
            .or_default();

        let inserted_id = insert(documents, collection, document)?;

        Ok(InsertOneResult { acknowledged: true, inserted_id })
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        options: InsertManyOptions,
    ) -> DocumentStoreResult<InsertManyResult> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .entry(collection.to_string())
            .or_default();

        let mut inserted_count = 0;
        let mut first_error = None;

        for document in documents {
            match insert(stored, collection, document) {
                Ok(_) => inserted_count += 1,
                Err(err) if options.ordered => return Err(err),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(InsertManyResult { acknowledged: true, inserted_count }),
        }
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Expr,
        update: Update,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        let mut collections = self.collections.write().await;

        if !options.upsert && !collections.contains_key(collection) {
            return Ok(UpdateResult { acknowledged: true, ..Default::default() });
        }

        let documents = collections
            .entry(collection.to_string())
            .or_default();

        update_first(documents, collection, filter, update, options.upsert)
    }

    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<ReplaceOneModel>,
        options: BulkWriteOptions,
    ) -> DocumentStoreResult<BulkWriteResult> {
        let mut collections = self.collections.write().await;
        let documents = collections
            .entry(collection.to_string())
            .or_default();

        let mut result = BulkWriteResult { acknowledged: true, ..Default::default() };
        let mut first_error = None;

        for model in models {
            match update_first(
                documents,
                collection,
                &model.filter,
                Update::Replace(model.replacement),
                model.upsert,
            ) {
                Ok(outcome) => {
                    result.matched_count += outcome.matched_count;
                    result.modified_count += outcome.modified_count;
                    result.upserted_count += u64::from(outcome.upserted_id.is_some());
                }
                Err(err) if options.ordered => return Err(err),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(result),
        }
    }

    async fn delete_one(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<DeleteResult> {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(DeleteResult { acknowledged: true, deleted_count: 0 });
        };

        let deleted_count = match position(documents, filter)? {
            Some(index) => {
                documents.remove(index);
                1
            }
            None => 0,
        };

        Ok(DeleteResult { acknowledged: true, deleted_count })
    }

    async fn delete_many(&self, collection: &str, filter: &Expr) -> DocumentStoreResult<DeleteResult> {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(DeleteResult { acknowledged: true, deleted_count: 0 });
        };

        let keep = documents
            .iter()
            .map(|document| DocumentEvaluator::matches(document, filter).map(|matched| !matched))
            .collect::<DocumentStoreResult<Vec<_>>>()?;
        let before = documents.len();

        let mut flags = keep.into_iter();
        documents.retain(|_| flags.next().unwrap_or(true));

        Ok(DeleteResult {
            acknowledged: true,
            deleted_count: (before - documents.len()) as u64,
        })
    }
}

fn position(documents: &[Document], filter: &Expr) -> DocumentStoreResult<Option<usize>> {
    for (index, document) in documents.iter().enumerate() {
        if DocumentEvaluator::matches(document, filter)? {
            return Ok(Some(index));
        }
    }

    Ok(None)
}

/// Appends `document`, assigning an `_id` if it has none, and returns the identity.
fn insert(documents: &mut Vec<Document>, collection: &str, mut document: Document) -> DocumentStoreResult<Bson> {
    let id = match document.get(ID_FIELD) {
        Some(id) => id.clone(),
        None => {
            let id = Bson::ObjectId(ObjectId::new());
            document.insert(ID_FIELD, id.clone());
            id
        }
    };

    let taken = documents
        .iter()
        .any(|existing| existing.get(ID_FIELD).is_some_and(|existing| values_equal(existing, &id)));
    if taken {
        return Err(DocumentStoreError::DocumentAlreadyExists(id.to_string(), collection.to_string()));
    }

    documents.push(document);
    Ok(id)
}

/// Applies `update` to the first match, or inserts a seeded document when upserting.
fn update_first(
    documents: &mut Vec<Document>,
    collection: &str,
    filter: &Expr,
    update: Update,
    upsert: bool,
) -> DocumentStoreResult<UpdateResult> {
    match position(documents, filter)? {
        Some(index) => {
            let mut updated = documents[index].clone();
            apply(&mut updated, update)?;

            let modified_count = u64::from(updated != documents[index]);
            documents[index] = updated;

            Ok(UpdateResult {
                acknowledged: true,
                matched_count: 1,
                modified_count,
                upserted_id: None,
            })
        }
        None if upsert => {
            let mut seeded = seed(filter);
            apply(&mut seeded, update)?;
            let upserted_id = insert(documents, collection, seeded)?;

            Ok(UpdateResult {
                acknowledged: true,
                upserted_id: Some(upserted_id),
                ..Default::default()
            })
        }
        None => Ok(UpdateResult { acknowledged: true, ..Default::default() }),
    }
}

fn apply(document: &mut Document, update: Update) -> DocumentStoreResult<()> {
    match update {
        Update::Replace(mut replacement) => {
            let id = match (document.get(ID_FIELD), replacement.remove(ID_FIELD)) {
                (Some(current), Some(new)) if !values_equal(current, &new) => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "Replacement would change {} from {} to {}",
                        ID_FIELD, current, new
                    )));
                }
                (Some(current), _) => Some(current.clone()),
                (None, new) => new,
            };

            let mut replaced = Document::new();
            if let Some(id) = id {
                replaced.insert(ID_FIELD, id);
            }
            for (key, value) in replacement {
                replaced.insert(key, value);
            }
            *document = replaced;
        }
        Update::Push { field, value } => {
            array_at(document, &field)?.push(value);
        }
        Update::AddToSet { field, value } => {
            let items = array_at(document, &field)?;
            if !items.iter().any(|item| values_equal(item, &value)) {
                items.push(value);
            }
        }
    }

    Ok(())
}

/// Returns the array at `path`, creating it (and missing parents) when absent.
///
/// Numeric segments index into arrays, so `items.0.tags` reaches the `tags` array of the
/// first element of `items`.
fn array_at<'d>(document: &'d mut Document, path: &str) -> DocumentStoreResult<&'d mut Vec<Bson>> {
    let (head, rest) = split_path(path);

    if !document.contains_key(head) {
        let empty = match rest {
            Some(_) => Bson::Document(Document::new()),
            None => Bson::Array(Vec::new()),
        };
        document.insert(head, empty);
    }

    match document.get_mut(head) {
        Some(value) => array_in(value, path, rest),
        None => Err(DocumentStoreError::InvalidDocument(format!("Field '{}' is missing", path))),
    }
}

fn array_in<'d>(value: &'d mut Bson, path: &str, rest: Option<&str>) -> DocumentStoreResult<&'d mut Vec<Bson>> {
    match (value, rest) {
        (Bson::Array(items), None) => Ok(items),
        (Bson::Document(inner), Some(rest)) => array_at(inner, rest),
        (Bson::Array(items), Some(rest)) => {
            let (segment, rest) = split_path(rest);
            let len = items.len();
            match segment.parse::<usize>().ok().and_then(|index| items.get_mut(index)) {
                Some(item) => array_in(item, path, rest),
                None => Err(DocumentStoreError::InvalidDocument(format!(
                    "Cannot append to '{}': '{}' is not an index into an array of {} elements",
                    path, segment, len
                ))),
            }
        }
        (other, _) => Err(DocumentStoreError::InvalidDocument(format!(
            "Cannot append to '{}': found {:?} where {} was expected",
            path,
            other.element_type(),
            if rest.is_some() { "a document or an array" } else { "an array" }
        ))),
    }
}

fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

/// Builds the starting document of an upsert from the filter's top-level equalities.
fn seed(filter: &Expr) -> Document {
    let mut document = Document::new();
    collect_equalities(filter, &mut document);
    document
}

fn collect_equalities(filter: &Expr, document: &mut Document) {
    match filter {
        Expr::Field { field, op: FieldOp::Eq, value } if !field.contains('.') => {
            document.insert(field.clone(), value.clone());
        }
        Expr::And(exprs) => exprs
            .iter()
            .for_each(|expr| collect_equalities(expr, document)),
        _ => {}
    }
}

/// Builder for [`InMemoryStore`].
#[derive(Debug, Clone)]
pub struct InMemoryStoreBuilder {
    database: String,
}

impl Default for InMemoryStoreBuilder {
    fn default() -> Self {
        Self { database: DEFAULT_DATABASE.to_string() }
    }
}

impl InMemoryStoreBuilder {
    /// Sets the logical database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Takes the database name from a validated configuration.
    ///
    /// The connection string is checked for well-formedness but otherwise unused.
    pub fn from_config(config: &StoreConfig) -> DocumentStoreResult<Self> {
        config.validate()?;

        Ok(Self::default().database(config.database.clone()))
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        validate_database_name(&self.database)?;
        tracing::info!(database = %self.database, "Opened in-memory document store");

        Ok(InMemoryStore::named(self.database))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docaccess_core::query::Filter;

    #[tokio::test]
    async fn missing_ids_are_generated() {
        let store = InMemoryStore::new();

        let result = store.insert_one("items", doc! { "name": "a" }).await.unwrap();

        assert!(matches!(result.inserted_id, Bson::ObjectId(_)));
        assert_eq!(store.count("items").await, 1);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = InMemoryStore::new();
        store.insert_one("items", doc! { "_id": 1 }).await.unwrap();

        let err = store
            .insert_one("items", doc! { "_id": 1_i64 })
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::DocumentAlreadyExists(_, collection) if collection == "items"));
    }

    #[tokio::test]
    async fn neighbouring_large_ids_are_distinct() {
        let store = InMemoryStore::new();
        let low = 1_i64 << 53;

        store.insert_one("items", doc! { "_id": low, "v": "low" }).await.unwrap();
        store.insert_one("items", doc! { "_id": low + 1, "v": "high" }).await.unwrap();
        let found = store
            .find("items", Query::filtered(Filter::eq("_id", low + 1)))
            .await
            .unwrap();
        let deleted = store
            .delete_one("items", &Filter::eq("_id", low))
            .await
            .unwrap();

        assert_eq!(found, vec![doc! { "_id": low + 1, "v": "high" }]);
        assert_eq!(deleted.deleted_count, 1);
        assert_eq!(
            store.find("items", Query::new()).await.unwrap(),
            vec![doc! { "_id": low + 1, "v": "high" }]
        );
    }

    #[tokio::test]
    async fn ordered_insert_stops_at_first_failure() {
        let store = InMemoryStore::new();
        let documents = vec![doc! { "_id": 1 }, doc! { "_id": 1 }, doc! { "_id": 2 }];

        let result = store
            .insert_many("items", documents, InsertManyOptions { ordered: true })
            .await;

        assert!(result.is_err());
        assert_eq!(store.count("items").await, 1);
    }

    #[tokio::test]
    async fn unordered_insert_attempts_everything() {
        let store = InMemoryStore::new();
        let documents = vec![doc! { "_id": 1 }, doc! { "_id": 1 }, doc! { "_id": 2 }];

        let result = store
            .insert_many("items", documents, InsertManyOptions { ordered: false })
            .await;

        assert!(result.is_err());
        assert_eq!(store.count("items").await, 2);
    }

    #[tokio::test]
    async fn replacement_keeps_identity() {
        let store = InMemoryStore::new();
        store.insert_one("items", doc! { "_id": 1, "v": 1 }).await.unwrap();

        let result = store
            .update_one(
                "items",
                &Filter::eq("_id", 1),
                Update::replace(doc! { "v": 2 }),
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        let stored = store.find("items", Query::new()).await.unwrap();

        assert_eq!(result.modified_count, 1);
        assert_eq!(stored, vec![doc! { "_id": 1, "v": 2 }]);
    }

    #[tokio::test]
    async fn replacement_cannot_change_identity() {
        let store = InMemoryStore::new();
        store.insert_one("items", doc! { "_id": 1 }).await.unwrap();

        let err = store
            .update_one(
                "items",
                &Filter::eq("_id", 1),
                Update::replace(doc! { "_id": 2 }),
                UpdateOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn upsert_seeds_from_filter_equalities() {
        let store = InMemoryStore::new();

        let result = store
            .update_one(
                "items",
                &Filter::and([Filter::eq("_id", 7), Filter::gt("v", 0)]),
                Update::push("tags", "x"),
                UpdateOptions { upsert: true },
            )
            .await
            .unwrap();
        let stored = store.find("items", Query::new()).await.unwrap();

        assert_eq!(result.upserted_id, Some(Bson::Int32(7)));
        assert_eq!(stored, vec![doc! { "_id": 7, "tags": ["x"] }]);
    }

    #[tokio::test]
    async fn push_into_non_array_fails() {
        let store = InMemoryStore::new();
        store.insert_one("items", doc! { "_id": 1, "tags": "x" }).await.unwrap();

        let result = store
            .update_one("items", &Filter::eq("_id", 1), Update::push("tags", "y"), UpdateOptions::default())
            .await;

        assert!(matches!(result, Err(DocumentStoreError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn push_creates_nested_arrays() {
        let store = InMemoryStore::new();
        store.insert_one("items", doc! { "_id": 1 }).await.unwrap();

        store
            .update_one("items", &Filter::eq("_id", 1), Update::push("meta.tags", "y"), UpdateOptions::default())
            .await
            .unwrap();
        let stored = store.find("items", Query::new()).await.unwrap();

        assert_eq!(stored, vec![doc! { "_id": 1, "meta": { "tags": ["y"] } }]);
    }

    #[tokio::test]
    async fn push_follows_array_indexes() {
        let store = InMemoryStore::new();
        store
            .insert_one("items", doc! { "_id": 1, "lines": [{ "tags": [] }, { "tags": ["x"] }] })
            .await
            .unwrap();

        store
            .update_one("items", &Filter::eq("_id", 1), Update::push("lines.1.tags", "y"), UpdateOptions::default())
            .await
            .unwrap();
        let stored = store.find("items", Query::new()).await.unwrap();

        assert_eq!(stored, vec![doc! { "_id": 1, "lines": [{ "tags": [] }, { "tags": ["x", "y"] }] }]);

        let result = store
            .update_one("items", &Filter::eq("_id", 1), Update::push("lines.5.tags", "z"), UpdateOptions::default())
            .await;

        assert!(matches!(result, Err(DocumentStoreError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn updates_on_missing_collections_do_not_create_them() {
        let store = InMemoryStore::new();

        let result = store
            .update_one("ghost", &Filter::all(), Update::push("tags", 1), UpdateOptions::default())
            .await
            .unwrap();

        assert_eq!(result.matched_count, 0);
        assert!(!store.collections.read().await.contains_key("ghost"));
    }

    #[tokio::test]
    async fn unordered_bulk_write_reports_first_error_after_attempting_all() {
        let store = InMemoryStore::new();
        store.insert_one("items", doc! { "_id": 1, "v": 0 }).await.unwrap();

        let models = vec![
            ReplaceOneModel { filter: Filter::eq("v", 0), replacement: doc! { "_id": 9 }, upsert: true },
            ReplaceOneModel { filter: Filter::eq("_id", 2), replacement: doc! { "_id": 2 }, upsert: true },
        ];
        let result = store
            .bulk_write("items", models, BulkWriteOptions::default())
            .await;

        assert!(matches!(result, Err(DocumentStoreError::InvalidDocument(_))));
        assert_eq!(store.count("items").await, 2);
    }

    #[tokio::test]
    async fn sort_offset_and_limit() {
        let store = InMemoryStore::new();
        for (id, rank) in [(1, 3), (2, 1), (3, 2)] {
            store.insert_one("items", doc! { "_id": id, "rank": rank }).await.unwrap();
        }

        let query = Query::builder()
            .sort("rank", SortDirection::Desc)
            .offset(1)
            .limit(1)
            .build();
        let found = store.find("items", query).await.unwrap();

        assert_eq!(found, vec![doc! { "_id": 3, "rank": 2 }]);
    }

    #[tokio::test]
    async fn builder_validates_database_name() {
        let err = InMemoryStore::builder()
            .database("bad.name")
            .build()
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::Configuration(_)));
    }

    #[tokio::test]
    async fn builder_reads_database_from_config() {
        let config = StoreConfig::new("memory://local", "inventory");

        let store = InMemoryStoreBuilder::from_config(&config)
            .unwrap()
            .build()
            .await
            .unwrap();

        assert_eq!(store.database(), "inventory");
    }
}
