//! Convenient re-exports of commonly used types from docaccess.
//!
//! ```ignore
//! use docaccess::prelude::*;
//! ```

pub use docaccess_core::{
    backend::{
        BulkWriteOptions, DynStoreBackend, InsertManyOptions, StoreBackend, StoreBackendBuilder, UpdateOptions,
    },
    blocking::{BlockingCollection, BlockingDocumentStore},
    collection::CollectionRef,
    config::StoreConfig,
    document::{Decoder, DocumentExt, Entity, ID_FIELD, UnknownFields},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    store::{DocumentStore, DynDocumentStore},
    update::Update,
};

pub use tokio_util::sync::CancellationToken;
