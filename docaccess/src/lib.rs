//! Typed data access for document databases.
//!
//! This crate is the entry point of the docaccess workspace. It re-exports the core types
//! and the bundled backends so application code depends on a single crate.
//!
//! # Quick Start
//!
//! ```ignore
//! use docaccess::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     pub id: i32,
//!     pub name: String,
//!     pub roles: Vec<String>,
//! }
//!
//! impl Entity for User {
//!     type Id = i32;
//!
//!     fn id(&self) -> &i32 { &self.id }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::connect(InMemoryStore::builder().database("app")).await?;
//!     let users = store.collection::<User>("users");
//!
//!     users.insert_one(&User { id: 1, name: "Alice".to_string(), roles: vec![] }).await?;
//!     users.add_to_set(Filter::eq("_id", 1), "roles", "admin").await?;
//!
//!     let admins = users.select(Filter::eq("roles", "admin")).await?;
//!     println!("Admins: {:?}", admins);
//!
//!     // Upsert every user, matching each one on its identity
//!     users.bulk_write(User::id_filter, &admins).await?;
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Swapping Backends
//!
//! [`DocumentStore::into_dyn`](store::DocumentStore::into_dyn) erases the backend type, so
//! the same code runs against MongoDB in production and the in-memory store in tests:
//!
//! ```ignore
//! let store: DynDocumentStore = if cfg!(test) {
//!     DocumentStore::new(InMemoryStore::new()).into_dyn()
//! } else {
//!     let config = StoreConfig::load_from("docaccess.toml")?;
//!     DocumentStore::connect_with(MongoDbStoreBuilder::from_config(&config), config.decoder())
//!         .await?
//!         .into_dyn()
//! };
//! ```
//!
//! # Blocking Use
//!
//! ```ignore
//! let store = BlockingDocumentStore::connect(InMemoryStore::builder(), Decoder::lenient())?;
//! let users = store.collection::<User>("users")?;
//! let everyone = users.select_all()?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory store for development and testing
//! - `mongodb` - MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use docaccess_core::{backend, blocking, collection, config, document, error, query, store, update};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend.
pub mod memory {
    pub use docaccess_memory::{DEFAULT_DATABASE, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docaccess_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
