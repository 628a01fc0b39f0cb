//! MongoDB backend for docaccess.
//!
//! This crate implements the `StoreBackend` contract on top of the official MongoDB driver.
//! Predicates are translated to native filter documents, array updates to `$push` and
//! `$addToSet`, and bulk writes to a sequence of upserting replacements.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docaccess = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! The client is built from a connection string and database name, either passed to the
//! builder directly or taken from a `StoreConfig`. A pre-built `mongodb::Client` can be
//! wrapped with [`MongoDbStore::new`].
//!
//! # Example
//!
//! ```ignore
//! use docaccess::{store::DocumentStore, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::connect(MongoDbStore::builder("mongodb://localhost:27017", "my_database")).await?;
//!     let users = store.collection::<User>("users");
//!
//!     Ok(())
//! }
//! ```

mod query;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
