//! In-memory document store for docaccess.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend`
//! contract. It honours the same semantics as the MongoDB backend (identity uniqueness,
//! ordered and unordered batches, upserts, array operators) and is the conforming
//! substitute store used by tests and local development.
//!
//! # Quick Start
//!
//! ```ignore
//! use docaccess::{store::DocumentStore, memory::InMemoryStore, query::Filter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::connect(InMemoryStore::builder().database("app")).await?;
//!     let users = store.collection::<User>("users");
//!
//!     users.insert_one(&User { id: 1, name: "Alice".to_string() }).await?;
//!     assert!(users.find_one(Filter::eq("_id", 1)).await?.is_some());
//!
//!     Ok(())
//! }
//! ```

mod evaluator;
pub mod store;

pub use store::{DEFAULT_DATABASE, InMemoryStore, InMemoryStoreBuilder};
