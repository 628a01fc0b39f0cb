//! A typed data-access layer over document databases.
//!
//! This crate is the core of the docaccess project and provides:
//!
//! - **Entities** ([`document`]) - The [`Entity`](document::Entity) trait and the decoder applied on read
//! - **Predicates** ([`query`]) - Filter combinators and structured queries
//! - **Updates** ([`update`]) - Single-operator update descriptors
//! - **Store contract** ([`backend`]) - The trait every document store implements
//! - **Store handle** ([`store`]) - Connection to one logical database, resolving collections by name
//! - **Accessor** ([`collection`]) - Typed CRUD and query operations on one collection
//! - **Blocking variants** ([`blocking`]) - The same surface for synchronous callers
//! - **Configuration** ([`config`]) - Connection settings loaded from files and the environment
//! - **Error handling** ([`error`]) - The error taxonomy and result type
//!
//! # Example
//!
//! ```ignore
//! use docaccess::{document::Entity, query::Filter, store::DocumentStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     pub id: i32,
//!     pub name: String,
//! }
//!
//! impl Entity for User {
//!     type Id = i32;
//!
//!     fn id(&self) -> &i32 {
//!         &self.id
//!     }
//! }
//!
//! let store = DocumentStore::new(backend);
//! let users = store.collection::<User>("users");
//! let user = users.find_one(Filter::eq("_id", 1)).await?;
//! ```

pub mod backend;
pub mod blocking;
pub mod collection;
pub mod config;
pub mod document;
pub mod error;
pub mod query;
pub mod store;
pub mod update;
