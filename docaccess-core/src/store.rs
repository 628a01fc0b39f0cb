//! The store handle.
//!
//! A [`DocumentStore`] owns the connection to one logical database and resolves typed
//! collection handles by name. It is the only long-lived object of this layer; collection
//! handles borrow it and are meant to be resolved fresh for each call site.
//!
//! - [`DocumentStore`] - Store bound to a concrete backend type
//! - [`DynDocumentStore`] - Store whose backend is chosen at runtime
//!
//! # Example
//!
//! ```ignore
//! use docaccess::store::DocumentStore;
//! use docaccess::query::Filter;
//!
//! let store = DocumentStore::new(backend);
//! let users = store.collection::<User>("users");
//! let alice = users.find_one(Filter::eq("name", "alice")).await?;
//! ```

use crate::{
    backend::{DynStoreBackend, StoreBackend, StoreBackendBuilder},
    collection::CollectionRef,
    document::{Decoder, Entity},
    error::DocumentStoreResult,
};

/// A handle to one logical database behind a specific backend.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
    decoder: Decoder,
}

/// A store whose backend type has been erased.
///
/// Produced by [`DocumentStore::into_dyn`]; lets a conforming substitute store be swapped in
/// without changing the caller's types.
pub type DynDocumentStore = DocumentStore<Box<dyn DynStoreBackend>>;

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a store over `backend` that ignores unknown fields on read.
    pub fn new(backend: B) -> Self {
        Self::with_decoder(backend, Decoder::default())
    }

    /// Creates a store over `backend` using the given decoder for every read.
    pub fn with_decoder(backend: B, decoder: Decoder) -> Self {
        tracing::debug!(
            unknown_fields = ?decoder.unknown_fields(),
            "Created document store"
        );

        Self { backend, decoder }
    }

    /// Builds a backend and wraps it in a store with the default decoder.
    ///
    /// # Errors
    ///
    /// Returns whatever the builder reports, typically
    /// [`Configuration`](crate::error::DocumentStoreError::Configuration) or
    /// [`Initialization`](crate::error::DocumentStoreError::Initialization).
    pub async fn connect<T>(builder: T) -> DocumentStoreResult<Self>
    where
        T: StoreBackendBuilder<Backend = B>,
    {
        Self::connect_with(builder, Decoder::default()).await
    }

    /// Builds a backend and wraps it in a store with the given decoder.
    pub async fn connect_with<T>(builder: T, decoder: Decoder) -> DocumentStoreResult<Self>
    where
        T: StoreBackendBuilder<Backend = B>,
    {
        let backend = builder.build().await?;
        tracing::info!(
            unknown_fields = ?decoder.unknown_fields(),
            "Connected document store"
        );

        Ok(Self { backend, decoder })
    }

    /// Resolves a handle to the collection `name` holding entities of type `E`.
    ///
    /// Existence is never checked: a collection that does not exist reads as empty and is
    /// created by the first write.
    pub fn collection<E: Entity>(&self, name: &str) -> CollectionRef<'_, B, E> {
        CollectionRef::new(name.to_string(), &self.backend, self.decoder)
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the decoder applied to every read.
    pub fn decoder(&self) -> Decoder {
        self.decoder
    }

    /// Shuts down the store and releases the backend connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to shut down cleanly.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await?;
        tracing::info!("Document store shut down");

        Ok(())
    }
}

impl<B: StoreBackend + 'static> DocumentStore<B> {
    /// Erases the backend type.
    pub fn into_dyn(self) -> DynDocumentStore {
        DocumentStore {
            backend: Box::new(self.backend),
            decoder: self.decoder,
        }
    }
}

impl DynDocumentStore {
    /// Returns the backend as `T` if that is its concrete type.
    pub fn downcast_backend<T: StoreBackend + 'static>(&self) -> Option<&T> {
        DynStoreBackend::as_any(&*self.backend).downcast_ref::<T>()
    }
}
