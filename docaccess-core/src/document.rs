//! Core traits and types for entity representation and serialization.
//!
//! This module provides the [`Entity`] trait that every persisted record type implements,
//! the [`DocumentExt`] conversion helpers, and the [`Decoder`] that maps stored documents
//! back into entities according to the store handle's unknown-field policy.

use bson::{
    Bson, Deserializer, Document,
    de::deserialize_from_document,
    ser::serialize_to_document,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Filter},
};

/// Name of the identity field in every stored document.
///
/// Stores treat this field as the unique, immutable key; entities map their identity onto it
/// with `#[serde(rename = "_id")]`.
pub const ID_FIELD: &str = "_id";

/// Trait that every record type handled by the accessor must implement.
///
/// An entity is any serde-serializable type with a designated identity field. The identity
/// may be a scalar (`i32`, `String`, [`bson::Uuid`], ...) or a composite value (a nested
/// [`bson::Document`]); it only needs to convert into [`Bson`] so it can be matched on.
///
/// # Example
///
/// ```ignore
/// use docaccess::document::Entity;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// pub struct User {
///     #[serde(rename = "_id")]
///     pub id: i32,
///     pub name: String,
/// }
///
/// impl Entity for User {
///     type Id = i32;
///
///     fn id(&self) -> &i32 {
///         &self.id
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The identity type of this entity.
    type Id: Into<Bson> + Clone + Send + Sync;

    /// Returns a reference to this entity's identity.
    fn id(&self) -> &Self::Id;

    /// Builds an equality filter matching this entity's identity.
    ///
    /// Handy as the match function for
    /// [`CollectionRef::bulk_write`](crate::collection::CollectionRef::bulk_write).
    fn id_filter(&self) -> Expr {
        Filter::eq(ID_FIELD, self.id().clone())
    }
}

/// Extension trait providing document conversion for entities.
///
/// Automatically implemented for every [`Entity`].
pub trait DocumentExt: Entity {
    /// Converts this entity to a BSON document for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the entity does not serialize to a document.
    fn to_document(&self) -> DocumentStoreResult<Document>;
}

impl<E: Entity> DocumentExt for E {
    fn to_document(&self) -> DocumentStoreResult<Document> {
        Ok(serialize_to_document(self)?)
    }
}

/// What to do with stored fields that the entity type does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownFields {
    /// Drop them silently (forward-compatible schema).
    #[default]
    Ignore,
    /// Fail decoding with a serialization error.
    Reject,
}

/// Decodes stored documents into entities.
///
/// A decoder is chosen once when the store handle is constructed and is passed to every
/// collection handle resolved from it, so the unknown-field policy applies uniformly to all
/// entity types read through that handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decoder {
    unknown_fields: UnknownFields,
}

impl Decoder {
    /// Creates a decoder with the given unknown-field policy.
    pub fn new(unknown_fields: UnknownFields) -> Self {
        Self { unknown_fields }
    }

    /// A decoder that ignores unknown fields.
    pub fn lenient() -> Self {
        Self::new(UnknownFields::Ignore)
    }

    /// A decoder that rejects documents carrying fields the entity does not declare.
    ///
    /// A field counts as declared when deserialization consumes it, so `alias`,
    /// `skip_serializing_if` and `flatten` behave as serde defines them. Nested unknown
    /// fields are reported by their dotted path. The identity field is always tolerated,
    /// since stores assign it on insert.
    pub fn strict() -> Self {
        Self::new(UnknownFields::Reject)
    }

    /// Returns the unknown-field policy of this decoder.
    pub fn unknown_fields(&self) -> UnknownFields {
        self.unknown_fields
    }

    /// Decodes a single stored document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Serialization`] if the document does not match the entity
    /// type, or if it carries unknown fields and this decoder rejects them.
    pub fn decode<E: Entity>(&self, document: Document) -> DocumentStoreResult<E> {
        match self.unknown_fields {
            UnknownFields::Ignore => Ok(deserialize_from_document(document)?),
            UnknownFields::Reject => {
                let mut unknown = None;
                let entity: E = serde_ignored::deserialize(Deserializer::new(Bson::Document(document)), |path| {
                    let path = path.to_string();
                    if unknown.is_none() && path != ID_FIELD {
                        unknown = Some(path);
                    }
                })?;

                match unknown {
                    Some(path) => Err(DocumentStoreError::Serialization(format!(
                        "unknown field `{}` for entity type {}",
                        path,
                        std::any::type_name::<E>()
                    ))),
                    None => Ok(entity),
                }
            }
        }
    }

    /// Decodes a batch of stored documents, failing on the first bad one.
    pub fn decode_all<E: Entity>(&self, documents: Vec<Document>) -> DocumentStoreResult<Vec<E>> {
        documents
            .into_iter()
            .map(|document| self.decode(document))
            .collect()
    }
}
