//! Update descriptors.
//!
//! An [`Update`] names exactly one mutating operator applied to the first document matching
//! a filter. Identity fields are immutable: operators targeting `_id` are rejected before the
//! store is contacted.

use bson::{Bson, Document};

use crate::{
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// A single mutating operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Replace the whole document, keeping its identity.
    Replace(Document),
    /// Append `value` to the array `field`, duplicates allowed.
    Push {
        /// The array field to append to.
        field: String,
        /// The value to append.
        value: Bson,
    },
    /// Append `value` to the array `field` unless an equal value is already present.
    AddToSet {
        /// The array field to append to.
        field: String,
        /// The value to append.
        value: Bson,
    },
}

impl Update {
    /// Creates a whole-document replacement.
    pub fn replace(document: Document) -> Self {
        Update::Replace(document)
    }

    /// Creates an append-to-array update.
    pub fn push(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Update::Push { field: field.into(), value: value.into() }
    }

    /// Creates an add-unique-to-array update.
    pub fn add_to_set(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Update::AddToSet { field: field.into(), value: value.into() }
    }

    /// Returns the targeted field for array operators, `None` for replacements.
    pub fn field(&self) -> Option<&str> {
        match self {
            Update::Replace(_) => None,
            Update::Push { field, .. } | Update::AddToSet { field, .. } => Some(field),
        }
    }

    /// Checks that this update can be expressed by a store and leaves identity untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Translation`] for malformed field names and
    /// [`DocumentStoreError::InvalidDocument`] for updates targeting the identity field.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        match self.field() {
            None => Ok(()),
            Some(field) if field.is_empty() || field.starts_with('$') || field.split('.').any(str::is_empty) => {
                Err(DocumentStoreError::Translation(format!("Cannot update field '{}'", field)))
            }
            Some(field) if field.split('.').next() == Some(ID_FIELD) => Err(DocumentStoreError::InvalidDocument(
                format!("The identity field '{}' is immutable", ID_FIELD),
            )),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn array_operators_expose_their_field() {
        assert_eq!(Update::push("tags", "a").field(), Some("tags"));
        assert_eq!(Update::add_to_set("tags", "a").field(), Some("tags"));
        assert_eq!(Update::replace(doc! {}).field(), None);
    }

    #[test]
    fn identity_field_cannot_be_pushed_to() {
        let err = Update::push(ID_FIELD, 1).validate().unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
        assert!(Update::add_to_set(format!("{}.parts", ID_FIELD), 1).validate().is_err());
        assert!(Update::push("_identity", 1).validate().is_ok());
    }

    #[test]
    fn malformed_field_names_fail_translation() {
        assert!(matches!(
            Update::add_to_set("a..b", 1).validate(),
            Err(DocumentStoreError::Translation(_))
        ));
        assert!(Update::push("$set", 1).validate().is_err());
        assert!(Update::push("nested.tags", 1).validate().is_ok());
    }
}
