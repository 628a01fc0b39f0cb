//! Predicate evaluation for in-memory document filtering.
//!
//! This module evaluates [`Expr`] trees directly against BSON documents. Semantics follow
//! the document-database conventions the MongoDB backend translates to: dotted paths reach
//! into nested documents, equality on an array field matches any element, and negative
//! operators (`Ne`, `NotContains`, `NoneOf`) match documents where the field is absent.

use bson::{Bson, DateTime, Document};
use std::{cmp::Ordering, collections::HashMap};

use docaccess_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor},
};

/// Borrowed, comparable view of a BSON value.
///
/// `Int32` and `Int64` share the exact [`Comparable::Int`] form; only a comparison against a
/// `Double` goes through `f64`, so `Int32(1)`, `Int64(1)` and `Double(1.0)` still compare
/// equal while large integer identities stay distinct. Types without a natural ordering
/// fall back to [`Comparable::Other`], which only supports equality.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Int(i64::from(*value)),
            Bson::Int64(value) => Comparable::Int(*value),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(array) => Comparable::Array(array.iter().map(Comparable::from).collect()),
            Bson::Document(document) => Comparable::Map(
                document
                    .iter()
                    .map(|(key, value)| (key.as_str(), Comparable::from(value)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl Comparable<'_> {
    /// Cross-type ordering rank, lowest first.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Int(_) | Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Other(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Int(a), Comparable::Int(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::Int(a), Comparable::Number(b)) | (Comparable::Number(b), Comparable::Int(a)) => *a as f64 == *b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Int(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Number(b)) => (*a as f64).partial_cmp(b),
            (Comparable::Number(a), Comparable::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Returns `true` if two BSON values are equal under numeric normalization.
pub(crate) fn values_equal(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Total ordering used for sorting; missing values sort first.
pub(crate) fn compare(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let left = left.map(Comparable::from).unwrap_or(Comparable::Null);
    let right = right.map(Comparable::from).unwrap_or(Comparable::Null);

    left.partial_cmp(&right)
        .unwrap_or_else(|| left.rank().cmp(&right.rank()))
}

/// Resolves a dotted path inside `document`.
///
/// Numeric segments index into arrays.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Returns `true` if `document` matches `expr`.
    pub fn matches(document: &Document, expr: &Expr) -> DocumentStoreResult<bool> {
        DocumentEvaluator::new(document).evaluate(expr)
    }

    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        expr: &Expr,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if Self::matches(document, expr)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }
}

fn equals(field_value: &Bson, value: &Bson) -> bool {
    let left = Comparable::from(field_value);
    let right = Comparable::from(value);

    left == right || matches!(&left, Comparable::Array(items) if items.contains(&right))
}

fn contains(field_value: &Bson, value: &Bson) -> bool {
    match (field_value, value) {
        (Bson::String(left), Bson::String(right)) => left.contains(right.as_str()),
        (Bson::Array(items), Bson::Array(values)) => values
            .iter()
            .all(|value| items.iter().any(|item| values_equal(item, value))),
        (Bson::Array(items), value) => items.iter().any(|item| values_equal(item, value)),
        _ => false,
    }
}

fn any_of(field_value: &Bson, values: &Bson) -> bool {
    match values {
        Bson::Array(values) => values.iter().any(|value| equals(field_value, value)),
        value => equals(field_value, value),
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, clauses: &[Expr]) -> Result<Self::Output, Self::Error> {
        for clause in clauses {
            if !self.visit_expr(clause)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, clauses: &[Expr]) -> Result<Self::Output, Self::Error> {
        for clause in clauses {
            if self.visit_expr(clause)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, inner: &Expr) -> Result<Self::Output, Self::Error> {
        self.visit_expr(inner).map(|matched| !matched)
    }

    fn visit_exists(&mut self, field: &str, present: bool) -> Result<Self::Output, Self::Error> {
        Ok(lookup(self.document, field).is_some() == present)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let Some(field_value) = lookup(self.document, field) else {
            return Ok(matches!(op, FieldOp::Ne | FieldOp::NotContains | FieldOp::NoneOf));
        };

        Ok(match op {
            FieldOp::Eq => equals(field_value, value),
            FieldOp::Ne => !equals(field_value, value),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                match Comparable::from(field_value).partial_cmp(&Comparable::from(value)) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                }
            }
            FieldOp::Contains => contains(field_value, value),
            FieldOp::NotContains => !contains(field_value, value),
            FieldOp::StartsWith => match (field_value, value) {
                (Bson::String(left), Bson::String(right)) => left.starts_with(right.as_str()),
                _ => false,
            },
            FieldOp::EndsWith => match (field_value, value) {
                (Bson::String(left), Bson::String(right)) => left.ends_with(right.as_str()),
                _ => false,
            },
            FieldOp::AnyOf => any_of(field_value, value),
            FieldOp::NoneOf => !any_of(field_value, value),
        })
    }
}
