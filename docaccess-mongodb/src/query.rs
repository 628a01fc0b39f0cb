//! Translation from docaccess predicates and updates to MongoDB syntax.
//!
//! Filters go through [`QueryVisitor`]; updates map one-to-one onto a replacement document
//! or a single update operator. String operators become anchored, escaped regular
//! expressions so user input is always matched literally.

use bson::{Bson, Document, doc};
use mongodb::options::FindOptions;

use docaccess_core::{
    error::DocumentStoreError,
    query::{Expr, FieldOp, Query, QueryVisitor, SortDirection},
    update::Update,
};

/// Translates query expressions into MongoDB filter documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Translates an optional filter; `None` matches everything.
    pub(crate) fn translate(filter: Option<&Expr>) -> Result<Document, DocumentStoreError> {
        match filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(doc! {}),
        }
    }

    fn translate_all(&mut self, exprs: &[Expr]) -> Result<Vec<Document>, DocumentStoreError> {
        exprs
            .iter()
            .map(|expr| self.visit_expr(expr))
            .collect()
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, clauses: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(match clauses {
            [] => doc! {},
            [single] => self.visit_expr(single)?,
            _ => doc! { "$and": self.translate_all(clauses)? },
        })
    }

    fn visit_or(&mut self, clauses: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(match clauses {
            // Every document has an `_id`, so this never matches.
            [] => doc! { "_id": { "$in": [] } },
            [single] => self.visit_expr(single)?,
            _ => doc! { "$or": self.translate_all(clauses)? },
        })
    }

    fn visit_not(&mut self, inner: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(inner)?],
        })
    }

    fn visit_exists(&mut self, field: &str, present: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": present },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(s) => doc! { "$regex": escape_regex(s) },
                    Bson::Array(values) => doc! { "$all": values },
                    _ => return Err(unsupported("Contains", "a string or array")),
                },
                FieldOp::NotContains => match value {
                    Bson::String(s) => doc! { "$not": { "$regex": escape_regex(s) } },
                    Bson::Array(values) => doc! { "$not": { "$all": values } },
                    _ => return Err(unsupported("NotContains", "a string or array")),
                },
                FieldOp::StartsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("^{}", escape_regex(s)) },
                    _ => return Err(unsupported("StartsWith", "a string")),
                },
                FieldOp::EndsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("{}$", escape_regex(s)) },
                    _ => return Err(unsupported("EndsWith", "a string")),
                },
                FieldOp::AnyOf => match value {
                    Bson::Array(values) => doc! { "$in": values },
                    _ => return Err(unsupported("AnyOf", "an array")),
                },
                FieldOp::NoneOf => match value {
                    Bson::Array(values) => doc! { "$nin": values },
                    _ => return Err(unsupported("NoneOf", "an array")),
                },
            }
        })
    }
}

fn unsupported(op: &str, expected: &str) -> DocumentStoreError {
    DocumentStoreError::Translation(format!("{} operator requires {} value", op, expected))
}

/// Escapes regular expression metacharacters.
pub(crate) fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());

    for c in input.chars() {
        if matches!(
            c,
            '\\' | '^' | '$' | '.' | '|' | '?' | '*' | '+' | '(' | ')' | '[' | ']' | '{' | '}'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

/// Builds driver find options from the sort, offset and limit of `query`.
pub(crate) fn find_options(query: &Query) -> FindOptions {
    let mut options = FindOptions::default();

    if let Some(limit) = query.limit {
        options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if let Some(skip) = query.offset {
        options.skip = Some(skip as u64);
    }
    if let Some(sort) = &query.sort {
        options.sort = Some(doc! {
            sort.field.clone(): match sort.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            }
        });
    }

    options
}

/// The MongoDB form of an [`Update`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MongoUpdate {
    /// Issue a `replaceOne` with this document.
    Replace(Document),
    /// Issue an `updateOne` with this operator document.
    Modify(Document),
}

impl From<Update> for MongoUpdate {
    fn from(update: Update) -> Self {
        match update {
            Update::Replace(document) => MongoUpdate::Replace(document),
            Update::Push { field, value } => MongoUpdate::Modify(doc! { "$push": { field: value } }),
            Update::AddToSet { field, value } => MongoUpdate::Modify(doc! { "$addToSet": { field: value } }),
        }
    }
}
