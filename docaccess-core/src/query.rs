//! Predicate and query construction for document stores.
//!
//! Predicates are plain values built from combinators rather than host-language closures,
//! so only filters the store can express are constructible. Each backend translates an
//! [`Expr`] into its native representation through the [`QueryVisitor`] trait.
//!
//! # Query Building
//!
//! ```ignore
//! use docaccess::query::{Query, Filter, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("name", "Alice"))
//!     .limit(10)
//!     .sort("created_at", SortDirection::Desc)
//!     .build();
//! ```
//!
//! # Filter Expression API
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - String: `starts_with`, `ends_with`, `contains`, `not_contains`
//! - Existence: `exists`, `not_exists`
//! - Array: `any_of`, `none_of`
//! - Logical: `and`, `or`, plus [`Expr::not`]
//! - Everything: `all`

use bson::Bson;

use crate::error::{DocumentStoreError, DocumentStoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Single-field ordering applied before offset and limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// How a [`Expr::Field`] node compares the stored value with its operand.
///
/// The string operators match literally and case-sensitively. `Contains` and
/// `NotContains` also accept an array operand, meaning "holds every element".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    /// Operand is an array; the stored value equals one of its elements.
    AnyOf,
    /// Operand is an array; the stored value equals none of its elements.
    NoneOf,
}

/// A predicate over documents.
///
/// `And(vec![])` is the match-everything predicate and `Or(vec![])` matches nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    /// `true` tests presence, `false` absence.
    Exists(String, bool),
    Field {
        /// Dotted paths address nested documents and array positions.
        field: String,
        op: FieldOp,
        value: Bson,
    },
}

impl Expr {
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Conjunction with `other`, extending an existing `And` in place.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut clauses) => {
                clauses.push(other);
                Expr::And(clauses)
            }
            lhs => Expr::And(vec![lhs, other]),
        }
    }

    /// Disjunction with `other`, extending an existing `Or` in place.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut clauses) => {
                clauses.push(other);
                Expr::Or(clauses)
            }
            lhs => Expr::Or(vec![lhs, other]),
        }
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Returns `true` if this expression trivially matches every document.
    pub fn matches_all(&self) -> bool {
        matches!(self, Expr::And(clauses) if clauses.iter().all(Expr::matches_all))
    }

    /// Checks that this expression can be translated by a store.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Translation`] describing the first offending node.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        ExprValidator.visit_expr(self)
    }
}

/// What to read: an optional predicate plus ordering and paging.
///
/// `filter: None` and `Some(Filter::all())` are equivalent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Expr>,
    pub limit: Option<usize>,
    /// Documents skipped after sorting.
    pub offset: Option<usize>,
    pub sort: Option<Sort>,
}

impl Query {
    /// An unrestricted query.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filtered(filter: Expr) -> Self {
        Query { filter: Some(filter), ..Query::new() }
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }
}

/// Namespace for the predicate combinators.
///
/// ```ignore
/// use docaccess::query::Filter;
///
/// let adults_named_a = Filter::starts_with("name", "a").and(Filter::gte("age", 18));
/// let either = Filter::or([Filter::eq("role", "admin"), Filter::exists("owner")]);
/// ```
pub struct Filter;

macro_rules! field_filters {
    ($($(#[$doc:meta])* $name:ident => $op:ident;)+) => {
        $(
            $(#[$doc])*
            pub fn $name(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
                Expr::field(field.into(), FieldOp::$op, value.into())
            }
        )+
    };
}

impl Filter {
    /// The predicate every document satisfies.
    pub fn all() -> Expr {
        Expr::And(Vec::new())
    }

    field_filters! {
        /// Equality. An array field also matches when one of its elements is equal.
        eq => Eq;
        /// Inequality. A missing field counts as unequal.
        ne => Ne;
        gt => Gt;
        gte => Gte;
        lt => Lt;
        lte => Lte;
        starts_with => StartsWith;
        ends_with => EndsWith;
        /// Substring for a string operand, all-elements-present for an array operand.
        contains => Contains;
        not_contains => NotContains;
        /// `value` must be an array.
        any_of => AnyOf;
        /// `value` must be an array. A missing field matches.
        none_of => NoneOf;
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// Every clause must hold; no clauses means every document.
    pub fn and(clauses: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(clauses.into_iter().collect())
    }

    /// At least one clause must hold; no clauses means no document.
    pub fn or(clauses: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(clauses.into_iter().collect())
    }
}

/// Fluent construction of a [`Query`].
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort = Some(Sort { field: field.into(), direction });
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

/// Walks an [`Expr`] tree node by node.
///
/// Backends implement this to produce their native filter form. `visit_expr` dispatches
/// on the node kind and rarely needs overriding.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, clauses: &[Expr]) -> Result<Self::Output, Self::Error>;

    fn visit_or(&mut self, clauses: &[Expr]) -> Result<Self::Output, Self::Error>;

    fn visit_not(&mut self, inner: &Expr) -> Result<Self::Output, Self::Error>;

    fn visit_exists(&mut self, field: &str, present: bool) -> Result<Self::Output, Self::Error>;

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(clauses) => self.visit_and(clauses),
            Expr::Or(clauses) => self.visit_or(clauses),
            Expr::Not(inner) => self.visit_not(inner),
            Expr::Exists(field, present) => self.visit_exists(field, *present),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

/// Rejects expressions no store can translate.
struct ExprValidator;

impl ExprValidator {
    fn check_field_name(field: &str) -> DocumentStoreResult<()> {
        if field.is_empty() {
            return Err(DocumentStoreError::Translation("Field name must not be empty".to_string()));
        }
        if field.starts_with('$') {
            return Err(DocumentStoreError::Translation(format!(
                "Field name '{}' must not start with '$'",
                field
            )));
        }
        if field.split('.').any(str::is_empty) {
            return Err(DocumentStoreError::Translation(format!(
                "Field path '{}' contains an empty segment",
                field
            )));
        }

        Ok(())
    }
}

impl QueryVisitor for ExprValidator {
    type Output = ();
    type Error = DocumentStoreError;

    fn visit_and(&mut self, clauses: &[Expr]) -> Result<Self::Output, Self::Error> {
        clauses
            .iter()
            .try_for_each(|clause| self.visit_expr(clause))
    }

    fn visit_or(&mut self, clauses: &[Expr]) -> Result<Self::Output, Self::Error> {
        self.visit_and(clauses)
    }

    fn visit_not(&mut self, inner: &Expr) -> Result<Self::Output, Self::Error> {
        self.visit_expr(inner)
    }

    fn visit_exists(&mut self, field: &str, _present: bool) -> Result<Self::Output, Self::Error> {
        Self::check_field_name(field)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Self::check_field_name(field)?;

        match (op, value) {
            (FieldOp::Contains | FieldOp::NotContains, Bson::String(_) | Bson::Array(_)) => Ok(()),
            (FieldOp::Contains | FieldOp::NotContains, _) => Err(DocumentStoreError::Translation(format!(
                "{:?} on '{}' requires a string or array value",
                op, field
            ))),
            (FieldOp::StartsWith | FieldOp::EndsWith, Bson::String(_)) => Ok(()),
            (FieldOp::StartsWith | FieldOp::EndsWith, _) => Err(DocumentStoreError::Translation(format!(
                "{:?} on '{}' requires a string value",
                op, field
            ))),
            (FieldOp::AnyOf | FieldOp::NoneOf, Bson::Array(_)) => Ok(()),
            (FieldOp::AnyOf | FieldOp::NoneOf, _) => Err(DocumentStoreError::Translation(format!(
                "{:?} on '{}' requires an array value",
                op, field
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_chains_flatten_into_one_list() {
        let expr = Filter::eq("a", 1)
            .and(Filter::eq("b", 2))
            .and(Filter::eq("c", 3));

        assert!(matches!(expr, Expr::And(ref list) if list.len() == 3));
    }

    #[test]
    fn empty_and_matches_all() {
        assert!(Filter::all().matches_all());
        assert!(Filter::and(vec![Filter::all()]).matches_all());
        assert!(!Filter::eq("a", 1).matches_all());
        assert!(!Filter::or(Vec::new()).matches_all());
    }

    #[test]
    fn validate_accepts_expressible_filters() {
        let expr = Filter::and(vec![
            Filter::eq("name", "a"),
            Filter::starts_with("name", "a"),
            Filter::any_of("tags", vec!["x", "y"]),
            Filter::exists("address.city"),
        ])
        .or(Filter::gt("age", 18).not());

        assert!(expr.validate().is_ok());
    }

    #[test]
    fn validate_rejects_string_ops_on_numbers() {
        let err = Filter::starts_with("name", 5).validate().unwrap_err();

        assert!(matches!(err, DocumentStoreError::Translation(_)));
        assert!(err.is_caller_error());
    }

    #[test]
    fn validate_rejects_nested_bad_field_names() {
        let expr = Filter::and(vec![Filter::eq("ok", 1), Filter::or(vec![Filter::eq("a..b", 1)])]);

        assert!(matches!(expr.validate(), Err(DocumentStoreError::Translation(_))));
        assert!(Filter::eq("", 1).validate().is_err());
        assert!(Filter::eq("$where", 1).validate().is_err());
    }

    #[test]
    fn validate_rejects_scalar_any_of() {
        assert!(Filter::any_of("tags", "x").validate().is_err());
    }

    #[test]
    fn builder_sets_all_parts() {
        let query = Query::builder()
            .filter(Filter::eq("a", 1))
            .limit(5)
            .offset(2)
            .sort("a", SortDirection::Desc)
            .build();

        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, Some(2));
        assert_eq!(query.sort.map(|s| s.direction), Some(SortDirection::Desc));
        assert!(query.filter.is_some());
    }
}
