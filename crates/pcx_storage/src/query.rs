//! Query shapes understood by storage backends.
//!
//! pcx does not parse query strings or derive queries from method names.
//! Filters are built as [`Predicate`] trees:
//!
//! ```rust
//! use pcx_storage::Predicate;
//! use pcx_value::{Row, Value};
//!
//! let pred = Predicate::field("username").eq("AAA").and(Predicate::field("age").gt(15));
//!
//! let mut row = Row::new();
//! row.insert("username".into(), Value::from("AAA"));
//! row.insert("age".into(), Value::from(20));
//! assert!(pred.matches(&row));
//! ```

use pcx_value::{Row, Value};
use std::cmp::Ordering;
use std::ops::Not;

/// Comparison operator of a [`Predicate::Compare`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// A filter over rows.
///
/// Comparisons only hold between comparable values (see
/// [`Value::compare`]). A missing field or an incomparable value never
/// matches, except for [`Predicate::IsNull`], which matches both a missing
/// field and an explicit null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `field <op> value`.
    Compare {
        /// Field name.
        field: String,
        /// Operator.
        op: CompareOp,
        /// Right-hand operand.
        value: Value,
    },
    /// `field` equals one of `values`, with the same equality as
    /// [`CompareOp::Eq`].
    In {
        /// Field name.
        field: String,
        /// Candidate values.
        values: Vec<Value>,
    },
    /// Text `field` starts with `prefix`.
    StartsWith {
        /// Field name.
        field: String,
        /// Required prefix.
        prefix: String,
    },
    /// `field` is null or missing.
    IsNull {
        /// Field name.
        field: String,
    },
    /// All children hold. An empty conjunction always holds.
    And(Vec<Predicate>),
    /// At least one child holds. An empty disjunction never holds.
    Or(Vec<Predicate>),
    /// The child does not hold.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Starts a predicate on a field.
    pub fn field(name: impl Into<String>) -> FieldPath {
        FieldPath { name: name.into() }
    }

    /// A predicate that matches every row.
    #[must_use]
    pub fn always() -> Self {
        Predicate::And(Vec::new())
    }

    /// Conjunction of all given predicates.
    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::And(predicates.into_iter().collect())
    }

    /// Combines with another predicate using AND.
    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut children) => {
                children.push(other);
                Predicate::And(children)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    /// Combines with another predicate using OR.
    #[must_use]
    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut children) => {
                children.push(other);
                Predicate::Or(children)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }

    /// Negates this predicate.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }

    /// Evaluates the predicate against a row.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::Compare { field, op, value } => row
                .get(field)
                .filter(|v| !v.is_null())
                .and_then(|v| v.compare(value))
                .is_some_and(|ordering| op.holds(ordering)),
            Predicate::In { field, values } => row
                .get(field)
                .filter(|v| !v.is_null())
                .is_some_and(|v| {
                    values
                        .iter()
                        .any(|candidate| v.compare(candidate) == Some(Ordering::Equal))
                }),
            Predicate::StartsWith { field, prefix } => row
                .get(field)
                .and_then(Value::as_text)
                .is_some_and(|text| text.starts_with(prefix.as_str())),
            Predicate::IsNull { field } => row.get(field).map_or(true, Value::is_null),
            Predicate::And(children) => children.iter().all(|p| p.matches(row)),
            Predicate::Or(children) => children.iter().any(|p| p.matches(row)),
            Predicate::Not(inner) => !inner.matches(row),
        }
    }
}

impl Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Self::Output {
        self.negate()
    }
}

/// A field name waiting for its comparison. Created by [`Predicate::field`].
#[derive(Debug, Clone)]
pub struct FieldPath {
    name: String,
}

impl FieldPath {
    fn compare(self, op: CompareOp, value: impl Into<Value>) -> Predicate {
        Predicate::Compare {
            field: self.name,
            op,
            value: value.into(),
        }
    }

    /// `field == value`.
    pub fn eq(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Eq, value)
    }

    /// `field != value`.
    pub fn ne(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Ne, value)
    }

    /// `field < value`.
    pub fn lt(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Lt, value)
    }

    /// `field <= value`.
    pub fn le(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Le, value)
    }

    /// `field > value`.
    pub fn gt(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Gt, value)
    }

    /// `field >= value`.
    pub fn ge(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Ge, value)
    }

    /// `field` equals one of `values`.
    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Predicate {
        Predicate::In {
            field: self.name,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Text `field` starts with `prefix`.
    pub fn starts_with(self, prefix: impl Into<String>) -> Predicate {
        Predicate::StartsWith {
            field: self.name,
            prefix: prefix.into(),
        }
    }

    /// `field` is null or missing.
    #[must_use]
    pub fn is_null(self) -> Predicate {
        Predicate::IsNull { field: self.name }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Smallest first; nulls first.
    #[default]
    Asc,
    /// Largest first; nulls last.
    Desc,
}

/// Ordering of query results by one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// Field to sort by.
    pub field: String,
    /// Direction.
    pub direction: Direction,
}

impl Sort {
    /// Ascending order on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    /// Descending order on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    /// Compares two rows by this sort.
    ///
    /// Missing fields sort as null. The order is total (see
    /// [`Value::sort_cmp`]): NaN sorts after every number.
    #[must_use]
    pub fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        let left = a.get(&self.field).unwrap_or(&Value::Null);
        let right = b.get(&self.field).unwrap_or(&Value::Null);
        let ordering = left.sort_cmp(right);
        match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

/// Offset/limit window over a query result, with optional sort.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Window {
    /// Number of matching rows to skip.
    pub offset: u64,
    /// Maximum number of rows to return; `None` is unbounded.
    pub limit: Option<u64>,
    /// Sort applied before windowing.
    pub sort: Option<Sort>,
}

impl Window {
    /// The unbounded window.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Window of `limit` rows starting at `offset`.
    #[must_use]
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: Some(limit),
            sort: None,
        }
    }

    /// Sets the sort.
    #[must_use]
    pub fn sorted(mut self, sort: Option<Sort>) -> Self {
        self.sort = sort;
        self
    }
}

/// A field change applied by [`crate::StorageBackend::bulk_update`].
#[derive(Debug, Clone, PartialEq)]
pub enum BulkChange {
    /// Overwrite the field.
    Set(Value),
    /// Add to a numeric field; non-numeric fields are left untouched.
    Increment(i64),
}

impl BulkChange {
    /// Computes the new value of a field, or `None` to leave it as is.
    #[must_use]
    pub fn apply(&self, current: Option<&Value>) -> Option<Value> {
        match (self, current) {
            (BulkChange::Set(value), _) => Some(value.clone()),
            (BulkChange::Increment(delta), Some(Value::Integer(i))) => {
                Some(Value::Integer(i.saturating_add(*delta)))
            }
            #[allow(clippy::cast_precision_loss)]
            (BulkChange::Increment(delta), Some(Value::Float(f))) => {
                Some(Value::Float(f + *delta as f64))
            }
            (BulkChange::Increment(_), _) => None,
        }
    }
}
