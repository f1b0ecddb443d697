//! Dynamic field value type.

use crate::key::KeyRef;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// A dynamically typed field value.
///
/// References to other entities are carried as [`Value::Ref`], by key only,
/// so copying a row never copies the graph behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating-point number, compared bit-exact.
    Float(f64),
    /// Text string.
    Text(String),
    /// Reference to another entity.
    Ref(KeyRef),
}

impl Value {
    /// Returns `true` if this is [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the referenced entity, if this is a reference.
    #[must_use]
    pub fn as_ref_key(&self) -> Option<&KeyRef> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Orders two values for predicate evaluation.
    ///
    /// Values of the same variant compare naturally. Integers and floats
    /// compare numerically with each other. References compare only within
    /// the same entity type. Everything else is incomparable (`None`).
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => {
                (!b.is_nan()).then(|| cmp_int_float(*a, *b))
            }
            (Value::Float(a), Value::Integer(b)) => {
                (!a.is_nan()).then(|| cmp_int_float(*b, *a).reverse())
            }
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Ref(a), Value::Ref(b)) if a.entity_type == b.entity_type => {
                Some(a.key.cmp(&b.key))
            }
            _ => None,
        }
    }

    /// Total order used for sorting.
    ///
    /// Agrees with [`compare`](Self::compare) wherever that returns an
    /// ordering. NaN sorts after every other number, references order by
    /// entity type and then key, and values of different kinds order by
    /// [`variant_rank`](Self::variant_rank).
    #[must_use]
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        let rank = self.variant_rank().cmp(&other.variant_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (Value::Ref(a), Value::Ref(b)) => a
                .entity_type
                .cmp(&b.entity_type)
                .then_with(|| a.key.cmp(&b.key)),
            _ => match (self.is_nan(), other.is_nan()) {
                (false, false) => self.compare(other).unwrap_or(Ordering::Equal),
                (a, b) => a.cmp(&b),
            },
        }
    }

    fn is_nan(&self) -> bool {
        matches!(self, Value::Float(f) if f.is_nan())
    }

    /// Rank of the variant, used to give incomparable values a stable order.
    #[must_use]
    pub fn variant_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Ref(_) => 4,
        }
    }
}

/// Exact ordering of an integer against a float that is not NaN.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if f >= TWO_POW_63 {
        return Ordering::Less;
    }
    if f < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    // In range, so the cast is exact.
    let whole_int = whole as i64;
    match i.cmp(&whole_int) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(f - whole)).unwrap_or(Ordering::Equal),
        unequal => unequal,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            _ => false,
        }
    }
}

// Bit-exact float equality makes equality reflexive, including NaN.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Ref(r) => r.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<KeyRef> for Value {
    fn from(v: KeyRef) -> Self {
        Value::Ref(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
