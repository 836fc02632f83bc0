//! Dynamically typed SQL values and field identifiers.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, UtcOffset};

/// Source reserved for virtual fields synthesized by [`Record`](crate::Record).
pub const SYSTEM_SOURCE: &str = "sys";

/// Virtual field holding the value of the designated event-time field.
pub const EVENT_TIME_FIELD: &str = "sys.event_time";

/// Virtual field holding the undo (retraction) flag.
pub const UNDO_FIELD: &str = "sys.undo";

// ──────────────────────────────────────────────
// Value
// ──────────────────────────────────────────────

/// A single SQL value.
///
/// Equality is structural, so `Null == Null`. Values serialize with serde so
/// they can be stored as keys and aggregate state in a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Str(String),
    Time(OffsetDateTime),
    Duration(Duration),
    Tuple(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Returns a human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Decimal(_) => "Decimal",
            Value::Str(_) => "Str",
            Value::Time(_) => "Time",
            Value::Duration(_) => "Duration",
            Value::Tuple(_) => "Tuple",
            Value::Object(_) => "Object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<OffsetDateTime> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// The representative of this value's equality class: decimals without
    /// trailing zeros and times in UTC, applied through tuples and objects.
    ///
    /// Values that compare equal have identical canonical forms, so the
    /// canonical form's serialization can stand in for the value as a key.
    pub fn canonical(&self) -> Value {
        match self {
            Value::Decimal(d) => Value::Decimal(d.normalize()),
            Value::Time(t) => Value::Time(t.to_offset(UtcOffset::UTC)),
            Value::Tuple(items) => Value::Tuple(items.iter().map(Value::canonical).collect()),
            Value::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.canonical()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "<null>"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Time(t) => write!(f, "{}", t),
            Value::Duration(d) => write!(f, "{}", d),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Value::Object(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<OffsetDateTime> for Value {
    fn from(t: OffsetDateTime) -> Self {
        Value::Time(t)
    }
}

// ──────────────────────────────────────────────
// Variable names
// ──────────────────────────────────────────────

/// A field identifier of the form `source.name`.
///
/// The source part is empty for undotted names. Names compare and hash by
/// their full text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableName(String);

impl VariableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The `sys.event_time` virtual field.
    pub fn event_time() -> Self {
        Self::new(EVENT_TIME_FIELD)
    }

    /// The `sys.undo` virtual field.
    pub fn undo() -> Self {
        Self::new(UNDO_FIELD)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything before the first dot, or `""` for an undotted name.
    pub fn source(&self) -> &str {
        match self.0.split_once('.') {
            Some((source, _)) => source,
            None => "",
        }
    }

    /// Everything after the first dot, or the whole name.
    pub fn name(&self) -> &str {
        match self.0.split_once('.') {
            Some((_, name)) => name,
            None => &self.0,
        }
    }

    /// Whether this name lives in the reserved `sys` source.
    pub fn is_system(&self) -> bool {
        self.source() == SYSTEM_SOURCE
    }
}

impl fmt::Display for VariableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VariableName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for VariableName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Field name to value bindings, ordered by name.
pub type Variables = BTreeMap<VariableName, Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn variable_name_parts() {
        let dotted = VariableName::new("orders.price");
        assert_eq!(dotted.source(), "orders");
        assert_eq!(dotted.name(), "price");

        let nested = VariableName::new("a.b.c");
        assert_eq!(nested.source(), "a");
        assert_eq!(nested.name(), "b.c");

        let bare = VariableName::new("price");
        assert_eq!(bare.source(), "");
        assert_eq!(bare.name(), "price");
        assert!(!bare.is_system());
        assert!(VariableName::undo().is_system());
    }

    #[test]
    fn null_equals_null() {
        assert_eq!(Value::Null, Value::Null);
        assert_ne!(Value::Null, Value::Bool(false));
    }

    #[test]
    fn display_nested_values() {
        let mut object = BTreeMap::new();
        object.insert("k".to_string(), Value::Tuple(vec![Value::Int(1), "x".into()]));
        assert_eq!(Value::Object(object).to_string(), "{k: (1, 'x')}");
        assert_eq!(Value::Null.to_string(), "<null>");
    }

    #[test]
    fn accessors_reject_other_types() {
        let t = datetime!(2024-01-01 0:00 UTC);
        assert_eq!(Value::Time(t).as_time(), Some(t));
        assert_eq!(Value::Int(3).as_time(), None);
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Str("true".into()).as_bool(), None);
        assert_eq!(Value::Int(3).type_name(), "Int");
    }

    #[test]
    fn equal_values_share_a_canonical_encoding() {
        let pairs = [
            (
                Value::Decimal(Decimal::new(10, 1)),
                Value::Decimal(Decimal::new(100, 2)),
            ),
            (
                Value::Time(datetime!(2024-06-01 12:00 UTC)),
                Value::Time(datetime!(2024-06-01 14:00 +02:00)),
            ),
            (
                Value::Tuple(vec![Value::Decimal(Decimal::new(5, 0)), Value::Int(1)]),
                Value::Tuple(vec![Value::Decimal(Decimal::new(500, 2)), Value::Int(1)]),
            ),
        ];
        for (a, b) in pairs {
            assert_eq!(a, b);
            assert_ne!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());
            assert_eq!(
                serde_json::to_vec(&a.canonical()).unwrap(),
                serde_json::to_vec(&b.canonical()).unwrap()
            );
            assert_eq!(a.canonical(), a);
        }
    }

    #[test]
    fn serde_round_trip_preserves_time() {
        let v = Value::Tuple(vec![
            Value::Time(datetime!(2024-03-01 12:30:00.5 +02:00)),
            Value::Decimal(Decimal::new(1050, 2)),
            Value::Duration(Duration::seconds(90)),
        ]);
        let json = serde_json::to_vec(&v).unwrap();
        let back: Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, v);
    }
}
