//! Changelog records.
//!
//! A [`Record`] is an ordered tuple of named values plus metadata: an
//! identifier, an undo (retraction) flag, and optionally the name of the
//! field carrying the record's event time. Two virtual fields,
//! `sys.event_time` and `sys.undo`, expose that metadata through the same
//! lookup path as physical fields.
//!
//! Records are immutable. Metadata reaches a derived record only through
//! [`RecordBuilder::metadata_from`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::value::{Value, VariableName, Variables, EVENT_TIME_FIELD, UNDO_FIELD};

/// Opaque record identifier. Ignored by equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata carried alongside a record's data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: RecordId,
    pub undo: bool,
    pub event_time_field: Option<VariableName>,
}

// ──────────────────────────────────────────────
// Record
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    metadata: Metadata,
    field_names: Vec<VariableName>,
    data: Vec<Value>,
}

impl Record {
    pub fn builder() -> RecordBuilder {
        RecordBuilder::new()
    }

    /// Looks up a field by name.
    ///
    /// `sys.undo` yields the undo flag and `sys.event_time` the value of the
    /// designated event-time field. Any other `sys.*` name and any absent
    /// field yield [`Value::Null`].
    pub fn value(&self, name: &VariableName) -> Value {
        if name.is_system() {
            return match name.as_str() {
                UNDO_FIELD => Value::Bool(self.metadata.undo),
                EVENT_TIME_FIELD => self.event_time(),
                _ => Value::Null,
            };
        }
        self.physical_value(name).cloned().unwrap_or(Value::Null)
    }

    fn physical_value(&self, name: &VariableName) -> Option<&Value> {
        self.field_names
            .iter()
            .position(|f| f == name)
            .map(|i| &self.data[i])
    }

    /// Physical fields in order, then `sys.event_time` if an event-time
    /// field is designated, then `sys.undo` if the record is an undo.
    pub fn fields(&self) -> Vec<VariableName> {
        let mut fields = self.field_names.clone();
        if self.metadata.event_time_field.is_some() {
            fields.push(VariableName::event_time());
        }
        if self.metadata.undo {
            fields.push(VariableName::undo());
        }
        fields
    }

    /// Physical field names, without virtual fields.
    pub fn field_names(&self) -> &[VariableName] {
        &self.field_names
    }

    /// Physical fields only, as name to value bindings.
    pub fn as_variables(&self) -> Variables {
        self.field_names
            .iter()
            .cloned()
            .zip(self.data.iter().cloned())
            .collect()
    }

    /// Physical data, in field order.
    pub fn as_tuple(&self) -> Value {
        Value::Tuple(self.data.clone())
    }

    /// Structural equality. See the [`PartialEq`] impl.
    pub fn equal(&self, other: &Record) -> bool {
        self == other
    }

    pub fn is_undo(&self) -> bool {
        self.metadata.undo
    }

    /// Value of the designated event-time field, [`Value::Null`] if none is
    /// designated or the designated field is absent.
    pub fn event_time(&self) -> Value {
        self.metadata
            .event_time_field
            .as_ref()
            .and_then(|f| self.physical_value(f))
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn event_time_field(&self) -> Option<&VariableName> {
        self.metadata.event_time_field.as_ref()
    }

    pub fn id(&self) -> &RecordId {
        &self.metadata.id
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// Records are equal when they expose the same field list with equal values
/// for every field, designate the same event-time field and share the undo
/// flag. The record id does not participate.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        let fields = self.fields();
        fields == other.fields()
            && self.metadata.event_time_field == other.metadata.event_time_field
            && self.metadata.undo == other.metadata.undo
            && fields.iter().all(|f| self.value(f) == other.value(f))
    }
}

impl Eq for Record {}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.field_names.iter().zip(&self.data).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}

// ──────────────────────────────────────────────
// Builder
// ──────────────────────────────────────────────

/// Collects metadata options and produces a [`Record`].
///
/// Options apply in call order, so a later `metadata_from` replaces an
/// earlier `undo()` and an `undo()` after `metadata_from` sets the flag on
/// top of the copied metadata.
///
/// ```ignore
/// let retraction = Record::builder()
///     .metadata_from(&original)
///     .undo()
///     .build(original.field_names().to_vec(), values)?;
/// ```
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct RecordBuilder {
    metadata: Metadata,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn undo(mut self) -> Self {
        self.metadata.undo = true;
        self
    }

    pub fn event_time_field(mut self, field: impl Into<VariableName>) -> Self {
        self.metadata.event_time_field = Some(field.into());
        self
    }

    /// Copy every metadata field of `base`.
    pub fn metadata_from(mut self, base: &Record) -> Self {
        self.metadata = base.metadata.clone();
        self
    }

    pub fn id(mut self, id: RecordId) -> Self {
        self.metadata.id = id;
        self
    }

    /// Builds a record from parallel name and value vectors.
    pub fn build(
        self,
        field_names: Vec<VariableName>,
        data: Vec<Value>,
    ) -> Result<Record, RecordError> {
        if field_names.len() != data.len() {
            return Err(RecordError::LengthMismatch {
                fields: field_names.len(),
                values: data.len(),
            });
        }
        Ok(Record {
            metadata: self.metadata,
            field_names,
            data,
        })
    }

    /// Builds a record taking each field's value from `values`. Fields
    /// without a binding are `Null`.
    pub fn build_from_map(self, field_names: Vec<VariableName>, values: &Variables) -> Record {
        let data = field_names
            .iter()
            .map(|f| values.get(f).cloned().unwrap_or(Value::Null))
            .collect();
        Record {
            metadata: self.metadata,
            field_names,
            data,
        }
    }
}
