use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Generic runtime value passed to and returned from factory operations.
///
/// Supports all JSON-compatible types plus binary data. Business parameters,
/// execute results and entity fields are all carried as `Value`, which keeps
/// remote payloads encodable by whatever transport the host plugs in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// JSON null.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON integer (signed 64-bit).
    Int(i64),
    /// JSON floating-point (64-bit IEEE 754).
    Float(f64),
    /// JSON string (UTF-8).
    String(String),
    /// Binary data (not directly representable in JSON).
    Bytes(Vec<u8>),
    /// JSON array (ordered sequence of values).
    Array(Vec<Value>),
    /// JSON object. Uses `BTreeMap` for deterministic serialization order.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the boolean if this value is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer if this value is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the string slice if this value is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

/// Save-state flags tracked by entities whose type carries the
/// save-state marker. Save routing is keyed on these two flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaveState {
    /// The instance has never been persisted.
    pub is_new: bool,
    /// The instance is marked for deletion on the next save.
    pub is_deleted: bool,
}

impl SaveState {
    /// State of a freshly created instance.
    pub const NEW: Self = Self {
        is_new: true,
        is_deleted: false,
    };

    /// State of an instance loaded from (or written to) the backing store.
    pub const EXISTING: Self = Self {
        is_new: false,
        is_deleted: false,
    };
}

impl Default for SaveState {
    fn default() -> Self {
        Self::NEW
    }
}

/// A domain instance as seen by the factory runtime.
///
/// Handlers mutate the fields; the factory maintains [`SaveState`] for types
/// declared with save-state tracking. Writes ship the whole entity as the
/// target of a cross-process call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Name of the domain type this instance belongs to.
    pub type_name: String,
    /// Current save-state flags.
    pub state: SaveState,
    /// Field values keyed by field name.
    pub fields: BTreeMap<String, Value>,
}

impl Entity {
    /// Creates an empty, new instance of the given type.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            state: SaveState::NEW,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Returns the value of a field, if set.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Marks the instance as persisted and not deleted.
    pub fn mark_old(&mut self) {
        self.state = SaveState::EXISTING;
    }

    /// Marks the instance for deletion on the next save.
    pub fn mark_deleted(&mut self) {
        self.state.is_deleted = true;
    }

    /// Resets the instance to the state of a fresh, unsaved one.
    pub fn mark_new(&mut self) {
        self.state = SaveState::NEW;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entity_is_new_and_not_deleted() {
        let entity = Entity::new("Person");
        assert_eq!(entity.state, SaveState::NEW);
        assert!(entity.fields.is_empty());
    }

    #[test]
    fn mark_old_clears_both_flags() {
        let mut entity = Entity::new("Person");
        entity.mark_deleted();
        entity.mark_old();
        assert_eq!(entity.state, SaveState::EXISTING);
    }

    #[test]
    fn option_converts_to_null() {
        let none: Option<i32> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some(3)), Value::Int(3));
    }

    #[test]
    fn entity_serializes_with_state() {
        let entity = Entity::new("Person").with("name", "Ada");
        let json = serde_json::to_string(&entity).unwrap();
        let back: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entity);
    }
}
