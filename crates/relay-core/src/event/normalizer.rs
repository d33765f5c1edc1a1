//! Table-driven projection of raw inbound events onto [`CanonicalEvent`].
//!
//! A [`Normalizer`] reads one discriminator field (e.g. `sub_type`) from the raw
//! event, picks the field table registered for that value, and evaluates each
//! table entry's [`FieldPath`] against the raw JSON.  The projection is purely
//! structural: values are copied as-is, never coerced or renamed beyond what
//! the table says.

use std::collections::HashMap;

use serde_json::Value;

use super::canonical::{CanonicalEvent, CanonicalField};

/// An ordered list of object keys leading into a raw event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }

    pub fn keys(&self) -> &[String] {
        &self.0
    }

    /// Follows the path; `None` if a key is missing or an intermediate value
    /// is not an object.
    pub fn resolve<'a>(&self, raw: &'a Value) -> Option<&'a Value> {
        let mut current = raw;
        for key in &self.0 {
            current = current.as_object()?.get(key)?;
        }
        Some(current)
    }
}

impl From<&[&str]> for FieldPath {
    fn from(keys: &[&str]) -> Self {
        Self::new(keys.iter().copied())
    }
}

/// The field table for one discriminator value.
pub type FieldMap = Vec<(CanonicalField, FieldPath)>;

/// Projects raw events onto [`CanonicalEvent`].
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    discriminator: String,
    tables: HashMap<String, FieldMap>,
}

impl Normalizer {
    /// Creates a normalizer with no tables, keyed on `discriminator`.
    pub fn new(discriminator: impl Into<String>) -> Self {
        Self {
            discriminator: discriminator.into(),
            tables: HashMap::new(),
        }
    }

    /// Registers (or replaces) the table used when the discriminator equals `value`.
    pub fn with_table(mut self, value: impl Into<String>, table: FieldMap) -> Self {
        self.tables.insert(value.into(), table);
        self
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    /// `true` if a table is registered for `value`.
    pub fn knows(&self, value: &str) -> bool {
        self.tables.contains_key(value)
    }

    /// Normalizes `raw`.
    ///
    /// An absent, non-string or unknown discriminator yields an all-null event.
    pub fn normalize(&self, raw: &Value) -> CanonicalEvent {
        let table = raw
            .get(&self.discriminator)
            .and_then(Value::as_str)
            .and_then(|value| self.tables.get(value));

        match table {
            Some(table) => CanonicalEvent::from_pairs(table.iter().map(|(field, path)| {
                (*field, path.resolve(raw).cloned().unwrap_or(Value::Null))
            })),
            None => CanonicalEvent::empty(),
        }
    }
}
