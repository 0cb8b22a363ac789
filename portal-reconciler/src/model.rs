//! Entity model shared by every managed collection.
//!
//! An entity is a sub-resource of a portal order (an address policy, a
//! technical user, a connector topic). Each kind exposes a stable identity
//! and a flat field map; the reconciler only ever works on those two views.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable key of an entity within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Identity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single attribute value.
///
/// Equality is semantic: strings compare with surrounding whitespace
/// trimmed, lists compare as sets of trimmed, non-empty items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn normalized_list(items: &[String]) -> Vec<&str> {
        let mut out: Vec<&str> = items
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::Int(a), FieldValue::Int(b)) => a == b,
            (FieldValue::Str(a), FieldValue::Str(b)) => a.trim() == b.trim(),
            (FieldValue::List(a), FieldValue::List(b)) => {
                Self::normalized_list(a) == Self::normalized_list(b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Str(v) => write!(f, "{:?}", v),
            FieldValue::List(v) => write!(f, "[{}]", v.join(", ")),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        FieldValue::List(v)
    }
}

/// Named attributes of an entity, keyed by field name.
pub type Fields = BTreeMap<&'static str, FieldValue>;

/// Two integer fields whose unset sentinel must agree and whose set values
/// must satisfy `low <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairedField {
    pub low: &'static str,
    pub high: &'static str,
    pub sentinel: i64,
}

/// Static rules for one entity kind.
#[derive(Debug)]
pub struct Schema {
    /// Kind name used in logs and errors (e.g. `address-policy`).
    pub kind: &'static str,
    /// Fields fixed at creation.
    pub immutable: &'static [&'static str],
    /// Paired-field constraints checked on every desired entity.
    pub paired: &'static [PairedField],
    /// Unchanged fields the remote update call still needs.
    pub context: &'static [&'static str],
}

/// An entity kind the reconciler can manage.
pub trait Resource: Clone + fmt::Debug + Send + Sync + 'static {
    const SCHEMA: Schema;

    fn identity(&self) -> Identity;

    fn fields(&self) -> Fields;
}

/// Field-level delta carried by an update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangedFields {
    /// Fields that differ, with their desired value.
    pub changed: Fields,
    /// Unchanged siblings required by the update call.
    pub context: Fields,
    /// Paired constraints with at least one changed member. The remote
    /// applies these with a follow-up call.
    pub pairs: Vec<PairedField>,
}

impl ChangedFields {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn touches_pair(&self) -> bool {
        !self.pairs.is_empty()
    }
}

/// The entities of one kind owned by a parent order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection<R> {
    items: Vec<R>,
}

impl<R> Default for Collection<R> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<R: Resource> Collection<R> {
    pub fn new(items: Vec<R>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.items.iter()
    }

    pub fn get(&self, identity: &Identity) -> Option<&R> {
        self.items.iter().find(|item| &item.identity() == identity)
    }

    /// Read-only map from identity to entity. The first occurrence wins.
    pub(crate) fn index(&self) -> HashMap<Identity, &R> {
        let mut index = HashMap::with_capacity(self.items.len());
        for item in &self.items {
            index.entry(item.identity()).or_insert(item);
        }
        index
    }
}

impl<R: Resource> FromIterator<R> for Collection<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a, R> IntoIterator for &'a Collection<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_equality_ignores_surrounding_whitespace() {
        assert_eq!(FieldValue::from(" FAIL"), FieldValue::from("FAIL "));
        assert_ne!(FieldValue::from("FAIL"), FieldValue::from("BLOCK"));
    }

    #[test]
    fn test_list_equality_is_order_insensitive() {
        let a = FieldValue::from(vec!["DC.a".to_string(), " DC.b".to_string()]);
        let b = FieldValue::from(vec!["DC.b".to_string(), "DC.a".to_string(), "".to_string()]);
        assert_eq!(a, b);

        let c = FieldValue::from(vec!["DC.a".to_string()]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_mixed_variants_never_equal() {
        assert_ne!(FieldValue::from(1), FieldValue::from("1"));
        assert_ne!(FieldValue::from(true), FieldValue::from("true"));
    }

    #[test]
    fn test_field_value_deserializes_untagged() {
        let v: Vec<FieldValue> = serde_json::from_str(r#"[true, -1, "x", ["a"]]"#).unwrap();
        assert_eq!(v[0], FieldValue::Bool(true));
        assert_eq!(v[1].as_int(), Some(-1));
        assert_eq!(v[2], FieldValue::from("x"));
        assert_eq!(v[3], FieldValue::from(vec!["a".to_string()]));
    }
}
