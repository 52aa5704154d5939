//! Field identity.
//!
//! A `FieldKey` is the stable logical name of an editable field
//! (e.g. `cost_center`), shared across every row. Keys identify nodes in
//! the dependency graph and anchor validation diagnostics.

use std::borrow::Borrow;

use serde::{Deserialize, Serialize};

/// Stable logical name of a field.
///
/// Keys are plain lowercase snake_case strings. They are declared once in
/// the schema catalog and referenced everywhere else; rows never invent
/// their own keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldKey(String);

impl FieldKey {
    /// Create a key from a logical name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FieldKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for FieldKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_equality_and_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(FieldKey::from("cost_center"));
        set.insert(FieldKey::from("cost_center")); // duplicate
        set.insert(FieldKey::from("division"));

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_borrow_str_lookup() {
        use std::collections::HashMap;

        let mut map: HashMap<FieldKey, u32> = HashMap::new();
        map.insert(FieldKey::from("year"), 2026);

        // Borrow<str> lets callers look up without allocating a key.
        assert_eq!(map.get("year"), Some(&2026));
        assert_eq!(map.get("company"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(FieldKey::from("job_band").to_string(), "job_band");
    }
}
