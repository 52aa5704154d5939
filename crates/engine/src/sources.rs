//! Abstract collaborators consumed by the engine.
//!
//! The engine never talks to a network itself; hosts hand it
//! implementations of these traits (an HTTP client in production,
//! scripted fakes in tests). Results come back as plain data.

use serde::{Deserialize, Serialize};

use planbook_core::{FieldKey, FieldValue, OptionItem};

use crate::row::{Row, RowId};

/// A remote call that did not produce a usable answer.
///
/// Never fatal: option fetch failures degrade to a placeholder list and a
/// row warning, calculation failures leave the row as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport-level failure (connection refused, timeout).
    Network(String),
    /// The service answered with an error.
    Service(String),
    /// The answer arrived but could not be understood.
    Decode(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Network(msg) => write!(f, "network error: {}", msg),
            FetchError::Service(msg) => write!(f, "service error: {}", msg),
            FetchError::Decode(msg) => write!(f, "decode error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// Upstream values constraining an option fetch.
pub type OptionFilters = Vec<(FieldKey, FieldValue)>;

/// Fetches the selectable values for a field given its upstream filters.
pub trait OptionSource {
    fn fetch(&self, field: &FieldKey, filters: &OptionFilters)
        -> Result<Vec<OptionItem>, FetchError>;
}

/// A row's values, detached from the store, for remote calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSnapshot {
    pub row: RowId,
    pub company: String,
    pub values: Vec<(FieldKey, FieldValue)>,
}

impl RowSnapshot {
    /// Snapshot a row's current values.
    pub fn of(row: &Row) -> Self {
        Self {
            row: row.id(),
            company: row.company().to_string(),
            values: row.values(),
        }
    }

    /// Value of one field in the snapshot.
    pub fn value(&self, key: &FieldKey) -> FieldValue {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or(FieldValue::Empty)
    }
}

/// Computes benefit amounts for a row. Opaque business rules; the engine
/// only consumes the candidates, through the merge policy.
pub trait CalculationService {
    fn compute(&self, snapshot: &RowSnapshot) -> Result<Vec<(FieldKey, f64)>, FetchError>;
}

/// Outcome of persisting a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveReport {
    pub succeeded: Vec<RowId>,
    /// Rows the service rejected, with its reason. Reported, not retried.
    pub failed: Vec<(RowId, String)>,
}

/// Persists a batch of rows. Only invoked once the batch has zero errors.
pub trait PersistenceLayer {
    fn save(&self, rows: &[RowSnapshot]) -> Result<SaveReport, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Row;
    use crate::schema::Schema;

    #[test]
    fn test_snapshot_captures_values() {
        let schema = Schema::standard();
        let mut row = Row::new(RowId(7), "BJC", &schema);
        row.field_mut(&FieldKey::from("payroll_amount"))
            .unwrap()
            .set_user_value("50000");

        let snapshot = RowSnapshot::of(&row);
        assert_eq!(snapshot.row, RowId(7));
        assert_eq!(snapshot.company, "BJC");
        assert_eq!(
            snapshot.value(&FieldKey::from("payroll_amount")),
            FieldValue::Number(50000.0)
        );
        assert_eq!(
            snapshot.value(&FieldKey::from("cost_center")),
            FieldValue::Empty
        );
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::Network("connection refused".into());
        assert_eq!(err.to_string(), "network error: connection refused");
    }

    #[test]
    fn test_snapshot_serde_round_trip() {
        let schema = Schema::standard();
        let row = Row::new(RowId(3), "BJC", &schema);
        let snapshot = RowSnapshot::of(&row);

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: RowSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, parsed);
    }
}
