//! The row store.
//!
//! One aggregate owns every row in the batch: a plain arena of rows plus
//! an id lookup, replacing any notion of shared per-row dictionaries.
//! `RowId`s are monotonically assigned and never reused, so a stale id
//! can never alias a newer row.

use rustc_hash::FxHashMap;

use planbook_core::{FieldKey, FieldValue};

use crate::row::{Row, RowId};
use crate::schema::Schema;

/// All rows of the batch being edited.
#[derive(Debug)]
pub struct RowStore {
    schema: Schema,
    rows: Vec<Row>,
    /// Next id to assign. Monotonically increasing, never reused.
    next_row_id: u64,
    /// Bumped once per mutating operation; events carry it.
    revision: u64,
}

impl RowStore {
    /// Create an empty store over a schema.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
            next_row_id: 1,
            revision: 0,
        }
    }

    /// The shared field schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Current revision.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Bump and return the revision. Called once per mutating operation.
    pub fn bump_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    /// Number of live rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Allocate a new row for a company. The row starts in `Creating`;
    /// the lifecycle manager drives it to `Ready`.
    pub fn insert_row(&mut self, company: &str) -> RowId {
        let id = RowId(self.next_row_id);
        self.next_row_id += 1;
        let row = Row::new(id, company, &self.schema);
        self.rows.push(row);
        id
    }

    /// Remove a row. All of its field, provenance, and validation state
    /// goes with it in one step. Returns false for an unknown id.
    pub fn remove_row(&mut self, id: RowId) -> bool {
        match self.idx_for_row_id(id) {
            Some(idx) => {
                self.rows.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Row by id.
    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.idx_for_row_id(id).map(|idx| &self.rows[idx])
    }

    /// Mutable row by id.
    pub fn row_mut(&mut self, id: RowId) -> Option<&mut Row> {
        let idx = self.idx_for_row_id(id)?;
        Some(&mut self.rows[idx])
    }

    /// All rows, creation order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Ids of all rows, creation order.
    pub fn row_ids(&self) -> Vec<RowId> {
        self.rows.iter().map(|r| r.id()).collect()
    }

    /// Values of a row as an upstream-filter snapshot, keyed for lookup.
    pub fn value_snapshot(&self, id: RowId) -> FxHashMap<FieldKey, FieldValue> {
        self.row(id)
            .map(|row| row.values().into_iter().collect())
            .unwrap_or_default()
    }

    fn idx_for_row_id(&self, id: RowId) -> Option<usize> {
        self.rows.iter().position(|r| r.id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowState;

    fn store() -> RowStore {
        RowStore::new(Schema::standard())
    }

    #[test]
    fn test_insert_assigns_monotone_ids() {
        let mut store = store();
        let a = store.insert_row("BJC");
        let b = store.insert_row("BJC");

        assert!(b > a);
        assert_eq!(store.len(), 2);
        assert_eq!(store.row(a).unwrap().state, RowState::Creating);
    }

    #[test]
    fn test_ids_never_reused_after_delete() {
        let mut store = store();
        let a = store.insert_row("BJC");
        assert!(store.remove_row(a));

        let b = store.insert_row("BJC");
        assert_ne!(a, b);
        assert!(store.row(a).is_none());
        assert!(store.row(b).is_some());
    }

    #[test]
    fn test_remove_unknown_row() {
        let mut store = store();
        assert!(!store.remove_row(RowId(42)));
    }

    #[test]
    fn test_remove_is_atomic() {
        let mut store = store();
        let a = store.insert_row("BJC");
        let b = store.insert_row("BJC");

        store
            .row_mut(a)
            .unwrap()
            .field_mut(&FieldKey::from("payroll_amount"))
            .unwrap()
            .set_user_value("50000");

        assert!(store.remove_row(a));
        assert_eq!(store.len(), 1);
        assert_eq!(store.row_ids(), vec![b]);
    }

    #[test]
    fn test_value_snapshot() {
        let mut store = store();
        let id = store.insert_row("BJC");
        store
            .row_mut(id)
            .unwrap()
            .field_mut(&FieldKey::from("payroll_amount"))
            .unwrap()
            .set_user_value("50000");

        let snapshot = store.value_snapshot(id);
        assert_eq!(
            snapshot.get("payroll_amount"),
            Some(&FieldValue::Number(50000.0))
        );
        assert_eq!(snapshot.get("cost_center"), Some(&FieldValue::Empty));
    }

    #[test]
    fn test_revision_bumps() {
        let mut store = store();
        assert_eq!(store.revision(), 0);
        assert_eq!(store.bump_revision(), 1);
        assert_eq!(store.revision(), 1);
    }
}
