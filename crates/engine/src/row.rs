//! The row aggregate.
//!
//! A row owns its fields and their provenance outright; nothing outside
//! the store holds references into it. Rows are identified by an opaque
//! `RowId` that is never reused.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use planbook_core::{FieldKey, FieldKind, FieldValue};

use crate::field::{Field, OptionState};
use crate::schema::Schema;
use crate::validation::{Diagnostic, RowValidationResult};

/// Opaque row identity. Monotonically assigned, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub(crate) u64);

impl RowId {
    /// The raw id, for logs and wire payloads.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Rebuild an id from its raw form (wire payloads only).
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row#{}", self.0)
    }
}

/// Lifecycle state of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowState {
    /// Allocated, fields not yet instantiated.
    Creating,
    /// Root option lists are loading; programmatic writes are rejected.
    PopulatingOptions,
    /// Fully usable.
    Ready,
}

/// Diagnostic text currently shown for a row.
///
/// Validation always computes fresh diagnostics, but the text a user is
/// reading is not yanked away mid-interaction: a re-validation parks the
/// fresh text and keeps showing the old until a grace deadline passes.
/// Counts and validity always come from the fresh result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayState {
    current: Vec<Diagnostic>,
    pending: Option<Vec<Diagnostic>>,
    preserved_until: Option<u64>,
}

impl DisplayState {
    /// Show fresh diagnostics, preserving the currently displayed text
    /// until `now_ms + grace_ms` if it differs. A zero grace swaps
    /// immediately (single-row validation during active editing).
    pub fn show(&mut self, fresh: Vec<Diagnostic>, now_ms: u64, grace_ms: u64) {
        if grace_ms > 0 && !self.current.is_empty() && self.current != fresh {
            self.pending = Some(fresh);
            self.preserved_until = Some(now_ms + grace_ms);
        } else {
            self.current = fresh;
            self.pending = None;
            self.preserved_until = None;
        }
    }

    /// Swap in parked text once its grace deadline has passed.
    pub fn refresh(&mut self, now_ms: u64) {
        if let Some(deadline) = self.preserved_until {
            if now_ms >= deadline {
                if let Some(fresh) = self.pending.take() {
                    self.current = fresh;
                }
                self.preserved_until = None;
            }
        }
    }

    /// The diagnostics a rendering layer should show right now.
    pub fn visible(&self) -> &[Diagnostic] {
        &self.current
    }

    /// True while older text is being held over fresh results.
    pub fn is_preserving(&self) -> bool {
        self.preserved_until.is_some()
    }
}

/// One budget row: every field needed to describe one position/employee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    id: RowId,
    company: String,
    pub state: RowState,
    fields: FxHashMap<FieldKey, Field>,
    /// Catalog-ordered keys, so iteration is deterministic.
    field_order: Vec<FieldKey>,
    /// Has the remote calculation run at least once? A re-run needs an
    /// explicit confirmation from the host.
    pub calculated_once: bool,
    /// Allocation-template rows keep their cost-center subtree frozen.
    pub locked_template: bool,
    /// Fields that could not be copied from the source row, if any.
    pub copy_misses: Vec<FieldKey>,
    pub validation: RowValidationResult,
    pub display: DisplayState,
}

impl Row {
    /// Instantiate a row with the company's field subset from the schema.
    ///
    /// Fields excluded for the company are never created, which is what
    /// keeps the "no inapplicable field is ever populated" invariant: the
    /// field simply does not exist on the row.
    pub fn new(id: RowId, company: &str, schema: &Schema) -> Self {
        let mut fields = FxHashMap::default();
        let mut field_order = Vec::new();
        for def in schema.defs_for_company(company) {
            fields.insert(def.key.clone(), Field::new(def.key.clone(), def.kind));
            field_order.push(def.key.clone());
        }

        Self {
            id,
            company: company.to_string(),
            state: RowState::Creating,
            fields,
            field_order,
            calculated_once: false,
            locked_template: false,
            copy_misses: Vec::new(),
            validation: RowValidationResult::default(),
            display: DisplayState::default(),
        }
    }

    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn field(&self, key: &FieldKey) -> Option<&Field> {
        self.fields.get(key)
    }

    pub fn field_mut(&mut self, key: &FieldKey) -> Option<&mut Field> {
        self.fields.get_mut(key)
    }

    /// Fields in catalog order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.field_order.iter().filter_map(|k| self.fields.get(k))
    }

    /// Current value of a field, `Empty` if the field does not apply.
    pub fn value(&self, key: &FieldKey) -> FieldValue {
        self.fields
            .get(key)
            .map(|f| f.value.clone())
            .unwrap_or(FieldValue::Empty)
    }

    /// `(key, value)` pairs for every field, catalog order.
    pub fn values(&self) -> Vec<(FieldKey, FieldValue)> {
        self.fields()
            .map(|f| (f.key.clone(), f.value.clone()))
            .collect()
    }

    /// True once the row accepts programmatic writes.
    pub fn is_ready(&self) -> bool {
        self.state == RowState::Ready
    }

    /// True if any option fetch for this row has failed and not been
    /// retried successfully. Surfaces as a validation warning.
    pub fn has_unresolved_dependency(&self) -> bool {
        self.fields()
            .any(|f| f.kind == FieldKind::Select && f.options == OptionState::Unavailable)
    }

    /// Count of benefit-style numeric fields holding a positive value.
    pub fn positive_amount_count(&self) -> usize {
        self.fields()
            .filter(|f| f.kind == FieldKind::Number && f.value.is_positive())
            .count()
    }
}
