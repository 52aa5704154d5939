//! A single editable field and its provenance.
//!
//! Provenance lives with the field: every write path records where the
//! value came from, and the merge policy arbitrates programmatic writes
//! against it. Only `set_user_value` may produce `UserEdited`.

use serde::{Deserialize, Serialize};

use planbook_core::{FieldKey, FieldKind, FieldValue, OptionItem, ValidationStatus, ValueOrigin};

/// Load state of a selection field's option list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum OptionState {
    /// Nothing fetched yet (fresh row, or upstream changed).
    #[default]
    NotLoaded,
    /// Options fetched and ready to pick from.
    Loaded(Vec<OptionItem>),
    /// The fetch failed; the list shows a placeholder until retried.
    Unavailable,
}

impl OptionState {
    /// True once a fetch has completed successfully.
    pub fn is_loaded(&self) -> bool {
        matches!(self, OptionState::Loaded(_))
    }

    /// The loaded options, if any.
    pub fn items(&self) -> &[OptionItem] {
        match self {
            OptionState::Loaded(items) => items,
            _ => &[],
        }
    }
}

/// Where a field's value came from, plus the last value the engine wrote.
///
/// `last_written` is recorded on every applied merge so a later direct
/// edit can be told apart from the engine's own write: if the edited
/// value differs from it, the field is genuinely user-overridden.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Provenance {
    pub origin: ValueOrigin,
    pub last_written: Option<FieldValue>,
}

/// One editable unit of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub key: FieldKey,
    pub kind: FieldKind,
    pub value: FieldValue,
    /// Label of the selected option, for display; empty for non-selects.
    pub display: String,
    pub options: OptionState,
    pub status: ValidationStatus,
    pub provenance: Provenance,
}

impl Field {
    /// Create an empty field of the given kind.
    pub fn new(key: FieldKey, kind: FieldKind) -> Self {
        Self {
            key,
            kind,
            value: FieldValue::Empty,
            display: String::new(),
            options: OptionState::NotLoaded,
            status: ValidationStatus::Empty,
            provenance: Provenance::default(),
        }
    }

    /// Direct user input. The only path that may set `UserEdited`.
    ///
    /// If the typed value matches what the engine last wrote, the origin
    /// is left alone; the user re-entering a computed number is not an
    /// override.
    pub fn set_user_value(&mut self, input: &str) {
        let value = FieldValue::from_input(input);

        let is_override = match &self.provenance.last_written {
            Some(last) => *last != value,
            None => true,
        };

        if value.is_empty() {
            // Clearing re-opens the field to automatic population.
            self.provenance.origin = ValueOrigin::Empty;
        } else if is_override {
            self.provenance.origin = ValueOrigin::UserEdited;
        }

        self.display = match self.kind {
            FieldKind::Select => self.label_for(&value).unwrap_or_default(),
            _ => value.display(),
        };
        self.value = value;
    }

    /// Select an option by value. Direct user input, select fields only.
    pub fn select_option(&mut self, value: &str) -> bool {
        match self.label_for(&FieldValue::Text(value.to_string())) {
            Some(label) => {
                self.display = label;
                self.value = FieldValue::Text(value.to_string());
                self.provenance.origin = ValueOrigin::UserEdited;
                true
            }
            None => false,
        }
    }

    /// Programmatic write. Callers go through the merge policy; this just
    /// records the value, its display label, and the origin.
    pub(crate) fn write(&mut self, value: FieldValue, display: String, origin: ValueOrigin) {
        self.provenance.last_written = Some(value.clone());
        self.provenance.origin = origin;
        self.display = display;
        self.value = value;
    }

    /// Clear value and provenance; used when an upstream selection changes.
    pub fn clear(&mut self) {
        self.value = FieldValue::Empty;
        self.display.clear();
        self.status = ValidationStatus::Empty;
        self.provenance = Provenance::default();
    }

    /// True if the current option list contains `value`.
    pub fn has_option(&self, value: &str) -> bool {
        self.options.items().iter().any(|o| o.value == value)
    }

    /// Label of the option matching a value, if loaded.
    pub fn label_for(&self, value: &FieldValue) -> Option<String> {
        let wanted = match value {
            FieldValue::Text(s) => s.as_str(),
            _ => return None,
        };
        self.options
            .items()
            .iter()
            .find(|o| o.value == wanted)
            .map(|o| o.label.clone())
    }

    /// Empty in the validation sense: no option chosen, no text, no number.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}
