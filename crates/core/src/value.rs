//! Field values and the small enums that describe them.
//!
//! A field holds either nothing, free text, or a number. Selection fields
//! store the selected option's value as text; the option label lives with
//! the field's option list, not in the value.

use serde::{Deserialize, Serialize};

/// What kind of editor a field is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Value must come from a fetched option list.
    Select,
    /// Free-form text.
    Text,
    /// Numeric amount.
    Number,
}

/// The value currently held by a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Empty,
    Text(String),
    Number(f64),
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Empty
    }
}

impl FieldValue {
    /// Parse raw user input into a value. Numbers win over text.
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return FieldValue::Empty;
        }

        if let Ok(num) = trimmed.parse::<f64>() {
            return FieldValue::Number(num);
        }

        FieldValue::Text(trimmed.to_string())
    }

    /// Numeric view of the value. Text parses if it can, otherwise 0.
    pub fn as_number(&self) -> f64 {
        match self {
            FieldValue::Number(n) => *n,
            FieldValue::Text(s) => s.parse().unwrap_or(0.0),
            FieldValue::Empty => 0.0,
        }
    }

    /// True if the field holds nothing (no option chosen, no text, no number).
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Number(_) => false,
        }
    }

    /// True for a strictly positive numeric value.
    pub fn is_positive(&self) -> bool {
        matches!(self, FieldValue::Number(n) if *n > 0.0)
    }

    /// Display form used when no option label applies.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Empty => String::new(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{:.2}", n)
                }
            }
        }
    }
}

/// How a field's current value came to be.
///
/// `UserEdited` is only ever set by the direct-input path; programmatic
/// writes (calculation, copy, remote load) go through the merge policy,
/// which records the origin it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueOrigin {
    /// Nothing has been written yet (or the field was cleared).
    #[default]
    Empty,
    /// Typed or picked by the user.
    UserEdited,
    /// Produced by the calculation service.
    Calculated,
    /// Duplicated from another row.
    Copied,
    /// Loaded from a persisted batch.
    RemoteLoaded,
}

impl ValueOrigin {
    /// True for origins written by the engine rather than the user.
    pub fn is_automatic(&self) -> bool {
        matches!(
            self,
            ValueOrigin::Calculated | ValueOrigin::Copied | ValueOrigin::RemoteLoaded
        )
    }
}

/// Per-field validity verdict.
///
/// Variants are declared in ascending severity so the derived `Ord`
/// gives the error > warning > valid > empty priority directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    #[default]
    Empty,
    Valid,
    Warning,
    Error,
}

impl ValidationStatus {
    /// Combine two verdicts, keeping the more severe one.
    pub fn combine(self, other: ValidationStatus) -> ValidationStatus {
        self.max(other)
    }
}
