//! Selectable options.

use serde::{Deserialize, Serialize};

/// One entry of a selection field's option list.
///
/// `value` is the stable code sent back to the service; `label` is what a
/// rendering layer shows. The engine matches on `value` only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionItem {
    pub value: String,
    pub label: String,
}

impl OptionItem {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }

    /// Option whose label is its value (common for years and codes).
    pub fn plain(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            label: value.clone(),
            value,
        }
    }
}
