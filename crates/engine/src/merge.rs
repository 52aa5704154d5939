//! Conflict policy for programmatic field writes.
//!
//! Calculation results, copied rows, and remote loads all land through
//! `merge_candidate`, so one policy decides what may overwrite what.
//! Evaluated in order:
//!
//! 1. The configured primary recalculation field is always overwritten by
//!    a calculation result, whatever its provenance. Recalculation must
//!    stay internally consistent even over a manual edit.
//! 2. A zero/absent candidate never clobbers a non-empty current value.
//! 3. An empty current value, or a non-empty candidate over a value the
//!    user did not type, is applied.
//! 4. Otherwise the field is user-edited and the candidate is dropped.

use serde::{Deserialize, Serialize};

use planbook_core::{FieldKey, FieldKind, FieldValue, ValueOrigin};

use crate::field::Field;

/// Deployment-level merge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergePolicy {
    /// The one field a recalculation always overwrites.
    pub primary_recalc_field: FieldKey,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            primary_recalc_field: FieldKey::from("payroll_amount"),
        }
    }
}

/// Decision of a merge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The candidate replaced the current value.
    Applied,
    /// The current value stands.
    Skipped(SkipReason),
}

impl MergeOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MergeOutcome::Applied)
    }
}

/// Why a candidate was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Candidate was zero/absent while the field holds a real value.
    ZeroCandidate,
    /// The field holds a manual entry the candidate may not replace.
    ManualValue,
}

/// Apply the overwrite policy for one candidate value.
///
/// `display` is the label to show when the candidate is applied (option
/// label for selects, formatted number otherwise).
pub fn merge_candidate(
    field: &mut Field,
    candidate: FieldValue,
    display: String,
    origin: ValueOrigin,
    policy: &MergePolicy,
) -> MergeOutcome {
    // Rule 1: recalculation owns the primary field outright.
    if origin == ValueOrigin::Calculated && field.key == policy.primary_recalc_field {
        field.write(candidate, display, ValueOrigin::Calculated);
        return MergeOutcome::Applied;
    }

    let current_present = has_substance(&field.value, field.kind);
    let candidate_present = has_substance(&candidate, field.kind);

    // Rule 2: never clobber a real value with nothing.
    if current_present && !candidate_present {
        return MergeOutcome::Skipped(SkipReason::ZeroCandidate);
    }

    // Rule 3: fill empties, and replace anything the user did not type.
    if !current_present
        || (candidate_present && field.provenance.origin != ValueOrigin::UserEdited)
    {
        field.write(candidate, display, origin);
        return MergeOutcome::Applied;
    }

    // Rule 4: preserve manual input.
    MergeOutcome::Skipped(SkipReason::ManualValue)
}

/// Whether a value counts as "present" for overwrite arbitration.
///
/// Numeric fields treat zero like absent: a zero result carries no
/// information worth destroying data for.
fn has_substance(value: &FieldValue, kind: FieldKind) -> bool {
    match kind {
        FieldKind::Number => value.is_positive(),
        FieldKind::Select | FieldKind::Text => !value.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planbook_core::ValidationStatus;
    use crate::field::{OptionState, Provenance};
    use planbook_core::OptionItem;

    fn number_field(key: &str) -> Field {
        Field::new(FieldKey::from(key), FieldKind::Number)
    }

    fn policy() -> MergePolicy {
        MergePolicy::default()
    }

    fn merge_number(field: &mut Field, amount: f64, origin: ValueOrigin) -> MergeOutcome {
        let candidate = FieldValue::Number(amount);
        let display = candidate.display();
        merge_candidate(field, candidate, display, origin, &policy())
    }

    #[test]
    fn test_fills_empty_field() {
        let mut field = number_field("bonus");
        let outcome = merge_number(&mut field, 1200.0, ValueOrigin::Calculated);

        assert_eq!(outcome, MergeOutcome::Applied);
        assert_eq!(field.value, FieldValue::Number(1200.0));
        assert_eq!(field.provenance.origin, ValueOrigin::Calculated);
        assert_eq!(field.provenance.last_written, Some(FieldValue::Number(1200.0)));
    }

    #[test]
    fn test_zero_candidate_never_clobbers() {
        let mut field = number_field("bonus");
        field.set_user_value("50000");

        let outcome = merge_number(&mut field, 0.0, ValueOrigin::Calculated);
        assert_eq!(outcome, MergeOutcome::Skipped(SkipReason::ZeroCandidate));
        assert_eq!(field.value, FieldValue::Number(50000.0));
    }

    #[test]
    fn test_zero_candidate_skipped_even_for_computed_current() {
        let mut field = number_field("bonus");
        merge_number(&mut field, 800.0, ValueOrigin::Calculated);

        let outcome = merge_number(&mut field, 0.0, ValueOrigin::Calculated);
        assert_eq!(outcome, MergeOutcome::Skipped(SkipReason::ZeroCandidate));
        assert_eq!(field.value, FieldValue::Number(800.0));
    }

    #[test]
    fn test_manual_value_preserved() {
        let mut field = number_field("bonus");
        field.set_user_value("50000");

        let outcome = merge_number(&mut field, 62000.0, ValueOrigin::Calculated);
        assert_eq!(outcome, MergeOutcome::Skipped(SkipReason::ManualValue));
        assert_eq!(field.value, FieldValue::Number(50000.0));
        assert_eq!(field.provenance.origin, ValueOrigin::UserEdited);
    }

    #[test]
    fn test_computed_value_replaced_by_newer_computation() {
        let mut field = number_field("bonus");
        merge_number(&mut field, 800.0, ValueOrigin::Calculated);

        let outcome = merge_number(&mut field, 950.0, ValueOrigin::Calculated);
        assert_eq!(outcome, MergeOutcome::Applied);
        assert_eq!(field.value, FieldValue::Number(950.0));
    }

    #[test]
    fn test_primary_field_always_overwritten_by_recalc() {
        let mut field = number_field("payroll_amount");
        field.set_user_value("50000");

        let outcome = merge_number(&mut field, 62000.0, ValueOrigin::Calculated);
        assert_eq!(outcome, MergeOutcome::Applied);
        assert_eq!(field.value, FieldValue::Number(62000.0));
        assert_eq!(field.provenance.origin, ValueOrigin::Calculated);
    }

    #[test]
    fn test_primary_field_not_special_for_copy() {
        let mut field = number_field("payroll_amount");
        field.set_user_value("50000");

        let outcome = merge_number(&mut field, 62000.0, ValueOrigin::Copied);
        assert_eq!(outcome, MergeOutcome::Skipped(SkipReason::ManualValue));
        assert_eq!(field.value, FieldValue::Number(50000.0));
    }

    #[test]
    fn test_cleared_manual_field_accepts_automation_again() {
        let mut field = number_field("bonus");
        field.set_user_value("50000");
        field.set_user_value("");

        let outcome = merge_number(&mut field, 1200.0, ValueOrigin::Calculated);
        assert_eq!(outcome, MergeOutcome::Applied);
    }

    #[test]
    fn test_select_copy_uses_option_label() {
        let mut field = Field::new(FieldKey::from("cost_center"), FieldKind::Select);
        field.options = OptionState::Loaded(vec![OptionItem::new("1100", "1100 - Head Office")]);

        let outcome = merge_candidate(
            &mut field,
            FieldValue::Text("1100".to_string()),
            "1100 - Head Office".to_string(),
            ValueOrigin::Copied,
            &policy(),
        );
        assert_eq!(outcome, MergeOutcome::Applied);
        assert_eq!(field.display, "1100 - Head Office");
        assert_eq!(field.provenance.origin, ValueOrigin::Copied);
    }

    #[test]
    fn test_merge_leaves_status_alone() {
        let mut field = number_field("bonus");
        field.status = ValidationStatus::Warning;
        merge_number(&mut field, 10.0, ValueOrigin::RemoteLoaded);
        assert_eq!(field.status, ValidationStatus::Warning);
    }

    #[test]
    fn test_custom_primary_field() {
        let policy = MergePolicy {
            primary_recalc_field: FieldKey::from("bonus"),
        };
        let mut field = number_field("bonus");
        field.set_user_value("100");

        let candidate = FieldValue::Number(0.0);
        let outcome = merge_candidate(
            &mut field,
            candidate.clone(),
            candidate.display(),
            ValueOrigin::Calculated,
            &policy,
        );
        // Rule 1 precedes the zero-candidate rule for the primary field.
        assert_eq!(outcome, MergeOutcome::Applied);
        assert_eq!(field.value, FieldValue::Number(0.0));
    }

    #[test]
    fn test_provenance_default() {
        let p = Provenance::default();
        assert_eq!(p.origin, ValueOrigin::Empty);
        assert!(p.last_written.is_none());
    }
}
