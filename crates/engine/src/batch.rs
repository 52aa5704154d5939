//! Batch-level validation.
//!
//! Validates every row strictly sequentially and folds the results into
//! one `BatchSummary`. Only one pass may be in flight at a time; a second
//! request while one is running is a no-op.
//!
//! Displayed diagnostic text is preserved across a pass: the aggregator
//! re-validates with fresh rules but keeps the text a user is currently
//! reading on screen until a short grace window passes. Counts and
//! validity always come from the fresh computation.

use serde::{Deserialize, Serialize};

use crate::row::RowId;
use crate::store::RowStore;
use crate::validation::{validate_row, RowValidationResult, RuleSet};

/// Aggregate outcome of one validate-all pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: Vec<RowId>,
    pub warning_rows: Vec<RowId>,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl BatchSummary {
    /// Concise one-line summary for hosts.
    pub fn summary(&self) -> String {
        format!(
            "{} of {} rows valid, {} errors, {} warnings",
            self.valid_rows, self.total_rows, self.total_errors, self.total_warnings
        )
    }

    /// One-line log entry.
    ///
    /// Format: `[validate/all]  12 rows  valid=10  errors=3  warnings=2`
    pub fn log_line(&self) -> String {
        format!(
            "[validate/all] {:>3} rows  valid={}  errors={}  warnings={}",
            self.total_rows, self.valid_rows, self.total_errors, self.total_warnings
        )
    }

    /// True when nothing blocks saving.
    pub fn is_saveable(&self) -> bool {
        self.total_errors == 0
    }

    fn fold(&mut self, row: RowId, result: &RowValidationResult) {
        self.total_rows += 1;
        self.total_errors += result.errors.len();
        self.total_warnings += result.warnings.len();
        if result.is_valid {
            self.valid_rows += 1;
        } else {
            self.invalid_rows.push(row);
        }
        if !result.warnings.is_empty() {
            self.warning_rows.push(row);
        }
    }
}

/// Progress of one aggregator step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// No pass is in flight.
    Idle,
    /// One row was validated; more remain.
    RowValidated(RowId),
    /// The pass finished.
    Finished(BatchSummary),
}

#[derive(Debug)]
struct PassState {
    queue: Vec<RowId>,
    cursor: usize,
    summary: BatchSummary,
}

/// Runs validate-all passes, one row per step.
#[derive(Debug)]
pub struct BatchValidationAggregator {
    grace_ms: u64,
    pass: Option<PassState>,
}

impl BatchValidationAggregator {
    pub fn new(grace_ms: u64) -> Self {
        Self {
            grace_ms,
            pass: None,
        }
    }

    /// True while a pass is running.
    pub fn in_flight(&self) -> bool {
        self.pass.is_some()
    }

    /// Start a pass over the store's current rows.
    ///
    /// Returns false (and does nothing) if a pass is already in flight.
    pub fn begin(&mut self, store: &RowStore) -> bool {
        if self.pass.is_some() {
            return false;
        }
        self.pass = Some(PassState {
            queue: store.row_ids(),
            cursor: 0,
            summary: BatchSummary::default(),
        });
        true
    }

    /// Validate the next row of the in-flight pass.
    pub fn step(&mut self, store: &mut RowStore, rules: &RuleSet, now_ms: u64) -> StepOutcome {
        let Some(pass) = self.pass.as_mut() else {
            return StepOutcome::Idle;
        };

        // Advance past rows deleted since begin().
        let next = loop {
            match pass.queue.get(pass.cursor) {
                None => break None,
                Some(&id) => {
                    pass.cursor += 1;
                    if store.row(id).is_some() {
                        break Some(id);
                    }
                }
            }
        };

        let Some(row_id) = next else {
            let summary = self.pass.take().map(|p| p.summary).unwrap_or_default();
            return StepOutcome::Finished(summary);
        };

        let Some(row) = store.row(row_id) else {
            return StepOutcome::RowValidated(row_id);
        };
        let result = validate_row(row, rules);
        pass.summary.fold(row_id, &result);

        apply_result(store, row_id, result, now_ms, self.grace_ms);
        StepOutcome::RowValidated(row_id)
    }

    /// Run a whole pass in one call. Returns `None` if one was already in
    /// flight (the call is a no-op, per the concurrency guard).
    pub fn validate_all(
        &mut self,
        store: &mut RowStore,
        rules: &RuleSet,
        now_ms: u64,
    ) -> Option<BatchSummary> {
        if !self.begin(store) {
            return None;
        }
        loop {
            match self.step(store, rules, now_ms) {
                StepOutcome::RowValidated(_) => continue,
                StepOutcome::Finished(summary) => return Some(summary),
                StepOutcome::Idle => unreachable!("pass begun above"),
            }
        }
    }

    /// Swap preserved display text for fresh text where the grace window
    /// has elapsed.
    pub fn refresh_displays(&self, store: &mut RowStore, now_ms: u64) {
        for id in store.row_ids() {
            if let Some(row) = store.row_mut(id) {
                row.display.refresh(now_ms);
            }
        }
    }
}

/// Install a fresh validation result on a row: replaces the previous
/// result wholesale, mirrors statuses onto the fields, and routes the
/// display text through the preservation window.
fn apply_result(
    store: &mut RowStore,
    row_id: RowId,
    result: RowValidationResult,
    now_ms: u64,
    grace_ms: u64,
) {
    let Some(row) = store.row_mut(row_id) else {
        return;
    };

    let statuses: Vec<_> = result
        .field_statuses
        .iter()
        .map(|(k, s)| (k.clone(), *s))
        .collect();
    for (key, status) in statuses {
        if let Some(field) = row.field_mut(&key) {
            field.status = status;
        }
    }

    row.display
        .show(result.all_diagnostics(), now_ms, grace_ms);
    row.validation = result;
}

/// Validate a single row on demand (field change, row-level refresh).
///
/// Same replacement semantics as a batch pass, without the summary.
pub fn validate_one(
    store: &mut RowStore,
    rules: &RuleSet,
    row_id: RowId,
    now_ms: u64,
    grace_ms: u64,
) -> Option<RowValidationResult> {
    let row = store.row(row_id)?;
    let result = validate_row(row, rules);
    apply_result(store, row_id, result.clone(), now_ms, grace_ms);
    Some(result)
}
