//! Row lifecycle orchestration.
//!
//! Creation waits for the cascade to settle before a row is declared
//! ready; duplication snapshots the source, populates the target through
//! the merge policy with one bounded retry for options that had not
//! arrived yet; deletion removes a row and everything scheduled for it
//! in one step.

use rustc_hash::FxHashMap;

use planbook_core::{FieldKey, FieldKind, FieldValue, ValueOrigin};

use crate::cascade::CascadeResolver;
use crate::events::{CopyCompletedEvent, EventCollector, RowDeletedEvent, RowEvent, RowReadyEvent};
use crate::merge::{merge_candidate, MergePolicy};
use crate::row::{RowId, RowState};
use crate::store::RowStore;

/// One copied field: key, value, and the display label it carried on the
/// source row.
type CopiedValue = (FieldKey, FieldValue, String);

#[derive(Debug, Clone)]
enum CopyStage {
    /// Waiting for the target row's option lists to settle.
    AwaitingReady,
    /// First pass done; some options had not arrived. One retry remains.
    AwaitingRetry { due_at_ms: u64, fields: Vec<FieldKey> },
}

#[derive(Debug, Clone)]
struct CopyPlan {
    values: Vec<CopiedValue>,
    stage: CopyStage,
}

/// Drives rows through `Creating → PopulatingOptions → Ready` and runs
/// copy plans against ready rows.
#[derive(Debug)]
pub struct RowLifecycleManager {
    copy_retry_delay_ms: u64,
    plans: FxHashMap<RowId, CopyPlan>,
}

impl RowLifecycleManager {
    pub fn new(copy_retry_delay_ms: u64) -> Self {
        Self {
            copy_retry_delay_ms,
            plans: FxHashMap::default(),
        }
    }

    /// Create a new row for a company and start loading its root option
    /// lists. The row stays in `PopulatingOptions` until they settle.
    pub fn create_row(
        &mut self,
        store: &mut RowStore,
        cascade: &mut CascadeResolver,
        company: &str,
        now_ms: u64,
    ) -> RowId {
        let id = store.insert_row(company);
        store.bump_revision();
        if let Some(row) = store.row_mut(id) {
            row.state = RowState::PopulatingOptions;
        }
        cascade.schedule_initial_loads(store, id, now_ms);
        id
    }

    /// Duplicate a row: snapshot every field's value and display text,
    /// create the target, and queue population for when it is ready.
    ///
    /// The target's fields are instantiated fresh from the company schema
    /// (the benefit block is regenerated, not carried over), then values
    /// land through the merge policy with origin `Copied`.
    pub fn copy_row(
        &mut self,
        store: &mut RowStore,
        cascade: &mut CascadeResolver,
        source: RowId,
        now_ms: u64,
    ) -> Option<RowId> {
        let (company, values) = {
            let row = store.row(source)?;
            let values: Vec<CopiedValue> = row
                .fields()
                .filter(|f| !f.value.is_empty())
                .map(|f| (f.key.clone(), f.value.clone(), f.display.clone()))
                .collect();
            (row.company().to_string(), values)
        };

        let target = self.create_row(store, cascade, &company, now_ms);
        self.plans.insert(
            target,
            CopyPlan {
                values,
                stage: CopyStage::AwaitingReady,
            },
        );
        Some(target)
    }

    /// Delete a row: store state, scheduled reloads, and any copy plan go
    /// in one step.
    pub fn delete_row(
        &mut self,
        store: &mut RowStore,
        cascade: &mut CascadeResolver,
        id: RowId,
        events: &mut EventCollector,
    ) -> bool {
        self.plans.remove(&id);
        cascade.remove_row(id);
        if !store.remove_row(id) {
            return false;
        }
        let revision = store.bump_revision();
        events.push(RowEvent::RowDeleted(RowDeletedEvent { revision, row: id }));
        true
    }

    /// True while a copy into `target` has not finished.
    pub fn copy_in_progress(&self, target: RowId) -> bool {
        self.plans.contains_key(&target)
    }

    /// Advance lifecycle state: promote settled rows to `Ready` and run
    /// due copy stages. Called after every cascade poll.
    pub fn advance(
        &mut self,
        store: &mut RowStore,
        cascade: &mut CascadeResolver,
        policy: &MergePolicy,
        events: &mut EventCollector,
        now_ms: u64,
    ) {
        // Promote rows whose option loads have settled.
        for id in store.row_ids() {
            let populating = store
                .row(id)
                .map_or(false, |r| r.state == RowState::PopulatingOptions);
            if populating && !cascade.has_pending(id) {
                let revision = store.bump_revision();
                if let Some(row) = store.row_mut(id) {
                    row.state = RowState::Ready;
                }
                events.push(RowEvent::RowReady(RowReadyEvent { revision, row: id }));
            }
        }

        // Run copy stages.
        let mut targets: Vec<RowId> = self.plans.keys().copied().collect();
        targets.sort();
        for target in targets {
            let Some(plan) = self.plans.get(&target) else {
                continue;
            };

            // A deleted target takes its plan with it.
            if store.row(target).is_none() {
                self.plans.remove(&target);
                continue;
            }

            match plan.stage.clone() {
                CopyStage::AwaitingReady => {
                    if !store.row(target).map_or(false, |r| r.is_ready()) {
                        continue;
                    }
                    let values = plan.values.clone();
                    let missing =
                        apply_copied_values(store, cascade, policy, target, &values, now_ms);
                    if missing.is_empty() {
                        self.finish_plan(store, target, Vec::new(), events);
                    } else if let Some(plan) = self.plans.get_mut(&target) {
                        plan.stage = CopyStage::AwaitingRetry {
                            due_at_ms: now_ms + self.copy_retry_delay_ms,
                            fields: missing,
                        };
                    }
                }
                CopyStage::AwaitingRetry { due_at_ms, fields } => {
                    if now_ms < due_at_ms {
                        continue;
                    }
                    let retry_values: Vec<CopiedValue> = plan
                        .values
                        .iter()
                        .filter(|(key, _, _)| fields.contains(key))
                        .cloned()
                        .collect();
                    let still_missing =
                        apply_copied_values(store, cascade, policy, target, &retry_values, now_ms);
                    self.finish_plan(store, target, still_missing, events);
                }
            }
        }
    }

    /// Close out a copy plan, recording any fields that never found their
    /// option. A partial copy is a warning, not a failure: the row stays
    /// usable.
    fn finish_plan(
        &mut self,
        store: &mut RowStore,
        target: RowId,
        missing: Vec<FieldKey>,
        events: &mut EventCollector,
    ) {
        self.plans.remove(&target);
        if !missing.is_empty() {
            log::warn!(
                "copy into {} left {} field(s) unpopulated: {}",
                target,
                missing.len(),
                missing
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        if let Some(row) = store.row_mut(target) {
            row.copy_misses = missing.clone();
        }
        events.push(RowEvent::CopyCompleted(CopyCompletedEvent {
            revision: store.revision(),
            row: target,
            missing,
        }));
    }
}

/// Apply copied values to a ready row, parents before children.
///
/// Selection values only land if their option is present in the target's
/// current list; each applied selection refreshes the lists directly
/// below it so deeper values can land on the retry. Returns the fields
/// whose option was not available.
fn apply_copied_values(
    store: &mut RowStore,
    cascade: &mut CascadeResolver,
    policy: &MergePolicy,
    target: RowId,
    values: &[CopiedValue],
    now_ms: u64,
) -> Vec<FieldKey> {
    let mut ordered: Vec<FieldKey> = values.iter().map(|(k, _, _)| k.clone()).collect();
    store.schema().sort_topologically(&mut ordered);

    let by_key: FxHashMap<&FieldKey, &CopiedValue> =
        values.iter().map(|v| (&v.0, v)).collect();

    let mut missing = Vec::new();

    for key in &ordered {
        let Some((_, value, label)) = by_key.get(key).copied() else {
            continue;
        };
        if value.is_empty() {
            continue;
        }

        let Some(row) = store.row_mut(target) else {
            return missing;
        };
        let Some(field) = row.field_mut(key) else {
            continue;
        };

        match field.kind {
            FieldKind::Select => {
                let code = match value {
                    FieldValue::Text(code) => code.clone(),
                    _ => continue,
                };
                if !field.has_option(&code) {
                    missing.push(key.clone());
                    continue;
                }
                let display = field.label_for(value).unwrap_or_else(|| label.clone());
                let applied =
                    merge_candidate(field, value.clone(), display, ValueOrigin::Copied, policy)
                        .is_applied();
                if applied {
                    store.bump_revision();
                    cascade.schedule_children_refresh(store, target, key, now_ms);
                }
            }
            FieldKind::Text | FieldKind::Number => {
                let applied = merge_candidate(
                    field,
                    value.clone(),
                    value.display(),
                    ValueOrigin::Copied,
                    policy,
                )
                .is_applied();
                if applied {
                    store.bump_revision();
                }
            }
        }
    }

    missing
}
