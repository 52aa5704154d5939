//! The engine facade.
//!
//! `RowEngine` owns the store and the component state machines and wires
//! them together: user edits trigger cascades, calculation and copy
//! results land through the merge policy, validation replaces row
//! results wholesale, and saving is gated on a clean batch.
//!
//! Time is explicit: hosts pass `now_ms` into every entry point and call
//! `poll` as their clock advances. The engine never reads a wall clock.

use planbook_core::{FieldKey, FieldKind, FieldValue, ValueOrigin};
use planbook_config::EngineSettings;

use crate::batch::{BatchSummary, BatchValidationAggregator};
use crate::cascade::{CascadeResolver, DEFAULT_DEBOUNCE_MS};
use crate::events::{BatchValidatedEvent, EventCollector, RowEvent};
use crate::lifecycle::RowLifecycleManager;
use crate::merge::{merge_candidate, MergeOutcome, MergePolicy};
use crate::row::RowId;
use crate::schema::{ImpactInfo, Schema};
use crate::sources::{
    CalculationService, FetchError, OptionSource, PersistenceLayer, RowSnapshot, SaveReport,
};
use crate::store::RowStore;
use crate::validation::{RowValidationResult, RuleSet};

/// Tunables the engine is constructed with.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub debounce_ms: u64,
    pub copy_retry_delay_ms: u64,
    pub message_grace_ms: u64,
    pub merge_policy: MergePolicy,
    pub template_suppression_root: FieldKey,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            copy_retry_delay_ms: 500,
            message_grace_ms: 1500,
            merge_policy: MergePolicy::default(),
            template_suppression_root: FieldKey::from("cost_center"),
        }
    }
}

impl EngineOptions {
    /// Map deployment settings onto engine options.
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            debounce_ms: settings.debounce_ms,
            copy_retry_delay_ms: settings.copy_retry_delay_ms,
            message_grace_ms: settings.message_grace_ms,
            merge_policy: MergePolicy {
                primary_recalc_field: FieldKey::from(settings.primary_recalc_field.as_str()),
            },
            template_suppression_root: FieldKey::from(
                settings.template_suppression_root.as_str(),
            ),
        }
    }
}

/// Errors surfaced by the facade.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// No row with this id.
    UnknownRow(RowId),
    /// The field does not exist on this row (wrong key, or excluded for
    /// the row's company).
    UnknownField(RowId, FieldKey),
    /// The row has not finished populating its option lists.
    RowNotReady(RowId),
    /// A validate-all pass is already running.
    ValidationInFlight,
    /// The batch has errors; saving is blocked.
    SaveBlocked { errors: usize },
    /// A remote call failed.
    Remote(FetchError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::UnknownRow(id) => write!(f, "unknown row {}", id),
            EngineError::UnknownField(id, key) => write!(f, "no field {} on {}", key, id),
            EngineError::RowNotReady(id) => write!(f, "{} is still populating options", id),
            EngineError::ValidationInFlight => write!(f, "a validation pass is already running"),
            EngineError::SaveBlocked { errors } => {
                write!(f, "saving blocked by {} validation error(s)", errors)
            }
            EngineError::Remote(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for EngineError {}

/// The batch editing engine.
pub struct RowEngine {
    store: RowStore,
    cascade: CascadeResolver,
    batch: BatchValidationAggregator,
    lifecycle: RowLifecycleManager,
    rules: RuleSet,
    policy: MergePolicy,
    grace_ms: u64,
    events: EventCollector,
}

impl RowEngine {
    /// Build an engine over a schema and rule set.
    pub fn new(schema: Schema, rules: RuleSet, options: EngineOptions) -> Self {
        Self {
            store: RowStore::new(schema),
            cascade: CascadeResolver::new(
                options.debounce_ms,
                options.template_suppression_root,
            ),
            batch: BatchValidationAggregator::new(options.message_grace_ms),
            lifecycle: RowLifecycleManager::new(options.copy_retry_delay_ms),
            rules,
            policy: options.merge_policy,
            grace_ms: options.message_grace_ms,
            events: EventCollector::new(),
        }
    }

    /// Standard schema, standard rules, default options.
    pub fn with_defaults() -> Self {
        Self::new(Schema::standard(), RuleSet::standard(), EngineOptions::default())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn store(&self) -> &RowStore {
        &self.store
    }

    pub fn events(&self) -> &EventCollector {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Is a field required for a company, per the rule table?
    pub fn is_required(&self, key: &FieldKey, company: &str) -> bool {
        self.rules.is_required(key, company)
    }

    /// Reload impact of changing a field.
    pub fn impact_of(&self, key: &FieldKey) -> ImpactInfo {
        self.store.schema().impact_of(key)
    }

    /// True once the row accepts writes.
    pub fn row_ready(&self, id: RowId) -> bool {
        self.store.row(id).map_or(false, |r| r.is_ready())
    }

    /// True if the row has been calculated before, meaning a re-run
    /// should be confirmed by the user first.
    pub fn needs_recalc_confirmation(&self, id: RowId) -> bool {
        self.store.row(id).map_or(false, |r| r.calculated_once)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a row; it becomes `Ready` once its root lists settle.
    pub fn create_row(&mut self, company: &str, now_ms: u64) -> RowId {
        self.lifecycle
            .create_row(&mut self.store, &mut self.cascade, company, now_ms)
    }

    /// Duplicate a row; population runs as the target settles.
    pub fn copy_row(&mut self, source: RowId, now_ms: u64) -> Result<RowId, EngineError> {
        self.lifecycle
            .copy_row(&mut self.store, &mut self.cascade, source, now_ms)
            .ok_or(EngineError::UnknownRow(source))
    }

    /// Delete a row and all of its state.
    pub fn delete_row(&mut self, id: RowId) -> bool {
        self.lifecycle
            .delete_row(&mut self.store, &mut self.cascade, id, &mut self.events)
    }

    /// Mark a row as an allocation template: its cost-center subtree is
    /// frozen against cascades.
    pub fn set_template_locked(&mut self, id: RowId, locked: bool) -> Result<(), EngineError> {
        let row = self
            .store
            .row_mut(id)
            .ok_or(EngineError::UnknownRow(id))?;
        row.locked_template = locked;
        Ok(())
    }

    /// Drive pending work: due option reloads, lifecycle transitions,
    /// and display-text grace windows.
    pub fn poll(&mut self, source: &dyn OptionSource, now_ms: u64) {
        self.cascade
            .poll(&mut self.store, source, &mut self.events, now_ms);
        self.lifecycle.advance(
            &mut self.store,
            &mut self.cascade,
            &self.policy,
            &mut self.events,
            now_ms,
        );
        self.batch.refresh_displays(&mut self.store, now_ms);
    }

    // =========================================================================
    // Editing
    // =========================================================================

    /// Direct user input into a field. Selects cascade their descendants.
    pub fn set_user_value(
        &mut self,
        id: RowId,
        key: &FieldKey,
        input: &str,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        if !self.row_ready(id) {
            return Err(self.row_error(id));
        }
        let row = self.store.row_mut(id).ok_or(EngineError::UnknownRow(id))?;
        let field = row
            .field_mut(key)
            .ok_or_else(|| EngineError::UnknownField(id, key.clone()))?;
        let kind = field.kind;
        field.set_user_value(input);
        self.store.bump_revision();

        if kind == FieldKind::Select {
            self.cascade
                .on_field_changed(&mut self.store, id, key, now_ms);
        }

        crate::batch::validate_one(&mut self.store, &self.rules, id, now_ms, 0);
        Ok(())
    }

    /// Pick an option on a select field. Returns false if the value is
    /// not in the current list.
    pub fn select_option(
        &mut self,
        id: RowId,
        key: &FieldKey,
        value: &str,
        now_ms: u64,
    ) -> Result<bool, EngineError> {
        if !self.row_ready(id) {
            return Err(self.row_error(id));
        }
        let row = self.store.row_mut(id).ok_or(EngineError::UnknownRow(id))?;
        let field = row
            .field_mut(key)
            .ok_or_else(|| EngineError::UnknownField(id, key.clone()))?;
        if !field.select_option(value) {
            return Ok(false);
        }
        self.store.bump_revision();
        self.cascade
            .on_field_changed(&mut self.store, id, key, now_ms);
        crate::batch::validate_one(&mut self.store, &self.rules, id, now_ms, 0);
        Ok(true)
    }

    // =========================================================================
    // Calculation
    // =========================================================================

    /// Run the remote calculation for a row and merge its candidates.
    ///
    /// Candidates for fields the row does not carry are dropped; every
    /// accepted candidate goes through the merge policy with origin
    /// `Calculated`. The row is re-validated afterwards.
    pub fn calculate(
        &mut self,
        service: &dyn CalculationService,
        id: RowId,
        now_ms: u64,
    ) -> Result<Vec<(FieldKey, MergeOutcome)>, EngineError> {
        if !self.row_ready(id) {
            return Err(self.row_error(id));
        }
        let snapshot = {
            let row = self.store.row(id).ok_or(EngineError::UnknownRow(id))?;
            RowSnapshot::of(row)
        };

        let candidates = service.compute(&snapshot).map_err(EngineError::Remote)?;

        let mut outcomes = Vec::with_capacity(candidates.len());
        {
            let row = self.store.row_mut(id).ok_or(EngineError::UnknownRow(id))?;
            for (key, amount) in candidates {
                let Some(field) = row.field_mut(&key) else {
                    // Not part of this company's schema; never populated.
                    continue;
                };
                if field.kind != FieldKind::Number {
                    continue;
                }
                let candidate = FieldValue::Number(amount);
                let display = candidate.display();
                let outcome = merge_candidate(
                    field,
                    candidate,
                    display,
                    ValueOrigin::Calculated,
                    &self.policy,
                );
                outcomes.push((key, outcome));
            }
            row.calculated_once = true;
        }
        self.store.bump_revision();

        crate::batch::validate_one(&mut self.store, &self.rules, id, now_ms, 0);
        Ok(outcomes)
    }

    // =========================================================================
    // Validation & save
    // =========================================================================

    /// Validate one row on demand.
    pub fn validate_row(
        &mut self,
        id: RowId,
        now_ms: u64,
    ) -> Result<RowValidationResult, EngineError> {
        crate::batch::validate_one(&mut self.store, &self.rules, id, now_ms, self.grace_ms)
            .ok_or(EngineError::UnknownRow(id))
    }

    /// Validate every row. Returns `None` (a no-op) while another pass is
    /// in flight.
    pub fn validate_all(&mut self, now_ms: u64) -> Option<BatchSummary> {
        let summary = self
            .batch
            .validate_all(&mut self.store, &self.rules, now_ms)?;
        log::debug!("{}", summary.log_line());
        self.events.push(RowEvent::BatchValidated(BatchValidatedEvent {
            revision: self.store.revision(),
            summary: summary.clone(),
        }));
        Some(summary)
    }

    /// Validate everything and persist, all-or-nothing from the engine's
    /// side: any validation error blocks the call.
    pub fn save(
        &mut self,
        sink: &dyn PersistenceLayer,
        now_ms: u64,
    ) -> Result<SaveReport, EngineError> {
        let summary = self
            .validate_all(now_ms)
            .ok_or(EngineError::ValidationInFlight)?;
        if !summary.is_saveable() {
            return Err(EngineError::SaveBlocked {
                errors: summary.total_errors,
            });
        }

        let snapshots: Vec<RowSnapshot> =
            self.store.rows().iter().map(RowSnapshot::of).collect();
        sink.save(&snapshots).map_err(EngineError::Remote)
    }

    fn row_error(&self, id: RowId) -> EngineError {
        if self.store.row(id).is_some() {
            EngineError::RowNotReady(id)
        } else {
            EngineError::UnknownRow(id)
        }
    }
}
