//! Cascading option reloads.
//!
//! When an upstream selection changes, every downstream option list must
//! be cleared and refetched, parents before children. Reloads are
//! debounced per (row, field) and carry a monotone request token: a newer
//! schedule for the same slot fully supersedes an older one, and the
//! older request's completion is discarded if it ever arrives.
//!
//! Filters for a reload are snapshotted when the reload is scheduled, so
//! a completion never reads ancestor values newer than the change that
//! caused it.

use rustc_hash::FxHashMap;

use planbook_core::{FieldKey, FieldKind, FieldValue, OptionItem};

use crate::events::{
    EventCollector, OptionsLoadedEvent, OptionsUnavailableEvent, ReloadDiscardedEvent, RowEvent,
};
use crate::field::OptionState;
use crate::row::RowId;
use crate::sources::{FetchError, OptionFilters, OptionSource};
use crate::store::RowStore;

/// Default debounce window between an upstream edit and the reload.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// One reload ready to be issued against an `OptionSource`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadRequest {
    pub row: RowId,
    pub field: FieldKey,
    pub token: u64,
    /// Ancestor values as of schedule time.
    pub filters: OptionFilters,
}

#[derive(Debug, Clone)]
struct PendingReload {
    token: u64,
    due_at_ms: u64,
    filters: OptionFilters,
}

/// Schedules, debounces, and applies option reloads.
#[derive(Debug)]
pub struct CascadeResolver {
    debounce_ms: u64,
    /// Template rows freeze this field and everything below it.
    suppression_root: FieldKey,
    next_token: u64,
    /// Reloads waiting out their debounce window.
    pending: FxHashMap<(RowId, FieldKey), PendingReload>,
    /// Reloads issued but not yet completed, by token.
    in_flight: FxHashMap<(RowId, FieldKey), u64>,
    /// Highest token ever issued per slot; completions must match it.
    latest: FxHashMap<(RowId, FieldKey), u64>,
}

impl CascadeResolver {
    pub fn new(debounce_ms: u64, suppression_root: FieldKey) -> Self {
        Self {
            debounce_ms,
            suppression_root,
            next_token: 1,
            pending: FxHashMap::default(),
            in_flight: FxHashMap::default(),
            latest: FxHashMap::default(),
        }
    }

    /// An upstream field changed: clear and schedule every affected
    /// descendant's option list.
    pub fn on_field_changed(
        &mut self,
        store: &mut RowStore,
        row_id: RowId,
        changed: &FieldKey,
        now_ms: u64,
    ) {
        let (company, locked) = match store.row(row_id) {
            Some(row) => (row.company().to_string(), row.locked_template),
            None => return,
        };

        let descendants: Vec<FieldKey> = store
            .schema()
            .graph()
            .descendants_of(changed)
            .into_iter()
            .filter(|key| store.schema().applies_to(key, &company))
            .filter(|key| {
                // Template rows keep the frozen subtree as-is but still
                // cascade the rest (year, format, ...).
                !(locked && store.schema().graph().depends_on(key, &self.suppression_root))
            })
            .collect();

        if descendants.is_empty() {
            return;
        }

        // Ancestor filters per descendant, resolved against the schema
        // before mutating the row.
        let filter_keys: Vec<(FieldKey, Vec<FieldKey>)> = descendants
            .iter()
            .map(|key| {
                let ancestors = store
                    .schema()
                    .graph()
                    .ancestors_of(key)
                    .into_iter()
                    .filter(|a| store.schema().applies_to(a, &company))
                    .collect();
                (key.clone(), ancestors)
            })
            .collect();

        let Some(row) = store.row_mut(row_id) else {
            return;
        };
        for key in &descendants {
            if let Some(field) = row.field_mut(key) {
                field.clear();
                field.options = OptionState::NotLoaded;
            }
        }

        // Snapshot after clearing: the changed field carries its new
        // value, cleared descendants contribute Empty.
        let snapshot = store.value_snapshot(row_id);

        for (key, ancestors) in filter_keys {
            let filters: OptionFilters = ancestors
                .into_iter()
                .map(|a| {
                    let value = snapshot.get(&a).cloned().unwrap_or(FieldValue::Empty);
                    (a, value)
                })
                .collect();
            self.schedule(row_id, key, filters, now_ms);
        }
    }

    /// Schedule the initial option loads of a freshly created row: the
    /// cascade runs from the root fields, so every applicable selection
    /// list loads, children filtered by whatever ancestor values exist
    /// (none, on a fresh row).
    pub fn schedule_initial_loads(&mut self, store: &RowStore, row_id: RowId, now_ms: u64) {
        let company = match store.row(row_id) {
            Some(row) => row.company().to_string(),
            None => return,
        };
        let snapshot = store.value_snapshot(row_id);

        let selects: Vec<FieldKey> = store
            .schema()
            .defs_for_company(&company)
            .filter(|def| def.kind == FieldKind::Select)
            .map(|def| def.key.clone())
            .collect();

        for key in selects {
            let filters: OptionFilters = store
                .schema()
                .graph()
                .ancestors_of(&key)
                .into_iter()
                .filter(|a| store.schema().applies_to(a, &company))
                .map(|a| {
                    let value = snapshot.get(&a).cloned().unwrap_or(FieldValue::Empty);
                    (a, value)
                })
                .collect();
            self.schedule(row_id, key, filters, now_ms);
        }
    }

    /// Refresh the option lists directly below a field without touching
    /// the children's values.
    ///
    /// The copy path owns the values it is placing; it only needs the
    /// lists re-filtered under the newly applied parent.
    pub fn schedule_children_refresh(
        &mut self,
        store: &RowStore,
        row_id: RowId,
        parent: &FieldKey,
        now_ms: u64,
    ) {
        let company = match store.row(row_id) {
            Some(row) => row.company().to_string(),
            None => return,
        };
        let snapshot = store.value_snapshot(row_id);

        let children: Vec<FieldKey> = store
            .schema()
            .graph()
            .children(parent)
            .filter(|key| store.schema().applies_to(key, &company))
            .cloned()
            .collect();

        for key in children {
            let filters: OptionFilters = store
                .schema()
                .graph()
                .ancestors_of(&key)
                .into_iter()
                .filter(|a| store.schema().applies_to(a, &company))
                .map(|a| {
                    let value = snapshot.get(&a).cloned().unwrap_or(FieldValue::Empty);
                    (a, value)
                })
                .collect();
            self.schedule(row_id, key, filters, now_ms);
        }
    }

    /// Put one reload on the debounce clock, superseding any pending one
    /// for the same slot.
    fn schedule(&mut self, row: RowId, field: FieldKey, filters: OptionFilters, now_ms: u64) {
        let token = self.next_token;
        self.next_token += 1;

        let slot = (row, field);
        self.latest.insert(slot.clone(), token);
        self.pending.insert(
            slot,
            PendingReload {
                token,
                due_at_ms: now_ms + self.debounce_ms,
                filters,
            },
        );
    }

    /// Drain reloads whose debounce window has elapsed, in topological
    /// order (a row's parents always before its children).
    pub fn due_requests(&mut self, store: &RowStore, now_ms: u64) -> Vec<ReloadRequest> {
        let mut due: Vec<(RowId, FieldKey)> = self
            .pending
            .iter()
            .filter(|(_, p)| p.due_at_ms <= now_ms)
            .map(|(slot, _)| slot.clone())
            .collect();

        due.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| {
                    store
                        .schema()
                        .topo_position(&a.1)
                        .cmp(&store.schema().topo_position(&b.1))
                })
                .then_with(|| a.1.cmp(&b.1))
        });

        due.into_iter()
            .filter_map(|slot| {
                let pending = self.pending.remove(&slot)?;
                self.in_flight.insert(slot.clone(), pending.token);
                Some(ReloadRequest {
                    row: slot.0,
                    field: slot.1,
                    token: pending.token,
                    filters: pending.filters,
                })
            })
            .collect()
    }

    /// Apply one completed reload.
    ///
    /// A completion whose token is no longer the latest for its slot is
    /// dropped on the floor: the field was re-scheduled (or the row
    /// removed) after this request was issued, so its payload describes a
    /// world that no longer exists. Logged, never surfaced.
    pub fn complete(
        &mut self,
        store: &mut RowStore,
        request: &ReloadRequest,
        outcome: Result<Vec<OptionItem>, FetchError>,
        events: &mut EventCollector,
    ) {
        let slot = (request.row, request.field.clone());

        if self.in_flight.get(&slot) == Some(&request.token) {
            self.in_flight.remove(&slot);
        }

        if self.latest.get(&slot) != Some(&request.token) {
            log::debug!(
                "discarding stale option reload for {} {} (token {})",
                request.row,
                request.field,
                request.token
            );
            events.push(RowEvent::ReloadDiscarded(ReloadDiscardedEvent {
                revision: store.revision(),
                row: request.row,
                field: request.field.clone(),
            }));
            return;
        }
        self.latest.remove(&slot);

        let revision = store.bump_revision();
        let Some(row) = store.row_mut(request.row) else {
            return;
        };
        let Some(field) = row.field_mut(&request.field) else {
            return;
        };

        match outcome {
            Ok(items) => {
                let count = items.len();
                field.options = OptionState::Loaded(items);
                events.push(RowEvent::OptionsLoaded(OptionsLoadedEvent {
                    revision,
                    row: request.row,
                    field: request.field.clone(),
                    count,
                }));
            }
            Err(err) => {
                log::warn!(
                    "option fetch failed for {} {}: {}",
                    request.row,
                    request.field,
                    err
                );
                field.options = OptionState::Unavailable;
                events.push(RowEvent::OptionsUnavailable(OptionsUnavailableEvent {
                    revision,
                    row: request.row,
                    field: request.field.clone(),
                }));
            }
        }
    }

    /// Drive every due reload through the source. Returns the number of
    /// completions applied or discarded.
    pub fn poll(
        &mut self,
        store: &mut RowStore,
        source: &dyn OptionSource,
        events: &mut EventCollector,
        now_ms: u64,
    ) -> usize {
        let requests = self.due_requests(store, now_ms);
        let count = requests.len();
        for request in requests {
            let outcome = source.fetch(&request.field, &request.filters);
            self.complete(store, &request, outcome, events);
        }
        count
    }

    /// True while the row has reloads pending or in flight.
    pub fn has_pending(&self, row: RowId) -> bool {
        self.pending.keys().any(|(r, _)| *r == row)
            || self.in_flight.keys().any(|(r, _)| *r == row)
    }

    /// Forget everything scheduled for a row (row deletion).
    pub fn remove_row(&mut self, row: RowId) {
        self.pending.retain(|(r, _), _| *r != row);
        self.in_flight.retain(|(r, _), _| *r != row);
        self.latest.retain(|(r, _), _| *r != row);
    }

    /// Number of reloads waiting out their debounce window.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::schema::Schema;

    /// Scripted option source: records every fetch, answers from a table.
    #[derive(Default)]
    struct ScriptedSource {
        calls: RefCell<Vec<(FieldKey, OptionFilters)>>,
        failing: Vec<FieldKey>,
    }

    impl ScriptedSource {
        fn failing_on(fields: &[&str]) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                failing: fields.iter().map(|f| FieldKey::from(*f)).collect(),
            }
        }

        fn calls(&self) -> Vec<(FieldKey, OptionFilters)> {
            self.calls.borrow().clone()
        }
    }

    impl OptionSource for ScriptedSource {
        fn fetch(
            &self,
            field: &FieldKey,
            filters: &OptionFilters,
        ) -> Result<Vec<OptionItem>, FetchError> {
            self.calls.borrow_mut().push((field.clone(), filters.clone()));
            if self.failing.contains(field) {
                return Err(FetchError::Network("unreachable".into()));
            }
            Ok(vec![
                OptionItem::plain(format!("{}-1", field)),
                OptionItem::plain(format!("{}-2", field)),
            ])
        }
    }

    fn setup() -> (RowStore, CascadeResolver, EventCollector) {
        let store = RowStore::new(Schema::standard());
        let cascade = CascadeResolver::new(DEFAULT_DEBOUNCE_MS, FieldKey::from("cost_center"));
        (store, cascade, EventCollector::new())
    }

    fn select(store: &mut RowStore, row: RowId, key: &str, value: &str) {
        let field = store
            .row_mut(row)
            .unwrap()
            .field_mut(&FieldKey::from(key))
            .unwrap();
        field.value = FieldValue::Text(value.to_string());
    }

    #[test]
    fn test_change_schedules_descendants_and_clears_values() {
        let (mut store, mut cascade, _events) = setup();
        let row = store.insert_row("BJC");

        select(&mut store, row, "cost_center", "1100");
        select(&mut store, row, "division", "D1");

        cascade.on_field_changed(&mut store, row, &FieldKey::from("cost_center"), 0);

        // division was cleared, and everything below cost_center is scheduled.
        assert_eq!(
            store.row(row).unwrap().value(&FieldKey::from("division")),
            FieldValue::Empty
        );
        assert!(cascade.pending_count() >= 7);
        assert!(cascade.has_pending(row));
    }

    #[test]
    fn test_debounce_coalesces_rapid_changes() {
        let (mut store, mut cascade, mut events) = setup();
        let row = store.insert_row("BJC");
        let source = ScriptedSource::default();

        select(&mut store, row, "job_band", "B4");
        cascade.on_field_changed(&mut store, row, &FieldKey::from("job_band"), 0);
        select(&mut store, row, "job_band", "B5");
        cascade.on_field_changed(&mut store, row, &FieldKey::from("job_band"), 100);

        // Nothing due inside the window of the second change.
        assert_eq!(cascade.poll(&mut store, &source, &mut events, 250), 0);

        // One fetch per descendant, not two.
        cascade.poll(&mut store, &source, &mut events, 400);
        let salary_calls = source
            .calls()
            .iter()
            .filter(|(f, _)| f == &FieldKey::from("salary_structure"))
            .count();
        assert_eq!(salary_calls, 1);
    }

    #[test]
    fn test_reloads_issue_in_topological_order() {
        let (mut store, mut cascade, _events) = setup();
        let row = store.insert_row("BJC");

        select(&mut store, row, "year", "2026");
        cascade.on_field_changed(&mut store, row, &FieldKey::from("year"), 0);

        let requests = cascade.due_requests(&store, 300);
        let pos = |key: &str| {
            requests
                .iter()
                .position(|r| r.field == FieldKey::from(key))
                .unwrap()
        };
        assert!(pos("cost_center") < pos("division"));
        assert!(pos("division") < pos("department"));
        assert!(pos("store") < pos("position"));
    }

    #[test]
    fn test_filters_are_snapshotted_at_schedule_time() {
        let (mut store, mut cascade, mut events) = setup();
        let row = store.insert_row("BJC");
        let source = ScriptedSource::default();

        select(&mut store, row, "company", "BJC");
        select(&mut store, row, "format", "HYP");
        select(&mut store, row, "year", "2026");
        cascade.on_field_changed(&mut store, row, &FieldKey::from("year"), 0);

        // The year value changes *after* scheduling, without rescheduling.
        select(&mut store, row, "year", "2027");

        cascade.poll(&mut store, &source, &mut events, 300);

        let (_, filters) = source
            .calls()
            .into_iter()
            .find(|(f, _)| f == &FieldKey::from("cost_center"))
            .unwrap();
        let year = filters
            .iter()
            .find(|(k, _)| k == &FieldKey::from("year"))
            .map(|(_, v)| v.clone());
        assert_eq!(year, Some(FieldValue::Text("2026".to_string())));
    }

    #[test]
    fn test_stale_completion_is_discarded() {
        let (mut store, mut cascade, mut events) = setup();
        let row = store.insert_row("BJC");

        select(&mut store, row, "job_band", "B4");
        cascade.on_field_changed(&mut store, row, &FieldKey::from("job_band"), 0);
        let old_requests = cascade.due_requests(&store, 300);
        let old = old_requests
            .iter()
            .find(|r| r.field == FieldKey::from("salary_structure"))
            .unwrap()
            .clone();

        // A newer change supersedes the in-flight request.
        select(&mut store, row, "job_band", "B5");
        cascade.on_field_changed(&mut store, row, &FieldKey::from("job_band"), 350);

        cascade.complete(
            &mut store,
            &old,
            Ok(vec![OptionItem::plain("stale")]),
            &mut events,
        );

        let field = store
            .row(row)
            .unwrap()
            .field(&FieldKey::from("salary_structure"))
            .unwrap()
            .clone();
        assert_eq!(field.options, OptionState::NotLoaded);
        assert_eq!(events.reloads_discarded().len(), 1);
        assert!(events.options_loaded().is_empty());
    }

    #[test]
    fn test_fetch_failure_leaves_placeholder_and_warning_state() {
        let (mut store, mut cascade, mut events) = setup();
        let row = store.insert_row("BJC");
        let source = ScriptedSource::failing_on(&["division"]);

        select(&mut store, row, "cost_center", "1100");
        cascade.on_field_changed(&mut store, row, &FieldKey::from("cost_center"), 0);
        cascade.poll(&mut store, &source, &mut events, 300);

        let field = store
            .row(row)
            .unwrap()
            .field(&FieldKey::from("division"))
            .unwrap()
            .clone();
        assert_eq!(field.options, OptionState::Unavailable);
        assert!(store.row(row).unwrap().has_unresolved_dependency());
        assert_eq!(events.options_unavailable().len(), 1);

        // Other descendants loaded fine.
        assert!(!events.options_loaded().is_empty());
    }

    #[test]
    fn test_template_row_keeps_frozen_subtree() {
        let (mut store, mut cascade, _events) = setup();
        let row = store.insert_row("BJC");
        store.row_mut(row).unwrap().locked_template = true;

        select(&mut store, row, "cost_center", "1100");
        select(&mut store, row, "company", "BJC");
        cascade.on_field_changed(&mut store, row, &FieldKey::from("company"), 0);

        let requests = cascade.due_requests(&store, 300);
        let fields: Vec<&str> = requests.iter().map(|r| r.field.as_str()).collect();

        // format/year still cascade; the cost-center subtree does not.
        assert!(fields.contains(&"format"));
        assert!(fields.contains(&"year"));
        assert!(!fields.contains(&"cost_center"));
        assert!(!fields.contains(&"division"));
        assert!(!fields.contains(&"position"));

        // The frozen value survived.
        assert_eq!(
            store.row(row).unwrap().value(&FieldKey::from("cost_center")),
            FieldValue::Text("1100".to_string())
        );
    }

    #[test]
    fn test_initial_loads_cover_every_select() {
        let (mut store, mut cascade, mut events) = setup();
        let row = store.insert_row("BJC");
        let source = ScriptedSource::default();

        cascade.schedule_initial_loads(&store, row, 0);
        assert!(cascade.has_pending(row));
        // One reload per selection field.
        assert_eq!(cascade.pending_count(), 14);

        cascade.poll(&mut store, &source, &mut events, 300);
        assert!(!cascade.has_pending(row));

        for key in ["company", "format", "salary_structure", "run_rate_group"] {
            let field = store
                .row(row)
                .unwrap()
                .field(&FieldKey::from(key))
                .unwrap()
                .clone();
            assert!(field.options.is_loaded(), "{} not loaded", key);
        }

        // Roots fetch with no filters; children carry their (empty)
        // ancestor values.
        let calls = source.calls();
        let (_, company_filters) = calls
            .iter()
            .find(|(f, _)| f == &FieldKey::from("company"))
            .unwrap();
        assert!(company_filters.is_empty());

        let (_, format_filters) = calls
            .iter()
            .find(|(f, _)| f == &FieldKey::from("format"))
            .unwrap();
        assert_eq!(
            format_filters,
            &vec![(FieldKey::from("company"), FieldValue::Empty)]
        );
    }

    #[test]
    fn test_remove_row_purges_schedules() {
        let (mut store, mut cascade, _events) = setup();
        let row = store.insert_row("BJC");

        cascade.schedule_initial_loads(&store, row, 0);
        assert!(cascade.has_pending(row));

        cascade.remove_row(row);
        assert!(!cascade.has_pending(row));
        assert_eq!(cascade.pending_count(), 0);
    }
}
