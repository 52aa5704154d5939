//! Event types for row change notifications.
//!
//! Hosts consume these to update a rendering layer without polling; the
//! test harness uses them to pin down ordering invariants. Every event is
//! tagged with the store revision that produced it.

use planbook_core::FieldKey;

use crate::batch::BatchSummary;
use crate::row::RowId;

/// Events emitted by the engine during lifecycle, cascade, and validation.
#[derive(Debug, Clone, PartialEq)]
pub enum RowEvent {
    /// A row finished populating its root option lists.
    RowReady(RowReadyEvent),
    /// An option list arrived for a field.
    OptionsLoaded(OptionsLoadedEvent),
    /// An option fetch failed; the field shows a placeholder.
    OptionsUnavailable(OptionsUnavailableEvent),
    /// A stale reload completion was discarded (diagnostics only).
    ReloadDiscarded(ReloadDiscardedEvent),
    /// A row copy finished, possibly with fields left uncopied.
    CopyCompleted(CopyCompletedEvent),
    /// A row was removed.
    RowDeleted(RowDeletedEvent),
    /// A validate-all pass finished.
    BatchValidated(BatchValidatedEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowReadyEvent {
    pub revision: u64,
    pub row: RowId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionsLoadedEvent {
    pub revision: u64,
    pub row: RowId,
    pub field: FieldKey,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionsUnavailableEvent {
    pub revision: u64,
    pub row: RowId,
    pub field: FieldKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReloadDiscardedEvent {
    pub revision: u64,
    pub row: RowId,
    pub field: FieldKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CopyCompletedEvent {
    pub revision: u64,
    pub row: RowId,
    /// Fields whose source value had no matching option even after the
    /// retry. Empty for a clean copy.
    pub missing: Vec<FieldKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowDeletedEvent {
    pub revision: u64,
    pub row: RowId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchValidatedEvent {
    pub revision: u64,
    pub summary: BatchSummary,
}

/// Simple event collector.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<RowEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: RowEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[RowEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Filter to only RowReady events.
    pub fn rows_ready(&self) -> Vec<&RowReadyEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RowEvent::RowReady(ev) => Some(ev),
                _ => None,
            })
            .collect()
    }

    /// Filter to only OptionsLoaded events.
    pub fn options_loaded(&self) -> Vec<&OptionsLoadedEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RowEvent::OptionsLoaded(ev) => Some(ev),
                _ => None,
            })
            .collect()
    }

    /// Filter to only OptionsUnavailable events.
    pub fn options_unavailable(&self) -> Vec<&OptionsUnavailableEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RowEvent::OptionsUnavailable(ev) => Some(ev),
                _ => None,
            })
            .collect()
    }

    /// Filter to only ReloadDiscarded events.
    pub fn reloads_discarded(&self) -> Vec<&ReloadDiscardedEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RowEvent::ReloadDiscarded(ev) => Some(ev),
                _ => None,
            })
            .collect()
    }

    /// Filter to only CopyCompleted events.
    pub fn copies_completed(&self) -> Vec<&CopyCompletedEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RowEvent::CopyCompleted(ev) => Some(ev),
                _ => None,
            })
            .collect()
    }

    /// Filter to only RowDeleted events.
    pub fn rows_deleted(&self) -> Vec<&RowDeletedEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RowEvent::RowDeleted(ev) => Some(ev),
                _ => None,
            })
            .collect()
    }

    /// Filter to only BatchValidated events.
    pub fn batches_validated(&self) -> Vec<&BatchValidatedEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RowEvent::BatchValidated(ev) => Some(ev),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_collector_filtering() {
        let mut collector = EventCollector::new();

        collector.push(RowEvent::RowReady(RowReadyEvent {
            revision: 1,
            row: RowId(1),
        }));
        collector.push(RowEvent::OptionsLoaded(OptionsLoadedEvent {
            revision: 1,
            row: RowId(1),
            field: FieldKey::from("company"),
            count: 3,
        }));
        collector.push(RowEvent::RowDeleted(RowDeletedEvent {
            revision: 2,
            row: RowId(1),
        }));

        assert_eq!(collector.len(), 3);
        assert_eq!(collector.rows_ready().len(), 1);
        assert_eq!(collector.options_loaded().len(), 1);
        assert_eq!(collector.rows_deleted().len(), 1);
        assert_eq!(collector.reloads_discarded().len(), 0);
    }
}
