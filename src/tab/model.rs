//! Observable tab model: an ordered collection of items with row signals.
//!
//! The model is the host-collection side of the synchronizer. It keeps rows
//! in display order, caps their number, assigns every row a stable id, and
//! broadcasts row events to listeners. The [`ModelGate`] guard mutes those
//! events for the duration of a reconciliation pass so the engine never
//! observes the effects of its own writes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use crate::tab::item::ItemData;

/// Stable identifier of a row, unique within its model.
pub type RowId = u64;

/// Identifier of a model, unique within the process.
pub type ModelId = u64;

/// A tab model shared between the host and the synchronization engine.
pub type SharedModel = Arc<RwLock<TabModel>>;

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// Row change notification sent to listeners.
///
/// Events carry stable row ids rather than indices: listeners may drain
/// them long after further insertions and removals have shifted positions,
/// so an index would already be stale by the time it is handled.
#[derive(Debug, Clone)]
pub enum RowEvent {
    /// Rows with the given ids were inserted.
    Inserted {
        /// Ids of the inserted rows.
        ids: Vec<RowId>,
    },
    /// Rows with the given ids were removed.
    Removed {
        /// Ids of the removed rows.
        ids: Vec<RowId>,
    },
    /// Data of the rows with the given ids changed.
    Changed {
        /// Ids of the changed rows.
        ids: Vec<RowId>,
    },
}

#[derive(Debug, Clone)]
struct Row {
    id: RowId,
    item: ItemData,
}

/// Ordered, observable collection of items for one tab.
pub struct TabModel {
    id: ModelId,
    tab_name: String,
    max_items: usize,
    rows: Vec<Row>,
    next_row: RowId,
    disabled: bool,
    dirty: bool,
    muted: bool,
    events: broadcast::Sender<RowEvent>,
}

impl TabModel {
    /// Creates an empty model for the named tab with the given row cap.
    pub fn new(tab_name: impl Into<String>, max_items: usize) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            id: NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed),
            tab_name: tab_name.into(),
            max_items,
            rows: Vec::new(),
            next_row: 1,
            disabled: false,
            dirty: false,
            muted: false,
            events,
        }
    }

    /// Wraps the model for sharing with the engine.
    pub fn into_shared(self) -> SharedModel {
        Arc::new(RwLock::new(self))
    }

    /// Process-unique model id.
    pub fn id(&self) -> ModelId {
        self.id
    }

    /// Name of the tab this model backs.
    pub fn tab_name(&self) -> &str {
        &self.tab_name
    }

    /// Maximum number of rows the model accepts.
    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Item at the given row, if any.
    pub fn row(&self, index: usize) -> Option<&ItemData> {
        self.rows.get(index).map(|r| &r.item)
    }

    /// Stable id of the given row.
    pub fn row_id(&self, index: usize) -> Option<RowId> {
        self.rows.get(index).map(|r| r.id)
    }

    /// Iterator over all items in row order.
    pub fn items(&self) -> impl Iterator<Item = &ItemData> {
        self.rows.iter().map(|r| &r.item)
    }

    /// Index of the first row carrying the given base name.
    pub fn find_base_name(&self, base_name: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.item.meta.base_name.as_deref() == Some(base_name))
    }

    /// Current index of the row with the given id, if it still exists.
    pub fn index_of(&self, id: RowId) -> Option<usize> {
        self.rows.iter().position(|r| r.id == id)
    }

    /// Subscribe to row events.
    pub fn subscribe(&self) -> broadcast::Receiver<RowEvent> {
        self.events.subscribe()
    }

    /// Whether the model is disabled (a pass is running).
    pub fn disabled(&self) -> bool {
        self.disabled
    }

    /// Set the disabled property.
    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    /// Whether the sync state changed since the host last persisted the tab.
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// Set the dirty property.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Whether row events are currently suppressed.
    pub fn muted(&self) -> bool {
        self.muted
    }

    fn emit(&self, event: RowEvent) {
        if !self.muted {
            // No receivers is fine; the tab may not be synced.
            let _ = self.events.send(event);
        }
    }

    /// Inserts an item at the given index.
    ///
    /// Returns the new row's id, or `None` when the row cap is reached.
    pub fn insert_row(&mut self, index: usize, item: ItemData) -> Option<RowId> {
        if self.rows.len() >= self.max_items {
            return None;
        }
        let index = index.min(self.rows.len());
        let id = self.next_row;
        self.next_row += 1;
        self.rows.insert(index, Row { id, item });
        self.emit(RowEvent::Inserted { ids: vec![id] });
        Some(id)
    }

    /// Removes the row at the given index, returning its id.
    pub fn remove_row(&mut self, index: usize) -> Option<RowId> {
        if index >= self.rows.len() {
            return None;
        }
        let row = self.rows.remove(index);
        self.emit(RowEvent::Removed { ids: vec![row.id] });
        Some(row.id)
    }

    /// Replaces the item at the given index.
    pub fn set_row(&mut self, index: usize, item: ItemData) -> bool {
        let Some(row) = self.rows.get_mut(index) else {
            return false;
        };
        row.item = item;
        let ids = vec![row.id];
        self.emit(RowEvent::Changed { ids });
        true
    }

    /// Merges an item into the row at the given index (update mode).
    pub fn merge_row(&mut self, index: usize, item: &ItemData) -> bool {
        let Some(row) = self.rows.get_mut(index) else {
            return false;
        };
        row.item.merge(item);
        let ids = vec![row.id];
        self.emit(RowEvent::Changed { ids });
        true
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }
}

impl std::fmt::Debug for TabModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabModel")
            .field("tab_name", &self.tab_name)
            .field("rows", &self.rows.len())
            .field("max_items", &self.max_items)
            .field("disabled", &self.disabled)
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// Scoped mute over a model.
///
/// Acquiring the gate suppresses row events and marks the model disabled;
/// dropping it restores both. Every reconciliation pass runs under a gate,
/// which is the sole mechanism preventing write-back feedback loops.
pub struct ModelGate {
    model: SharedModel,
}

impl ModelGate {
    /// Mutes the model for the lifetime of the returned guard.
    pub fn acquire(model: &SharedModel) -> Self {
        if let Ok(mut m) = model.write() {
            m.set_muted(true);
            m.set_disabled(true);
        }
        Self {
            model: Arc::clone(model),
        }
    }
}

impl Drop for ModelGate {
    fn drop(&mut self) {
        if let Ok(mut m) = self.model.write() {
            m.set_muted(false);
            m.set_disabled(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_respects_row_cap() {
        let mut model = TabModel::new("tab", 2);
        assert!(model.insert_row(0, ItemData::default()).is_some());
        assert!(model.insert_row(0, ItemData::default()).is_some());
        assert!(model.insert_row(0, ItemData::default()).is_none());
        assert_eq!(model.row_count(), 2);
    }

    #[test]
    fn row_ids_are_stable_across_moves() {
        let mut model = TabModel::new("tab", 10);
        let first = model.insert_row(0, ItemData::default()).unwrap();
        let second = model.insert_row(0, ItemData::default()).unwrap();
        // Newest row sits at index 0.
        assert_eq!(model.row_id(0), Some(second));
        assert_eq!(model.row_id(1), Some(first));
        model.remove_row(0);
        assert_eq!(model.row_id(0), Some(first));
    }

    #[test]
    fn events_are_emitted_for_row_ops() {
        let mut model = TabModel::new("tab", 10);
        let mut rx = model.subscribe();

        let inserted = model.insert_row(0, ItemData::default()).unwrap();
        match rx.try_recv() {
            Ok(RowEvent::Inserted { ids }) => assert_eq!(ids, vec![inserted]),
            other => panic!("unexpected event: {other:?}"),
        }

        model.set_row(0, ItemData::with_payload("text/plain", "x"));
        match rx.try_recv() {
            Ok(RowEvent::Changed { ids }) => assert_eq!(ids, vec![inserted]),
            other => panic!("unexpected event: {other:?}"),
        }

        let id = model.row_id(0).unwrap();
        model.remove_row(0);
        match rx.try_recv() {
            Ok(RowEvent::Removed { ids }) => assert_eq!(ids, vec![id]),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn gate_mutes_events_and_restores_state() {
        let model = TabModel::new("tab", 10).into_shared();
        let mut rx = model.read().unwrap().subscribe();

        {
            let _gate = ModelGate::acquire(&model);
            let mut m = model.write().unwrap();
            assert!(m.disabled());
            m.insert_row(0, ItemData::default());
            m.set_row(0, ItemData::with_payload("text/plain", "x"));
        }

        let m = model.read().unwrap();
        assert!(!m.disabled());
        assert!(!m.muted());
        drop(m);
        assert!(rx.try_recv().is_err(), "muted ops must not signal");
    }
}
