//! Per-session mutable store: the data bag, the current event and the
//! history table.

use crate::core::{Event, HistoryTable};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Data model of one session.
///
/// The data bag sits behind a shared mutex so the invoking session can run
/// `finalize` content against it; the lock is only held for the span of a
/// single guard or content evaluation.
pub struct DataModel<D> {
    data: Arc<Mutex<D>>,
    event: Event,
    history: HistoryTable,
}

impl<D> DataModel<D> {
    pub fn new(data: D) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            event: Event::default(),
            history: HistoryTable::new(),
        }
    }

    /// Handle to the data bag shared with the invoking session.
    pub fn shared(&self) -> Arc<Mutex<D>> {
        Arc::clone(&self.data)
    }

    pub fn lock(&self) -> MutexGuard<'_, D> {
        self.data.lock()
    }

    /// Swap in a fresh data bag.
    pub fn replace(&mut self, data: D) {
        *self.data.lock() = data;
    }

    /// The event being processed, the `_event` of executable content.
    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn set_event(&mut self, event: Event) {
        self.event = event;
    }

    pub fn history(&self) -> &HistoryTable {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryTable {
        &mut self.history
    }
}

impl<D: Default> Default for DataModel<D> {
    fn default() -> Self {
        Self::new(D::default())
    }
}
