//! Pending table: detector hits waiting for their delay window to pass.
//!
//! Keyed by bar index, at most one entry per index. `BTreeMap` keeps drains
//! in chronological order.

use std::collections::BTreeMap;

use crate::domain::SignalEvent;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry {
    pub event: SignalEvent,
    /// Position of the originating detector in its namespace.
    pub slot: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PendingTable {
    entries: BTreeMap<usize, PendingEntry>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.entries.contains_key(&index)
    }

    /// Stage `event` under its bar index. Returns false (and drops the
    /// event) if that index is already taken.
    pub fn stage(&mut self, event: SignalEvent, slot: usize) -> bool {
        let index = event.bar_index;
        if self.entries.contains_key(&index) {
            return false;
        }
        self.entries.insert(index, PendingEntry { event, slot });
        true
    }

    /// Remove and return every entry for which `ready` holds, oldest first.
    pub fn drain_ready<F>(&mut self, mut ready: F) -> Vec<PendingEntry>
    where
        F: FnMut(&PendingEntry) -> bool,
    {
        let keys: Vec<usize> = self
            .entries
            .iter()
            .filter(|(_, entry)| ready(entry))
            .map(|(k, _)| *k)
            .collect();
        keys.into_iter()
            .filter_map(|k| self.entries.remove(&k))
            .collect()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
