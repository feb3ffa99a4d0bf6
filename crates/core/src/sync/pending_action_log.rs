//! Ordered log of local actions not yet acknowledged by the server.

use crate::boards::BoardAction;

/// A local action awaiting server acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub sequence: u64,
    pub action: BoardAction,
}

impl PendingAction {
    pub fn new(sequence: u64, action: BoardAction) -> Self {
        Self { sequence, action }
    }
}

/// Insertion-ordered pending actions.
///
/// Order matters: actions are folded left to right and a later action may
/// depend on fields changed by an earlier one.
#[derive(Debug, Clone, Default)]
pub struct PendingActionLog {
    entries: Vec<PendingAction>,
}

impl PendingActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, action: PendingAction) {
        self.entries.push(action);
    }

    /// Drop every entry with `sequence <= last_processed`. Returns how many
    /// were removed.
    pub fn prune_up_to(&mut self, last_processed: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.sequence > last_processed);
        before - self.entries.len()
    }

    /// Remove the entry with exactly `sequence`, if present.
    pub fn remove(&mut self, sequence: u64) -> bool {
        match self.entries.iter().position(|e| e.sequence == sequence) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn as_slice(&self) -> &[PendingAction] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingAction> {
        self.entries.iter()
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.sequence).collect()
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
