//! Per-session action sequence numbers.

/// Issues strictly increasing positive sequence numbers, starting at 1.
///
/// Sequences are unique per engine instance only. After a snapshot reports
/// the last sequence the server processed for this user, `resync` moves the
/// allocator past it so a reloaded session never reuses a consumed number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceAllocator {
    next_value: u64,
}

impl SequenceAllocator {
    pub fn new() -> Self {
        Self { next_value: 1 }
    }

    pub fn next(&mut self) -> u64 {
        let value = self.next_value;
        self.next_value += 1;
        value
    }

    /// Value the next call to `next` will return.
    pub fn peek(&self) -> u64 {
        self.next_value
    }

    /// Ensure the next value is at least `last_processed + 1`. Never lowers it.
    pub fn resync(&mut self, last_processed: u64) {
        self.next_value = self.next_value.max(last_processed.saturating_add(1));
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}
