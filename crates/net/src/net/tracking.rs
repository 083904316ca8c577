use std::collections::VecDeque;

use super::protocol::sequence_greater_than;

const DEFAULT_WINDOW: usize = 128;

/// Remembers the sequences of recently delivered reliable packets so a copy
/// that was already in flight when our ack went out is not delivered twice.
#[derive(Debug)]
pub struct DeliveredWindow {
    recent: VecDeque<u32>,
    capacity: usize,
}

impl Default for DeliveredWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl DeliveredWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            recent: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns `true` the first time `sequence` is seen.
    pub fn record(&mut self, sequence: u32) -> bool {
        if self.recent.contains(&sequence) {
            return false;
        }

        if self.recent.len() >= self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(sequence);
        true
    }

    pub fn clear(&mut self) {
        self.recent.clear();
    }
}

/// Last applied sequence per stream; a packet is applied only when strictly
/// newer than the one before it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NewestSequence {
    last: Option<u32>,
}

impl NewestSequence {
    pub fn accept(&mut self, sequence: u32) -> bool {
        match self.last {
            Some(last) if !sequence_greater_than(sequence, last) => false,
            _ => {
                self.last = Some(sequence);
                true
            }
        }
    }

    pub fn last(&self) -> Option<u32> {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_detection() {
        let mut window = DeliveredWindow::default();

        assert!(window.record(1));
        assert!(!window.record(1));
        assert!(window.record(2));
        assert!(!window.record(2));
    }

    #[test]
    fn test_window_forgets_oldest() {
        let mut window = DeliveredWindow::new(2);

        assert!(window.record(1));
        assert!(window.record(2));
        assert!(window.record(3));
        assert!(window.record(1));
    }

    #[test]
    fn test_newest_rejects_stale_and_equal() {
        let mut newest = NewestSequence::default();

        assert!(newest.accept(10));
        assert!(!newest.accept(10));
        assert!(!newest.accept(9));
        assert!(newest.accept(11));
        assert_eq!(newest.last(), Some(11));
    }

    #[test]
    fn test_newest_handles_wraparound() {
        let mut newest = NewestSequence::default();

        assert!(newest.accept(u32::MAX - 1));
        assert!(newest.accept(2));
        assert!(!newest.accept(u32::MAX));
    }
}
