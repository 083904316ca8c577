use crate::net::NewestSequence;

/// Single-entry buffer holding the newest payload of one kind.
///
/// Offers older than or equal to the last accepted sequence are discarded,
/// even after the slot has been taken.
#[derive(Debug)]
pub struct LatestSlot<T> {
    value: Option<T>,
    newest: NewestSequence,
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self {
            value: None,
            newest: NewestSequence::default(),
        }
    }
}

impl<T> LatestSlot<T> {
    pub fn offer(&mut self, sequence: u32, value: T) -> bool {
        if !self.newest.accept(sequence) {
            return false;
        }
        self.value = Some(value);
        true
    }

    pub fn take(&mut self) -> Option<T> {
        self.value.take()
    }

    pub fn reset(&mut self) {
        self.value = None;
        self.newest.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_only_newest() {
        let mut slot = LatestSlot::default();

        assert!(slot.offer(1, "a"));
        assert!(slot.offer(3, "c"));
        assert!(!slot.offer(2, "b"));
        assert_eq!(slot.take(), Some("c"));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_stale_offer_after_take_is_ignored() {
        let mut slot = LatestSlot::default();

        slot.offer(5, 5);
        slot.take();
        assert!(!slot.offer(4, 4));
        assert_eq!(slot.take(), None);

        slot.reset();
        assert!(slot.offer(4, 4));
    }
}
