use std::collections::VecDeque;

/// Result of offering an item to a [`PauseGate`]
#[derive(Debug, PartialEq, Eq)]
pub enum Admission<T> {
    /// Hand the item to the consumer now
    Deliver(T),
    /// The item was queued behind earlier ones
    Queued,
}

/// Ordered buffer gated by a pause flag.
///
/// While paused every item is queued; once resumed the queue must be drained
/// with [`PauseGate::next_ready`] before new items are delivered directly, so
/// arrival order is always kept. Nothing is ever dropped: `capacity` is only a
/// signal ([`PauseGate::is_full`]) for the producer to stop reading.
#[derive(Debug)]
pub struct PauseGate<T> {
    paused: bool,
    queue: VecDeque<T>,
    capacity: usize,
}

impl<T> PauseGate<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            paused: false,
            queue: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn admit(&mut self, item: T) -> Admission<T> {
        if self.paused || !self.queue.is_empty() {
            self.queue.push_back(item);
            Admission::Queued
        } else {
            Admission::Deliver(item)
        }
    }

    /// Next queued item, unless the gate is paused
    pub fn next_ready(&mut self) -> Option<T> {
        if self.paused {
            return None;
        }
        self.queue.pop_front()
    }

    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_gate_delivers_directly() {
        let mut gate = PauseGate::new(4);
        assert_eq!(gate.admit(1), Admission::Deliver(1));
        assert!(gate.is_empty());
    }

    #[test]
    fn test_paused_gate_queues_and_replays_in_order() {
        let mut gate = PauseGate::new(4);
        gate.pause();
        for i in 1..=3 {
            assert_eq!(gate.admit(i), Admission::Queued);
        }
        assert_eq!(gate.next_ready(), None);

        gate.resume();
        let drained: Vec<_> = std::iter::from_fn(|| gate.next_ready()).collect();
        assert_eq!(drained, vec![1, 2, 3]);
    }

    #[test]
    fn test_items_wait_behind_queue_after_resume() {
        let mut gate = PauseGate::new(4);
        gate.pause();
        gate.admit("a");
        gate.resume();

        // "a" has not been drained yet, so "b" must queue behind it
        assert_eq!(gate.admit("b"), Admission::Queued);
        assert_eq!(gate.next_ready(), Some("a"));
        assert_eq!(gate.next_ready(), Some("b"));
    }

    #[test]
    fn test_repause_mid_drain_keeps_remaining() {
        let mut gate = PauseGate::new(4);
        gate.pause();
        gate.admit(1);
        gate.admit(2);
        gate.resume();

        assert_eq!(gate.next_ready(), Some(1));
        gate.pause();
        assert_eq!(gate.next_ready(), None);
        assert_eq!(gate.len(), 1);
    }

    #[test]
    fn test_full_is_a_signal_not_a_drop() {
        let mut gate = PauseGate::new(2);
        gate.pause();
        gate.admit(1);
        gate.admit(2);
        assert!(gate.is_full());
        gate.admit(3);
        assert_eq!(gate.len(), 3);
    }
}
