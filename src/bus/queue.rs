//! Bounded per-category command FIFO.

use heapless::Deque;
use log::debug;

use super::command::Command;

/// Commands each category queue holds.
pub const QUEUE_CAPACITY: usize = 32;

/// Fixed-capacity FIFO.  A full queue rejects new commands; it never blocks
/// and never overwrites.
pub struct CommandQueue {
    items: Deque<Command, QUEUE_CAPACITY>,
    dropped: u32,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub const fn new() -> Self {
        Self {
            items: Deque::new(),
            dropped: 0,
        }
    }

    /// Append `cmd`.  Returns `false` and drops it when full.
    #[must_use]
    pub fn enqueue(&mut self, cmd: Command) -> bool {
        match self.items.push_back(cmd) {
            Ok(()) => true,
            Err(cmd) => {
                self.dropped = self.dropped.saturating_add(1);
                debug!("{:?} queue full, dropping command", cmd.category);
                false
            }
        }
    }

    pub fn dequeue(&mut self) -> Option<Command> {
        self.items.pop_front()
    }

    /// Next command to be sent.
    pub fn front(&self) -> Option<&Command> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.is_full()
    }

    pub const fn capacity(&self) -> usize {
        QUEUE_CAPACITY
    }

    /// Commands rejected since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Count a command rejected on this queue's behalf without enqueueing.
    pub fn record_drop(&mut self) {
        self.dropped = self.dropped.saturating_add(1);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::command::CommandCategory;

    fn cmd(tag: u8) -> Command {
        Command::new(CommandCategory::Binary, &[tag]).unwrap()
    }

    #[test]
    fn fifo_order() {
        let mut q = CommandQueue::new();
        assert!(q.enqueue(cmd(1)));
        assert!(q.enqueue(cmd(2)));
        assert_eq!(q.dequeue().unwrap().data[0], 1);
        assert_eq!(q.dequeue().unwrap().data[0], 2);
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn full_queue_rejects_without_overwriting() {
        let mut q = CommandQueue::new();
        for i in 0..QUEUE_CAPACITY {
            assert!(q.enqueue(cmd(i as u8)));
        }
        assert!(!q.enqueue(cmd(0xEE)));
        assert_eq!(q.len(), QUEUE_CAPACITY);
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.dequeue().unwrap().data[0], 0, "head must survive overflow");
    }

    #[test]
    fn space_frees_after_dequeue() {
        let mut q = CommandQueue::new();
        for i in 0..QUEUE_CAPACITY {
            assert!(q.enqueue(cmd(i as u8)));
        }
        q.dequeue();
        assert!(q.enqueue(cmd(0xAA)));
        assert!(q.is_full());
    }
}
