//! A thread-safe FIFO queue supporting blocking consume and arbitrary
//! removal by value equality (`delete_equal`), modeled on the `List`
//! producer/consumer/delete_equal trio `gwlib/gw-timer.c` relies on to
//! revoke a just-elapsed timer event.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
}

impl<T: PartialEq + Clone> Queue<T> {
    pub fn new() -> Self {
        Queue {
            items: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        }
    }

    pub fn produce(&self, item: T) {
        let mut items = self.items.lock().unwrap();
        items.push_back(item);
        self.not_empty.notify_one();
    }

    /// Blocks until an item is available.
    pub fn consume(&self) -> T {
        let mut items = self.items.lock().unwrap();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            items = self.not_empty.wait(items).unwrap();
        }
    }

    pub fn try_consume(&self) -> Option<T> {
        self.items.lock().unwrap().pop_front()
    }

    /// Removes the first item equal to `item`, if present. Used to revoke
    /// a just-published elapse event when `timer_stop` races the watcher.
    pub fn delete_equal(&self, item: &T) {
        let mut items = self.items.lock().unwrap();
        if let Some(pos) = items.iter().position(|i| i == item) {
            items.remove(pos);
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

impl<T: PartialEq + Clone> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produce_then_consume_is_fifo() {
        let q: Queue<i32> = Queue::new();
        q.produce(1);
        q.produce(2);
        assert_eq!(q.consume(), 1);
        assert_eq!(q.consume(), 2);
    }

    #[test]
    fn delete_equal_removes_matching_item_only() {
        let q: Queue<i32> = Queue::new();
        q.produce(1);
        q.produce(2);
        q.produce(1);
        q.delete_equal(&1);
        assert_eq!(q.len(), 2);
        assert_eq!(q.try_consume(), Some(2));
        assert_eq!(q.try_consume(), Some(1));
        assert_eq!(q.try_consume(), None);
    }
}
