//! A heap-ordered set of deadline timers served by a single watcher
//! thread (spec.md §4.1 / C1).
//!
//! Mirrors `gwlib/gw-timer.c`: a partially-ordered array (`H[i/2] <=
//! H[i]` for every `i >= 1`) gives O(log n) insert/remove/reposition, a
//! dedicated watcher thread sleeps until the top of the heap elapses,
//! and `stop()` races the watcher to revoke a just-published elapse
//! event via `delete_equal` on the timer's output queue.

mod queue;

pub use queue::Queue;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

const INACTIVE: i64 = -1;

struct Slot<T> {
    elapses: i64,
    data: Option<T>,
    elapsed_data: Option<T>,
    /// Position in `SetState::heap`, or `None` while inactive.
    heap_index: Option<usize>,
    output: Arc<Queue<T>>,
}

struct SetState<T> {
    slots: Vec<Option<Slot<T>>>,
    free: Vec<usize>,
    /// Slot ids, partially ordered: `slots[heap[i/2]].elapses <=
    /// slots[heap[i]].elapses` for every `i in 1..heap.len()`.
    heap: Vec<usize>,
}

impl<T> SetState<T> {
    fn new() -> Self {
        SetState {
            slots: Vec::new(),
            free: Vec::new(),
            heap: Vec::new(),
        }
    }

    fn alloc(&mut self, slot: Slot<T>) -> usize {
        if let Some(id) = self.free.pop() {
            self.slots[id] = Some(slot);
            id
        } else {
            self.slots.push(Some(slot));
            self.slots.len() - 1
        }
    }

    fn slot(&self, id: usize) -> &Slot<T> {
        self.slots[id].as_ref().expect("timer slot freed while referenced")
    }

    fn slot_mut(&mut self, id: usize) -> &mut Slot<T> {
        self.slots[id].as_mut().expect("timer slot freed while referenced")
    }

    fn heap_swap(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        self.heap.swap(i, j);
        self.slot_mut(self.heap[i]).heap_index = Some(i);
        self.slot_mut(self.heap[j]).heap_index = Some(j);
    }

    /// Restores the heap invariant around `index` after its elapse time
    /// changed or it was just inserted. Port of Kannel's `heap_adjust`:
    /// parent(i) = i/2, children of p are 2p and 2p+1.
    fn heap_adjust(&mut self, mut index: usize) {
        let elapses = self.slot(self.heap[index]).elapses;

        // Move toward the top: parent(i) = i/2, so this terminates at
        // index 0 where the element is its own parent.
        if index > 0 && elapses < self.slot(self.heap[index / 2]).elapses {
            loop {
                let parent_index = index / 2;
                self.heap_swap(index, parent_index);
                index = parent_index;
                if index == 0 || elapses >= self.slot(self.heap[index / 2]).elapses {
                    break;
                }
            }
            return;
        }

        // Otherwise move toward the bottom; children of p are 2p, 2p+1.
        loop {
            let child = index * 2;
            if child >= self.heap.len() {
                break;
            }
            let chosen = if child + 1 < self.heap.len()
                && self.slot(self.heap[child + 1]).elapses < self.slot(self.heap[child]).elapses
            {
                child + 1
            } else {
                child
            };
            if self.slot(self.heap[chosen]).elapses < self.slot(self.heap[index]).elapses {
                self.heap_swap(index, chosen);
                index = chosen;
            } else {
                break;
            }
        }
    }

    fn heap_insert(&mut self, id: usize) {
        self.heap.push(id);
        let index = self.heap.len() - 1;
        self.slot_mut(id).heap_index = Some(index);
        self.heap_adjust(index);
    }

    fn heap_delete(&mut self, index: usize) {
        let last = self.heap.len() - 1;
        self.heap_swap(index, last);
        let removed_id = self.heap.pop().unwrap();
        self.slot_mut(removed_id).heap_index = None;
        if index != last && index < self.heap.len() {
            self.heap_adjust(index);
        }
    }

    fn top_elapses(&self) -> Option<i64> {
        self.heap.first().map(|&id| self.slot(id).elapses)
    }
}

/// A heap-ordered set of timers and the watcher thread serving it.
pub struct TimerSet<T: Send + 'static> {
    state: Arc<Mutex<SetState<T>>>,
    condvar: Arc<Condvar>,
    stopping: Arc<AtomicBool>,
    watcher: Option<JoinHandle<()>>,
}

impl<T: PartialEq + Clone + Send + 'static> TimerSet<T> {
    pub fn create() -> Self {
        let state = Arc::new(Mutex::new(SetState::new()));
        let condvar = Arc::new(Condvar::new());
        let stopping = Arc::new(AtomicBool::new(false));

        let watcher = {
            let state = state.clone();
            let condvar = condvar.clone();
            let stopping = stopping.clone();
            std::thread::spawn(move || watch(state, condvar, stopping))
        };

        TimerSet {
            state,
            condvar,
            stopping,
            watcher: Some(watcher),
        }
    }

    pub fn create_timer(&self, output: Arc<Queue<T>>) -> Timer<T> {
        let mut state = self.state.lock().unwrap();
        let id = state.alloc(Slot {
            elapses: INACTIVE,
            data: None,
            elapsed_data: None,
            heap_index: None,
            output,
        });
        Timer {
            set: TimerSetHandle {
                state: self.state.clone(),
                condvar: self.condvar.clone(),
            },
            id,
        }
    }

    /// Atomically removes every active timer, cancels their pending
    /// elapse events, and returns the data each one carried.
    pub fn break_all(&self) -> Vec<T> {
        let mut state = self.state.lock().unwrap();
        let mut out = Vec::new();
        let ids: Vec<usize> = state.heap.clone();
        for id in ids {
            let slot = state.slot_mut(id);
            if let Some(elapsed) = slot.elapsed_data.take() {
                slot.output.delete_equal(&elapsed);
            }
            if let Some(data) = slot.data.take() {
                out.push(data);
            }
            slot.elapses = INACTIVE;
            slot.heap_index = None;
        }
        state.heap.clear();
        out
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send + 'static> Drop for TimerSet<T> {
    fn drop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
        if let Some(handle) = self.watcher.take() {
            let _ = handle.join();
        }
    }
}

#[derive(Clone)]
struct TimerSetHandle<T> {
    state: Arc<Mutex<SetState<T>>>,
    condvar: Arc<Condvar>,
}

/// A single timer, owned by the [`TimerSet`] that created it. Not
/// copyable: there is exactly one handle per underlying slot.
pub struct Timer<T> {
    set: TimerSetHandle<T>,
    id: usize,
}

impl<T: PartialEq + Clone> Timer<T> {
    /// Sets the absolute deadline to `now + interval_seconds` and wakes
    /// the watcher if this changed the top of the heap.
    pub fn start(&self, interval_seconds: i64, data: T) {
        let mut state = self.set.state.lock().unwrap();
        let was_top_before = state.top_elapses();

        let slot = state.slot_mut(self.id);
        slot.elapses = now() + interval_seconds;
        slot.data = Some(data);
        let already_active = slot.heap_index.is_some();

        if already_active {
            let index = state.slot(self.id).heap_index.unwrap();
            state.heap_adjust(index);
        } else {
            state.heap_insert(self.id);
        }

        if state.top_elapses() != was_top_before {
            self.set.condvar.notify_all();
        }
    }

    /// Deactivates the timer. If an elapse event for this timer has
    /// already been published to its output queue but not yet consumed,
    /// attempts to revoke it (races the watcher/consumer by design; see
    /// spec.md §4.1).
    pub fn stop(&self) {
        let mut state = self.set.state.lock().unwrap();
        let slot = state.slot_mut(self.id);
        if let Some(index) = slot.heap_index {
            state.heap_delete(index);
        }
        let slot = state.slot_mut(self.id);
        slot.elapses = INACTIVE;
        slot.data = None;
        if let Some(elapsed) = slot.elapsed_data.take() {
            let output = slot.output.clone();
            drop(state);
            output.delete_equal(&elapsed);
        }
    }

    pub fn data(&self) -> Option<T> {
        self.set.state.lock().unwrap().slot(self.id).data.clone()
    }

    pub fn is_active(&self) -> bool {
        self.set.state.lock().unwrap().slot(self.id).elapses != INACTIVE
    }
}

impl<T> Drop for Timer<T> {
    fn drop(&mut self) {
        let mut state = self.set.state.lock().unwrap();
        if let Some(index) = state.slot(self.id).heap_index {
            state.heap_delete(index);
        }
        state.slots[self.id] = None;
        state.free.push(self.id);
    }
}

fn watch<T: PartialEq + Clone + Send + 'static>(
    state: Arc<Mutex<SetState<T>>>,
    condvar: Arc<Condvar>,
    stopping: Arc<AtomicBool>,
) {
    loop {
        let mut guard = state.lock().unwrap();
        loop {
            if stopping.load(Ordering::SeqCst) {
                return;
            }
            match guard.top_elapses() {
                None => {
                    // Heap empty: sleep until woken.
                    guard = condvar.wait(guard).unwrap();
                }
                Some(deadline) => {
                    let remaining = deadline - now();
                    if remaining <= 0 {
                        break;
                    }
                    let (g, _timeout) = condvar
                        .wait_timeout(guard, std::time::Duration::from_secs(remaining as u64))
                        .unwrap();
                    guard = g;
                }
            }
        }
        if stopping.load(Ordering::SeqCst) {
            return;
        }
        // Top has elapsed; pop and publish.
        let top_id = guard.heap[0];
        guard.heap_delete(0);
        let slot = guard.slot_mut(top_id);
        slot.elapses = INACTIVE;
        if let Some(data) = slot.data.take() {
            debug_assert!(slot.elapsed_data.is_none());
            slot.elapsed_data = Some(data.clone());
            let output = slot.output.clone();
            drop(guard);
            trace!("timer elapsed, publishing to output queue");
            output.produce(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn elapse_delivers_data_to_output_queue() {
        let set: TimerSet<i32> = TimerSet::create();
        let out = Arc::new(Queue::new());
        let t = set.create_timer(out.clone());
        t.start(0, 42);
        let received = out.consume();
        assert_eq!(received, 42);
    }

    #[test]
    fn stop_before_elapse_prevents_delivery() {
        let set: TimerSet<i32> = TimerSet::create();
        let out = Arc::new(Queue::new());
        let t = set.create_timer(out.clone());
        t.start(5, 1);
        t.stop();
        assert!(!t.is_active());
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(out.try_consume(), None);
    }

    #[test]
    fn restart_repositions_timer_in_heap() {
        let set: TimerSet<i32> = TimerSet::create();
        let out = Arc::new(Queue::new());
        let a = set.create_timer(out.clone());
        let b = set.create_timer(out.clone());
        a.start(10, 1);
        b.start(0, 2);
        assert_eq!(out.consume(), 2);
        a.stop();
    }

    #[test]
    fn break_all_returns_every_pending_timer_data() {
        let set: TimerSet<i32> = TimerSet::create();
        let out = Arc::new(Queue::new());
        let a = set.create_timer(out.clone());
        let b = set.create_timer(out.clone());
        a.start(60, 1);
        b.start(60, 2);
        let mut drained = set.break_all();
        drained.sort();
        assert_eq!(drained, vec![1, 2]);
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn heap_invariant_holds_with_many_timers() {
        let set: TimerSet<i32> = TimerSet::create();
        let out = Arc::new(Queue::new());
        let mut timers = Vec::new();
        for i in 0..50 {
            let t = set.create_timer(out.clone());
            t.start(1000 + (i % 7), i);
            timers.push(t);
        }
        let state = set.state.lock().unwrap();
        for i in 1..state.heap.len() {
            let parent = state.slot(state.heap[i / 2]).elapses;
            let this = state.slot(state.heap[i]).elapses;
            assert!(parent <= this, "heap invariant violated at index {i}");
        }
    }
}
