//! Process-wide counters (spec.md §4.10 / C10).

use std::sync::atomic::{AtomicU64, Ordering};

/// An atomically incremented 64-bit counter. Used both for the
/// catenation reference (only the low 8 bits matter there) and for
/// tracking outstanding HTTP requests.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub const fn new() -> Self {
        Counter(AtomicU64::new(0))
    }

    /// Increments and returns the *new* value, matching Kannel's
    /// `counter_increase` semantics (pre-increment read).
    pub fn increase(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn decrease(&self) -> u64 {
        self.0.fetch_sub(1, Ordering::SeqCst) - 1
    }

    pub fn value(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// The low 8 bits of the next value, used directly as a catenation
    /// sequence reference.
    pub fn next_catenation_ref(&self) -> u8 {
        (self.increase() & 0xFF) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catenation_ref_wraps_at_256() {
        let c = Counter::new();
        for _ in 0..255 {
            c.increase();
        }
        assert_eq!(c.next_catenation_ref(), 0);
    }

    #[test]
    fn outstanding_requests_tracks_in_flight_count() {
        let c = Counter::new();
        assert_eq!(c.increase(), 1);
        assert_eq!(c.increase(), 2);
        assert_eq!(c.decrease(), 1);
        assert_eq!(c.value(), 1);
    }
}
