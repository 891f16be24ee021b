//! # IDs
//! Layers need an identity that survives being removed and re-inserted, and every recorded action needs a
//! position in time. Both are handed out by a [`Counter`] owned by the [`crate::manager::CommandManager`],
//! so two documents never share a counter and IDs are reproducible from run to run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identity of a layer. Never zero, never reused within one manager.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerID(std::num::NonZeroU64);
impl LayerID {
    /// Get the raw numeric value of this ID.
    #[must_use]
    pub fn id(self) -> u64 {
        self.0.get()
    }
}
impl std::fmt::Display for LayerID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Layer#{}", self.0)
    }
}
impl std::fmt::Debug for LayerID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <LayerID as std::fmt::Display>::fmt(self, f)
    }
}

/// Position of a recorded action in the global order of the document.
/// Larger is more recent. Shared between every layer log and the structural log,
/// which is how the most recent action across all of them is found.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Stamp(u64);
impl Stamp {
    /// Before anything. Never handed out by a [`Counter`].
    pub const ZERO: Self = Self(0);
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Monotonic counter, starting at one.
#[derive(Debug)]
pub struct Counter(AtomicU64);
impl Default for Counter {
    fn default() -> Self {
        Self(AtomicU64::new(1))
    }
}
impl Counter {
    fn next_raw(&self) -> u64 {
        // Only uniqueness matters, the counter guards no other memory.
        let next = self.0.fetch_add(1, Ordering::Relaxed);
        // 2^64 actions is not a thing that happens. Still, never hand out a duplicate.
        assert_ne!(next, u64::MAX, "ID counter exhausted");
        next
    }
    pub fn next_layer(&self) -> LayerID {
        // Unwrap OK - counter starts at one and is checked for wrapping above.
        LayerID(std::num::NonZeroU64::new(self.next_raw()).unwrap())
    }
    pub fn next_stamp(&self) -> Stamp {
        Stamp(self.next_raw())
    }
}

#[cfg(test)]
mod test {
    use super::Counter;
    #[test]
    fn stamps_increase() {
        let counter = Counter::default();
        let a = counter.next_stamp();
        let b = counter.next_stamp();
        let c = counter.next_stamp();
        assert!(a < b && b < c);
    }
    #[test]
    fn layers_unique_across_threads() {
        let counter = std::sync::Arc::new(Counter::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    (0..256).map(|_| counter.next_layer()).collect::<Vec<_>>()
                })
            })
            .collect();
        let mut ids: Vec<_> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        let length_before = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(length_before, ids.len(), "had duplicate ids");
    }
    #[test]
    fn display() {
        let counter = Counter::default();
        assert_eq!(counter.next_layer().to_string(), "Layer#1");
    }
}
