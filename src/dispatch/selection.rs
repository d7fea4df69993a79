//! Initial replica choice
//!
//! The dispatcher asks a [`SelectionPolicy`] for the first replica of each
//! logical request; failover then walks the remaining replicas in set order.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Picks the first replica for a request
pub trait SelectionPolicy: Send + Sync {
    /// Index into a replica set of `replica_count` (>= 1) entries
    fn initial(&self, replica_count: usize) -> usize;
}

/// Uniformly random choice
pub struct RandomSelection {
    rng: Mutex<StdRng>,
}

impl RandomSelection {
    /// Seeded from the operating system
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Reproducible sequence for tests and replays
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionPolicy for RandomSelection {
    fn initial(&self, replica_count: usize) -> usize {
        if replica_count <= 1 {
            return 0;
        }
        self.rng.lock().random_range(0..replica_count)
    }
}

/// Cycles through a fixed list of indices
pub struct FixedSequence {
    sequence: Vec<usize>,
    next: AtomicUsize,
}

impl FixedSequence {
    /// Repeat `sequence`; an empty sequence always yields 0
    #[must_use]
    pub fn new(sequence: Vec<usize>) -> Self {
        Self {
            sequence,
            next: AtomicUsize::new(0),
        }
    }

    /// Always start at the same replica
    #[must_use]
    pub fn always(index: usize) -> Self {
        Self::new(vec![index])
    }
}

impl SelectionPolicy for FixedSequence {
    fn initial(&self, replica_count: usize) -> usize {
        if self.sequence.is_empty() || replica_count == 0 {
            return 0;
        }
        let step = self.next.fetch_add(1, Ordering::Relaxed);
        self.sequence[step % self.sequence.len()] % replica_count
    }
}

/// Attempt order: `initial` first, then every other index in set order
pub fn attempt_order(initial: usize, replica_count: usize) -> impl Iterator<Item = usize> {
    std::iter::once(initial).chain((0..replica_count).filter(move |&i| i != initial))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_order() {
        assert_eq!(attempt_order(2, 4).collect::<Vec<_>>(), vec![2, 0, 1, 3]);
        assert_eq!(attempt_order(0, 1).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_random_stays_in_range() {
        let policy = RandomSelection::seeded(7);
        let mut seen = [false; 3];
        for _ in 0..200 {
            let i = policy.initial(3);
            assert!(i < 3);
            seen[i] = true;
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(policy.initial(1), 0);
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let a = RandomSelection::seeded(42);
        let b = RandomSelection::seeded(42);
        let xs: Vec<_> = (0..20).map(|_| a.initial(5)).collect();
        let ys: Vec<_> = (0..20).map(|_| b.initial(5)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_fixed_sequence_cycles() {
        let policy = FixedSequence::new(vec![1, 0, 5]);
        let picks: Vec<_> = (0..4).map(|_| policy.initial(2)).collect();
        assert_eq!(picks, vec![1, 0, 1, 1]);
    }
}
