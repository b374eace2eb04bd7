//! # Quorum Selection
//!
//! Uniform random selection of a dispute quorum from the active
//! arbitrator pool. Randomness comes through the [`RandomnessProvider`]
//! seam so production uses the operating system RNG while tests pin a
//! seeded stream and get reproducible quorums.

use parking_lot::Mutex;
use rand_core::{OsRng, RngCore};

/// Source of randomness for quorum selection.
pub trait RandomnessProvider: Send + Sync {
    fn next_u64(&self) -> u64;
}

/// Production provider backed by the operating system RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandomness;

impl RandomnessProvider for OsRandomness {
    fn next_u64(&self) -> u64 {
        OsRng.next_u64()
    }
}

/// Deterministic provider for tests. SplitMix64 over a fixed seed.
#[derive(Debug)]
pub struct SeededRandomness {
    state: Mutex<u64>,
}

impl SeededRandomness {
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(seed),
        }
    }
}

impl RandomnessProvider for SeededRandomness {
    fn next_u64(&self) -> u64 {
        let mut state = self.state.lock();
        *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = *state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

/// Draw `quorum_size` distinct elements from `pool`, uniformly and in
/// selection order. Partial Fisher-Yates over a working copy.
///
/// Returns the whole pool when it is not larger than the quorum; the
/// caller enforces the minimum-pool precondition.
pub fn select_quorum<T: Copy>(
    pool: &[T],
    quorum_size: usize,
    rng: &dyn RandomnessProvider,
) -> Vec<T> {
    let mut working: Vec<T> = pool.to_vec();
    if working.len() <= quorum_size {
        return working;
    }
    for i in 0..quorum_size {
        // Modulo bias is negligible at pool sizes far below u64::MAX.
        let j = i + (rng.next_u64() as usize) % (working.len() - i);
        working.swap(i, j);
    }
    working.truncate(quorum_size);
    working
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn quorum_has_no_duplicates() {
        let pool: Vec<u32> = (0..20).collect();
        let rng = SeededRandomness::new(7);
        let quorum = select_quorum(&pool, 5, &rng);
        assert_eq!(quorum.len(), 5);
        let mut sorted = quorum.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 5);
    }

    #[test]
    fn small_pool_is_returned_whole() {
        let pool: Vec<u32> = (0..3).collect();
        let rng = SeededRandomness::new(1);
        assert_eq!(select_quorum(&pool, 5, &rng), pool);
    }

    #[test]
    fn same_seed_selects_the_same_quorum() {
        let pool: Vec<u32> = (0..50).collect();
        let a = select_quorum(&pool, 5, &SeededRandomness::new(42));
        let b = select_quorum(&pool, 5, &SeededRandomness::new(42));
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn quorum_members_come_from_the_pool(
            pool_size in 1usize..64,
            quorum in 1usize..10,
            seed in any::<u64>(),
        ) {
            let pool: Vec<usize> = (0..pool_size).collect();
            let rng = SeededRandomness::new(seed);
            let selected = select_quorum(&pool, quorum, &rng);
            prop_assert_eq!(selected.len(), quorum.min(pool_size));
            for member in &selected {
                prop_assert!(pool.contains(member));
            }
            let mut sorted = selected;
            sorted.sort_unstable();
            sorted.dedup();
            prop_assert_eq!(sorted.len(), quorum.min(pool_size));
        }
    }
}
