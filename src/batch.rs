//! Partitions an ordered event collection into batches for throughput control.

use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// How many events each batch should carry.
///
/// `Range` draws a fresh size per batch from the inclusive range, which
/// the simulation uses to exercise downstream consumers with uneven load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPolicy {
    Fixed(usize),
    Range { min: usize, max: usize },
}

impl BatchPolicy {
    fn next_size(&self, rng: &mut StdRng) -> usize {
        let size = match *self {
            BatchPolicy::Fixed(n) => n,
            BatchPolicy::Range { min, max } => {
                let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
                rng.gen_range(lo..=hi)
            }
        };
        size.max(1)
    }
}

/// Lazy iterator over consecutive slices of the input.
pub struct Batches<'a, T> {
    remaining: &'a [T],
    policy: BatchPolicy,
    rng: StdRng,
}

impl<'a, T> Iterator for Batches<'a, T> {
    type Item = &'a [T];

    fn next(&mut self) -> Option<&'a [T]> {
        if self.remaining.is_empty() {
            return None;
        }
        let size = self.policy.next_size(&mut self.rng).min(self.remaining.len());
        let (batch, rest) = self.remaining.split_at(size);
        self.remaining = rest;
        Some(batch)
    }
}

/// Yields batches covering `items` exactly once, in order, with no event
/// duplicated or dropped.
pub fn batches<T>(items: &[T], policy: BatchPolicy) -> Batches<'_, T> {
    Batches {
        remaining: items,
        policy,
        rng: StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_batches_cover_input_exactly() {
        let items: Vec<u32> = (0..257).collect();
        let rebuilt: Vec<u32> = batches(&items, BatchPolicy::Fixed(100))
            .flatten()
            .copied()
            .collect();
        assert_eq!(rebuilt, items);
    }

    #[test]
    fn test_fixed_batch_sizes() {
        let items: Vec<u32> = (0..250).collect();
        let sizes: Vec<usize> = batches(&items, BatchPolicy::Fixed(100))
            .map(|b| b.len())
            .collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[test]
    fn test_range_batches_cover_input_exactly() {
        let items: Vec<u32> = (0..1000).collect();
        let policy = BatchPolicy::Range { min: 3, max: 17 };

        let mut sizes = Vec::new();
        let mut rebuilt = Vec::new();
        for batch in batches(&items, policy) {
            sizes.push(batch.len());
            rebuilt.extend_from_slice(batch);
        }

        assert_eq!(rebuilt, items);
        // Every full batch stays inside the configured range; only the
        // final remainder batch may be smaller.
        for &size in &sizes[..sizes.len() - 1] {
            assert!((3..=17).contains(&size), "batch size {size} out of range");
        }
        assert!(*sizes.last().unwrap() <= 17);
    }

    #[test]
    fn test_zero_size_clamped() {
        let items = vec![1, 2, 3];
        let sizes: Vec<usize> = batches(&items, BatchPolicy::Fixed(0)).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![1, 1, 1]);
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let items: Vec<u32> = Vec::new();
        assert_eq!(batches(&items, BatchPolicy::Fixed(10)).count(), 0);
    }

    #[test]
    fn test_inverted_range_is_tolerated() {
        let items: Vec<u32> = (0..50).collect();
        let rebuilt: Vec<u32> = batches(&items, BatchPolicy::Range { min: 9, max: 4 })
            .flatten()
            .copied()
            .collect();
        assert_eq!(rebuilt, items);
    }
}
