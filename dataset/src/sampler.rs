use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

/// Deterministic shard assignment across ranks.
///
/// Every rank derives the same per-epoch permutation from
/// `base_seed + epoch`, pads it to a multiple of `world_size` by
/// wrapping, then takes a strided slice. Shards are disjoint and
/// equal-length with no communication.
#[derive(Debug, Clone, Copy)]
pub struct DistributedSampler {
    num_samples: usize,
    world_size: usize,
    rank: usize,
    base_seed: u64,
    shuffle: bool,
}

impl DistributedSampler {
    /// # Panics
    /// - if `world_size == 0`
    /// - if `rank >= world_size`
    pub fn new(
        num_samples: usize,
        world_size: usize,
        rank: usize,
        base_seed: u64,
        shuffle: bool,
    ) -> Self {
        assert!(world_size > 0, "world_size must be > 0");
        assert!(rank < world_size, "rank must be < world_size");
        Self { num_samples, world_size, rank, base_seed, shuffle }
    }

    /// Samples each rank receives per epoch.
    #[inline]
    pub fn shard_len(&self) -> usize {
        self.num_samples.div_ceil(self.world_size)
    }

    /// This rank's sample indices for `epoch`, in iteration order.
    pub fn indices_for_epoch(&self, epoch: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.num_samples).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.base_seed.wrapping_add(epoch as u64));
            indices.shuffle(&mut rng);
        }

        // Wrap the head of the list so every rank gets the same count.
        let padded_len = self.shard_len() * self.world_size;
        let shortfall = padded_len - indices.len();
        let extra: Vec<usize> = indices[..shortfall].to_vec();
        indices.extend(extra);

        indices
            .into_iter()
            .skip(self.rank)
            .step_by(self.world_size)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unshuffled_single_rank_is_identity() {
        let sampler = DistributedSampler::new(6, 1, 0, 0, false);
        assert_eq!(sampler.indices_for_epoch(0), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(sampler.shard_len(), 6);
    }

    #[test]
    fn shards_are_disjoint_equal_and_cover_all_samples() {
        let n = 10;
        let world = 3;
        let shards: Vec<Vec<usize>> = (0..world)
            .map(|rank| DistributedSampler::new(n, world, rank, 42, true).indices_for_epoch(5))
            .collect();

        for shard in &shards {
            assert_eq!(shard.len(), 4);
        }

        // The union is every sample once plus the wrapped padding.
        let mut seen = vec![0usize; n];
        for shard in &shards {
            for &idx in shard {
                seen[idx] += 1;
            }
        }
        assert_eq!(seen.iter().sum::<usize>(), 12);
        assert!(seen.iter().all(|&count| count >= 1));
    }

    #[test]
    fn ranks_stride_the_same_permutation() {
        let n = 8;
        let world = 2;
        let a = DistributedSampler::new(n, world, 0, 7, true).indices_for_epoch(2);
        let b = DistributedSampler::new(n, world, 1, 7, true).indices_for_epoch(2);

        // Interleaving the shards reconstructs one shared permutation.
        let mut merged = Vec::with_capacity(n);
        for (x, y) in a.iter().zip(&b) {
            merged.push(*x);
            merged.push(*y);
        }
        let mut sorted = merged.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn epochs_reshuffle() {
        let sampler = DistributedSampler::new(32, 1, 0, 9, true);
        assert_ne!(sampler.indices_for_epoch(0), sampler.indices_for_epoch(1));
        assert_eq!(sampler.indices_for_epoch(1), sampler.indices_for_epoch(1));
    }
}
