use ndarray::{Array4, s};
use rand::{SeedableRng, rngs::StdRng};

use crate::{Augment, CHANNELS, Cifar10, DistributedSampler, IMAGE_SIDE};

/// Shard-aware batch iterator over one CIFAR-10 split.
///
/// Owns its augmentation rng so ranks draw independent crops and flips
/// while the shard assignment itself stays deterministic.
#[derive(Debug, Clone)]
pub struct Loader {
    data: Cifar10,
    sampler: DistributedSampler,
    transform: Augment,
    bsz: usize,
    order: Vec<usize>,
    cursor: usize,
    aug_seed: u64,
    rng: StdRng,
}

impl Loader {
    /// # Panics
    /// - if `bsz == 0`
    pub fn new(
        data: Cifar10,
        sampler: DistributedSampler,
        transform: Augment,
        bsz: usize,
        aug_seed: u64,
    ) -> Self {
        assert!(bsz > 0, "bsz must be > 0");
        let mut loader = Self {
            data,
            sampler,
            transform,
            bsz,
            order: Vec::new(),
            cursor: 0,
            aug_seed,
            rng: StdRng::seed_from_u64(aug_seed),
        };
        loader.reset(0);
        loader
    }

    /// Samples this rank sees per epoch.
    #[inline]
    pub fn shard_len(&self) -> usize {
        self.order.len()
    }

    /// Batches this rank sees per epoch.
    #[inline]
    pub fn num_batches(&self) -> usize {
        self.order.len().div_ceil(self.bsz)
    }

    /// Re-shuffles for `epoch` and rewinds to the first batch.
    pub fn reset(&mut self, epoch: usize) {
        self.order = self.sampler.indices_for_epoch(epoch);
        self.cursor = 0;
        self.rng = StdRng::seed_from_u64(self.aug_seed.wrapping_add(epoch as u64));
    }

    /// Assembles the next batch, or None when the shard is exhausted.
    ///
    /// The final batch of a shard may hold fewer than `bsz` samples.
    pub fn next_batch(&mut self) -> Option<(Array4<f32>, Vec<u8>)> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.bsz).min(self.order.len());
        let picks = &self.order[self.cursor..end];

        let mut images = Array4::<f32>::zeros((picks.len(), CHANNELS, IMAGE_SIDE, IMAGE_SIDE));
        let mut labels = Vec::with_capacity(picks.len());
        for (i, &idx) in picks.iter().enumerate() {
            let img = self.transform.apply(self.data.image(idx), &mut self.rng);
            images.slice_mut(s![i, .., .., ..]).assign(&img);
            labels.push(self.data.label(idx));
        }

        self.cursor = end;
        Some((images, labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(n: usize) -> Cifar10 {
        let mut images = ndarray::Array4::<u8>::zeros((n, CHANNELS, IMAGE_SIDE, IMAGE_SIDE));
        for i in 0..n {
            images[[i, 0, 0, 0]] = i as u8;
        }
        let labels = (0..n).map(|i| (i % 10) as u8).collect();
        Cifar10::from_raw(images, labels).unwrap()
    }

    #[test]
    fn batches_cover_shard_with_partial_tail() {
        let sampler = DistributedSampler::new(7, 1, 0, 0, false);
        let mut loader = Loader::new(synthetic(7), sampler, Augment::eval(), 3, 0);

        assert_eq!(loader.shard_len(), 7);
        assert_eq!(loader.num_batches(), 3);

        let (x1, y1) = loader.next_batch().unwrap();
        assert_eq!(x1.dim(), (3, CHANNELS, IMAGE_SIDE, IMAGE_SIDE));
        assert_eq!(y1, vec![0, 1, 2]);

        let (_, y2) = loader.next_batch().unwrap();
        assert_eq!(y2, vec![3, 4, 5]);

        let (x3, y3) = loader.next_batch().unwrap();
        assert_eq!(x3.dim(), (1, CHANNELS, IMAGE_SIDE, IMAGE_SIDE));
        assert_eq!(y3, vec![6]);

        assert!(loader.next_batch().is_none());
    }

    #[test]
    fn reset_rewinds_and_reproduces_the_epoch() {
        let sampler = DistributedSampler::new(5, 1, 0, 0, false);
        let mut loader = Loader::new(synthetic(5), sampler, Augment::eval(), 2, 0);

        let (first, _) = loader.next_batch().unwrap();
        while loader.next_batch().is_some() {}

        loader.reset(0);
        let (again, _) = loader.next_batch().unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn two_ranks_split_every_sample() {
        let n = 8;
        let mut seen = Vec::new();
        for rank in 0..2 {
            let sampler = DistributedSampler::new(n, 2, rank, 0, false);
            let mut loader = Loader::new(synthetic(n), sampler, Augment::eval(), 4, rank as u64);
            while let Some((_, labels)) = loader.next_batch() {
                seen.extend(labels);
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..n).map(|i| i as u8).collect::<Vec<_>>());
    }
}
