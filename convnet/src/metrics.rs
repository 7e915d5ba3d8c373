use ndarray::Array2;

/// Running multiclass-accuracy accumulator.
///
/// Tracks raw correct/total counts so a cross-rank reduction can sum counts
/// rather than average per-rank ratios. Each pass owns a fresh instance.
#[derive(Debug, Default, Clone)]
pub struct MulticlassAccuracy {
    correct: u64,
    total: u64,
}

impl MulticlassAccuracy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scores one batch of logits against its labels (argmax prediction).
    pub fn update(&mut self, logits: &Array2<f32>, labels: &[u8]) {
        debug_assert_eq!(logits.dim().0, labels.len());

        for (row, &label) in logits.rows().into_iter().zip(labels) {
            let mut best = 0;
            let mut best_v = f32::NEG_INFINITY;
            for (j, &v) in row.iter().enumerate() {
                if v > best_v {
                    best_v = v;
                    best = j;
                }
            }

            if best == label as usize {
                self.correct += 1;
            }
            self.total += 1;
        }
    }

    /// Raw counts as an f32 pair, the unit the all-reduce sums.
    pub fn counts(&self) -> [f32; 2] {
        [self.correct as f32, self.total as f32]
    }

    /// Accuracy from (possibly reduced) counts.
    pub fn ratio(counts: &[f32; 2]) -> f32 {
        if counts[1] == 0.0 {
            0.0
        } else {
            counts[0] / counts[1]
        }
    }
}
