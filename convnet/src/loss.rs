use ndarray::Array2;

use crate::NetError;

/// Softmax cross-entropy, averaged over the batch.
///
/// Produces the scalar loss and the logits gradient in one pass since the
/// training loop always needs both.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    pub fn new() -> Self {
        Self
    }

    /// # Errors
    /// `ShapeMismatch` when `labels` does not match the batch dimension,
    /// `InvalidInput` when a label is out of class range or the batch is
    /// empty.
    pub fn forward(
        &self,
        logits: &Array2<f32>,
        labels: &[u8],
    ) -> Result<(f32, Array2<f32>), NetError> {
        let (n, classes) = logits.dim();

        if labels.len() != n {
            return Err(NetError::ShapeMismatch {
                what: "labels",
                got: labels.len(),
                expected: n,
            });
        }

        if n == 0 {
            return Err(NetError::InvalidInput("empty batch"));
        }

        if labels.iter().any(|&l| l as usize >= classes) {
            return Err(NetError::InvalidInput("label out of class range"));
        }

        let mut dlogits = Array2::zeros((n, classes));
        let mut loss = 0.0;
        let inv_n = 1.0 / n as f32;

        for (i, row) in logits.rows().into_iter().enumerate() {
            let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            let sum_exp: f32 = row.iter().map(|&v| (v - max).exp()).sum();
            let log_sum_exp = max + sum_exp.ln();

            let label = labels[i] as usize;
            loss += log_sum_exp - row[label];

            for (j, &v) in row.iter().enumerate() {
                let softmax = ((v - max).exp()) / sum_exp;
                let one_hot = if j == label { 1.0 } else { 0.0 };
                dlogits[[i, j]] = (softmax - one_hot) * inv_n;
            }
        }

        Ok((loss * inv_n, dlogits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn uniform_logits_cost_ln_classes() {
        let loss = CrossEntropyLoss::new();
        let logits = array![[0.0f32, 0.0]];
        let (value, dlogits) = loss.forward(&logits, &[0]).unwrap();

        assert!((value - 2.0f32.ln()).abs() < 1e-6);
        // softmax = [0.5, 0.5]; gradient pulls the labeled logit up.
        assert!((dlogits[[0, 0]] + 0.5).abs() < 1e-6);
        assert!((dlogits[[0, 1]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn gradient_rows_sum_to_zero() {
        let loss = CrossEntropyLoss::new();
        let logits = array![[2.0f32, -1.0, 0.5], [0.0, 0.0, 3.0]];
        let (_, dlogits) = loss.forward(&logits, &[2, 0]).unwrap();

        for row in dlogits.rows() {
            assert!(row.sum().abs() < 1e-6);
        }
    }

    #[test]
    fn label_out_of_range_is_rejected() {
        let loss = CrossEntropyLoss::new();
        let logits = array![[0.0f32, 0.0]];
        assert!(loss.forward(&logits, &[2]).is_err());
        assert!(loss.forward(&logits, &[0, 1]).is_err());
    }
}
