use ndarray::{Array1, Array4, Zip, s};

use super::{BufferVisitor, ParamVisitor, flat};

/// Batch normalization over (N, H, W) per channel.
///
/// Training mode normalizes with batch statistics and updates the running
/// estimates; eval mode normalizes with the running estimates. Running
/// variance keeps the unbiased estimate.
pub struct BatchNorm2d {
    gamma: Array1<f32>,
    beta: Array1<f32>,
    ggrad: Array1<f32>,
    bgrad: Array1<f32>,
    running_mean: Array1<f32>,
    running_var: Array1<f32>,
    momentum: f32,
    eps: f32,
    xhat: Array4<f32>,
    invstd: Array1<f32>,
}

impl BatchNorm2d {
    pub fn new(channels: usize) -> Self {
        Self {
            gamma: Array1::ones(channels),
            beta: Array1::zeros(channels),
            ggrad: Array1::zeros(channels),
            bgrad: Array1::zeros(channels),
            running_mean: Array1::zeros(channels),
            running_var: Array1::ones(channels),
            momentum: 0.1,
            eps: 1e-5,
            xhat: Array4::zeros((0, 0, 0, 0)),
            invstd: Array1::zeros(channels),
        }
    }

    pub fn forward(&mut self, x: &Array4<f32>, train: bool) -> Array4<f32> {
        if train {
            self.forward_train(x)
        } else {
            self.forward_eval(x)
        }
    }

    fn forward_train(&mut self, x: &Array4<f32>) -> Array4<f32> {
        let (n, c, h, w) = x.dim();
        let count = (n * h * w) as f32;

        let mut y = Array4::zeros(x.dim());
        self.xhat = Array4::zeros(x.dim());

        for ch in 0..c {
            let xc = x.slice(s![.., ch, .., ..]);
            let mean = xc.sum() / count;
            let var = xc.fold(0.0, |acc, &v| acc + (v - mean) * (v - mean)) / count;
            let inv = 1.0 / (var + self.eps).sqrt();
            self.invstd[ch] = inv;

            let gamma = self.gamma[ch];
            let beta = self.beta[ch];

            Zip::from(self.xhat.slice_mut(s![.., ch, .., ..]))
                .and(y.slice_mut(s![.., ch, .., ..]))
                .and(xc)
                .for_each(|xh, yv, &xv| {
                    *xh = (xv - mean) * inv;
                    *yv = gamma * *xh + beta;
                });

            self.running_mean[ch] = (1.0 - self.momentum) * self.running_mean[ch]
                + self.momentum * mean;
            let unbiased = if count > 1.0 { var * count / (count - 1.0) } else { var };
            self.running_var[ch] = (1.0 - self.momentum) * self.running_var[ch]
                + self.momentum * unbiased;
        }

        y
    }

    fn forward_eval(&self, x: &Array4<f32>) -> Array4<f32> {
        let (_, c, _, _) = x.dim();
        let mut y = Array4::zeros(x.dim());

        for ch in 0..c {
            let inv = 1.0 / (self.running_var[ch] + self.eps).sqrt();
            let mean = self.running_mean[ch];
            let gamma = self.gamma[ch];
            let beta = self.beta[ch];

            Zip::from(y.slice_mut(s![.., ch, .., ..]))
                .and(x.slice(s![.., ch, .., ..]))
                .for_each(|yv, &xv| {
                    *yv = gamma * (xv - mean) * inv + beta;
                });
        }

        y
    }

    /// Backward for the training-mode forward.
    pub fn backward(&mut self, dy: &Array4<f32>) -> Array4<f32> {
        let (n, c, h, w) = dy.dim();
        let count = (n * h * w) as f32;

        let mut dx = Array4::zeros(dy.dim());

        for ch in 0..c {
            let dyc = dy.slice(s![.., ch, .., ..]);
            let xh = self.xhat.slice(s![.., ch, .., ..]);

            let sum_dy = dyc.sum();
            let sum_dy_xhat = Zip::from(dyc).and(xh).fold(0.0, |acc, &d, &x| acc + d * x);

            self.ggrad[ch] += sum_dy_xhat;
            self.bgrad[ch] += sum_dy;

            let scale = self.gamma[ch] * self.invstd[ch] / count;
            Zip::from(dx.slice_mut(s![.., ch, .., ..]))
                .and(dyc)
                .and(xh)
                .for_each(|dxv, &d, &x| {
                    *dxv = scale * (count * d - sum_dy - x * sum_dy_xhat);
                });
        }

        dx
    }

    pub fn visit_params(&mut self, name: &str, visitor: &mut dyn ParamVisitor) {
        let shape = [self.gamma.len()];
        visitor.param(
            &format!("{name}.weight"),
            &shape,
            flat(&mut self.gamma),
            flat(&mut self.ggrad),
        );
        visitor.param(
            &format!("{name}.bias"),
            &shape,
            flat(&mut self.beta),
            flat(&mut self.bgrad),
        );
    }

    pub fn visit_buffers(&mut self, name: &str, visitor: &mut dyn BufferVisitor) {
        let shape = [self.running_mean.len()];
        visitor.buffer(
            &format!("{name}.running_mean"),
            &shape,
            flat(&mut self.running_mean),
        );
        visitor.buffer(
            &format!("{name}.running_var"),
            &shape,
            flat(&mut self.running_var),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn training_forward_normalizes_each_channel() {
        let mut bn = BatchNorm2d::new(1);
        let x = array![[[[1.0f32, 2.0], [3.0, 4.0]]]];
        let y = bn.forward(&x, true);

        let mean = y.sum() / 4.0;
        let var = y.fold(0.0, |acc, &v| acc + (v - mean) * (v - mean)) / 4.0;
        assert!(mean.abs() < 1e-5);
        assert!((var - 1.0).abs() < 1e-3);
    }

    #[test]
    fn eval_forward_uses_running_statistics() {
        let mut bn = BatchNorm2d::new(1);
        // Fresh running stats are mean 0 / var 1, so eval is near-identity.
        let x = array![[[[0.5f32, -0.5], [1.5, -1.5]]]];
        let y = bn.forward(&x, false);

        for (yv, xv) in y.iter().zip(x.iter()) {
            assert!((yv - xv).abs() < 1e-4);
        }
    }

    #[test]
    fn backward_gradient_sums_match_identities() {
        let mut bn = BatchNorm2d::new(1);
        let x = array![[[[1.0f32, 2.0], [3.0, 5.0]]]];
        bn.forward(&x, true);

        let dy = array![[[[1.0f32, 0.0], [0.0, 0.0]]]];
        let dx = bn.backward(&dy);

        // Normalization is invariant to input shifts, so dx sums to zero.
        assert!(dx.sum().abs() < 1e-5);
        assert_eq!(bn.bgrad[0], 1.0);
    }
}
