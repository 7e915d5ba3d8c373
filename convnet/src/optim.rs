use crate::layers::{ParamVisitor, Visitable};

/// SGD with momentum and weight decay over a flat velocity buffer.
///
/// Update per scalar: `g = grad + wd * w; v = mu * v + g; w -= lr * v`.
pub struct Sgd {
    lr: f32,
    momentum: f32,
    weight_decay: f32,
    velocity: Vec<f32>,
}

impl Sgd {
    pub fn new(lr: f32, momentum: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            momentum,
            weight_decay,
            velocity: Vec::new(),
        }
    }

    pub fn lr(&self) -> f32 {
        self.lr
    }

    /// Sets the effective learning rate (driven by the LR schedule).
    pub fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    /// Applies one update step from the accumulated gradients.
    pub fn step(&mut self, model: &mut dyn Visitable) {
        struct Step<'a> {
            lr: f32,
            momentum: f32,
            weight_decay: f32,
            velocity: &'a mut Vec<f32>,
            offset: usize,
        }

        impl ParamVisitor for Step<'_> {
            fn param(&mut self, _: &str, _: &[usize], value: &mut [f32], grad: &mut [f32]) {
                let end = self.offset + value.len();
                if self.velocity.len() < end {
                    self.velocity.resize(end, 0.0);
                }

                let vel = &mut self.velocity[self.offset..end];
                for ((w, g), v) in value.iter_mut().zip(grad.iter()).zip(vel.iter_mut()) {
                    let g = g + self.weight_decay * *w;
                    *v = self.momentum * *v + g;
                    *w -= self.lr * *v;
                }

                self.offset = end;
            }
        }

        let mut step = Step {
            lr: self.lr,
            momentum: self.momentum,
            weight_decay: self.weight_decay,
            velocity: &mut self.velocity,
            offset: 0,
        };

        model.visit_params(&mut step);
    }

    /// Clears every parameter gradient before the next batch.
    pub fn zero_grad(&self, model: &mut dyn Visitable) {
        struct Zero;

        impl ParamVisitor for Zero {
            fn param(&mut self, _: &str, _: &[usize], _: &mut [f32], grad: &mut [f32]) {
                grad.fill(0.0);
            }
        }

        model.visit_params(&mut Zero);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{BufferVisitor, Visitable};

    struct OneParam {
        value: Vec<f32>,
        grad: Vec<f32>,
    }

    impl Visitable for OneParam {
        fn visit_params(&mut self, visitor: &mut dyn ParamVisitor) {
            visitor.param("p", &[self.value.len()], &mut self.value, &mut self.grad);
        }

        fn visit_buffers(&mut self, _: &mut dyn BufferVisitor) {}
    }

    #[test]
    fn momentum_accumulates_across_steps() {
        let mut model = OneParam {
            value: vec![1.0],
            grad: vec![1.0],
        };
        let mut sgd = Sgd::new(0.1, 0.9, 0.0);

        sgd.step(&mut model); // v = 1.0, w = 1 - 0.1 = 0.9
        assert!((model.value[0] - 0.9).abs() < 1e-6);

        sgd.step(&mut model); // v = 0.9 + 1 = 1.9, w = 0.9 - 0.19 = 0.71
        assert!((model.value[0] - 0.71).abs() < 1e-6);
    }

    #[test]
    fn weight_decay_pulls_toward_zero() {
        let mut model = OneParam {
            value: vec![2.0],
            grad: vec![0.0],
        };
        let mut sgd = Sgd::new(0.5, 0.0, 0.1);

        sgd.step(&mut model); // g = 0 + 0.1*2 = 0.2, w = 2 - 0.1 = 1.9
        assert!((model.value[0] - 1.9).abs() < 1e-6);
    }

    #[test]
    fn zero_grad_clears_accumulated_gradients() {
        let mut model = OneParam {
            value: vec![0.0],
            grad: vec![3.0],
        };

        Sgd::new(0.1, 0.9, 0.0).zero_grad(&mut model);
        assert_eq!(model.grad, vec![0.0]);
    }
}
