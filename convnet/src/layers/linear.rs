use ndarray::{Array1, Array2, Axis};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::Rng;

use super::{ParamVisitor, flat};

/// Fully-connected layer, used as the replaceable classification head.
pub struct Linear {
    weight: Array2<f32>, // (out, in)
    bias: Array1<f32>,
    wgrad: Array2<f32>,
    bgrad: Array1<f32>,
    x: Array2<f32>, // cached input
}

impl Linear {
    pub fn new<R: Rng>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (in_features as f32).sqrt();
        let dist = Uniform::new(-bound, bound).expect("bound is finite and positive");

        Self {
            weight: Array2::random_using((out_features, in_features), dist, rng),
            bias: Array1::random_using(out_features, dist, rng),
            wgrad: Array2::zeros((out_features, in_features)),
            bgrad: Array1::zeros(out_features),
            x: Array2::zeros((0, 0)),
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.dim().1
    }

    pub fn forward(&mut self, x: Array2<f32>) -> Array2<f32> {
        let y = x.dot(&self.weight.t()) + &self.bias;
        self.x = x;
        y
    }

    pub fn backward(&mut self, dy: &Array2<f32>) -> Array2<f32> {
        self.wgrad += &dy.t().dot(&self.x);
        self.bgrad += &dy.sum_axis(Axis(0));
        dy.dot(&self.weight)
    }

    pub fn visit_params(&mut self, name: &str, visitor: &mut dyn ParamVisitor) {
        let wshape = self.weight.shape().to_vec();
        visitor.param(
            &format!("{name}.weight"),
            &wshape,
            flat(&mut self.weight),
            flat(&mut self.wgrad),
        );

        let bshape = [self.bias.len()];
        visitor.param(
            &format!("{name}.bias"),
            &bshape,
            flat(&mut self.bias),
            flat(&mut self.bgrad),
        );
    }
}
