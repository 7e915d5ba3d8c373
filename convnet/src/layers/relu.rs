use ndarray::Array4;

/// ReLU with a cached 0/1 mask for the backward pass.
#[derive(Default)]
pub struct Relu {
    mask: Array4<f32>,
}

impl Relu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, mut x: Array4<f32>) -> Array4<f32> {
        self.mask = x.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
        x.mapv_inplace(|v| v.max(0.0));
        x
    }

    pub fn backward(&self, dy: &Array4<f32>) -> Array4<f32> {
        dy * &self.mask
    }
}
