use ndarray::{Array2, Array4, Axis};

use super::flat;

/// Max pooling with cached argmax indices.
pub struct MaxPool2d {
    kernel: usize,
    stride: usize,
    padding: usize,
    // Flat input index chosen per output element, None where the window
    // covered only padding.
    argmax: Vec<Option<usize>>,
    in_shape: (usize, usize, usize, usize),
    out_shape: (usize, usize, usize, usize),
}

impl MaxPool2d {
    pub fn new(kernel: usize, stride: usize, padding: usize) -> Self {
        Self {
            kernel,
            stride,
            padding,
            argmax: Vec::new(),
            in_shape: (0, 0, 0, 0),
            out_shape: (0, 0, 0, 0),
        }
    }

    pub fn forward(&mut self, x: &Array4<f32>) -> Array4<f32> {
        let (n, c, h, w) = x.dim();
        let oh = (h + 2 * self.padding - self.kernel) / self.stride + 1;
        let ow = (w + 2 * self.padding - self.kernel) / self.stride + 1;

        self.in_shape = x.dim();
        self.out_shape = (n, c, oh, ow);
        self.argmax.clear();
        self.argmax.resize(n * c * oh * ow, None);

        let mut y = Array4::zeros((n, c, oh, ow));

        for b in 0..n {
            for ch in 0..c {
                for oy in 0..oh {
                    for ox in 0..ow {
                        let mut best = f32::NEG_INFINITY;
                        let mut best_idx = None;

                        for ky in 0..self.kernel {
                            for kx in 0..self.kernel {
                                let iy = (oy * self.stride + ky) as isize - self.padding as isize;
                                let ix = (ox * self.stride + kx) as isize - self.padding as isize;
                                if iy < 0 || iy as usize >= h || ix < 0 || ix as usize >= w {
                                    continue;
                                }

                                let v = x[[b, ch, iy as usize, ix as usize]];
                                if v > best {
                                    best = v;
                                    best_idx =
                                        Some(((b * c + ch) * h + iy as usize) * w + ix as usize);
                                }
                            }
                        }

                        y[[b, ch, oy, ox]] = best;
                        self.argmax[((b * c + ch) * oh + oy) * ow + ox] = best_idx;
                    }
                }
            }
        }

        y
    }

    pub fn backward(&self, dy: &Array4<f32>) -> Array4<f32> {
        debug_assert_eq!(dy.dim(), self.out_shape);

        let mut dx = Array4::zeros(self.in_shape);
        let dx_flat = flat(&mut dx);

        for (src, dst) in dy.iter().zip(&self.argmax) {
            if let Some(dst) = dst {
                dx_flat[*dst] += *src;
            }
        }

        dx
    }
}

/// Global average pooling down to 1x1, yielding (batch, channels).
#[derive(Default)]
pub struct GlobalAvgPool {
    in_shape: (usize, usize, usize, usize),
}

impl GlobalAvgPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: &Array4<f32>) -> Array2<f32> {
        let (_, _, h, w) = x.dim();
        self.in_shape = x.dim();
        x.sum_axis(Axis(3)).sum_axis(Axis(2)) / (h * w) as f32
    }

    pub fn backward(&self, dy: &Array2<f32>) -> Array4<f32> {
        let (n, c, h, w) = self.in_shape;
        let scale = 1.0 / (h * w) as f32;

        let mut dx = Array4::zeros(self.in_shape);
        for b in 0..n {
            for ch in 0..c {
                let g = dy[[b, ch]] * scale;
                dx.slice_mut(ndarray::s![b, ch, .., ..]).fill(g);
            }
        }

        dx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn maxpool_picks_window_maxima_and_routes_gradient() {
        let mut pool = MaxPool2d::new(2, 2, 0);
        let x = array![[[[1.0f32, 2.0, 5.0, 1.0], [3.0, 4.0, 1.0, 1.0], [
            1.0, 1.0, 1.0, 1.0
        ], [1.0, 1.0, 1.0, 2.0]]]];

        let y = pool.forward(&x);
        assert_eq!(y.dim(), (1, 1, 2, 2));
        assert_eq!(y[[0, 0, 0, 0]], 4.0);
        assert_eq!(y[[0, 0, 0, 1]], 5.0);

        let mut dy = Array4::zeros((1, 1, 2, 2));
        dy[[0, 0, 0, 0]] = 1.0;
        dy[[0, 0, 0, 1]] = 2.0;

        let dx = pool.backward(&dy);
        assert_eq!(dx[[0, 0, 1, 1]], 1.0); // the 4.0
        assert_eq!(dx[[0, 0, 0, 2]], 2.0); // the 5.0
        assert_eq!(dx.sum(), 3.0);
    }

    #[test]
    fn avgpool_means_and_spreads_evenly() {
        let mut pool = GlobalAvgPool::new();
        let x = array![[[[1.0f32, 3.0], [5.0, 7.0]]]];

        let y = pool.forward(&x);
        assert_eq!(y, array![[4.0f32]]);

        let dy = array![[8.0f32]];
        let dx = pool.backward(&dy);
        assert_eq!(dx, array![[[[2.0f32, 2.0], [2.0, 2.0]]]]);
    }
}
