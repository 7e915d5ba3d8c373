use ndarray::{Array2, Array4};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Normal;
use rand::Rng;

use super::{ParamVisitor, flat};

/// 2D convolution without bias (as in the ResNet recipe, where every conv
/// is followed by batch norm).
///
/// Forward runs as im2col + matmul; the column matrix is cached for the
/// backward pass.
pub struct Conv2d {
    weight: Array4<f32>, // (c_out, c_in, kh, kw)
    wgrad: Array4<f32>,
    stride: usize,
    padding: usize,
    cols: Array2<f32>, // (n * oh * ow, c_in * kh * kw)
    in_shape: (usize, usize, usize, usize),
}

impl Conv2d {
    /// Creates a conv layer with He-normal initialized kernels.
    pub fn new<R: Rng>(
        c_in: usize,
        c_out: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        rng: &mut R,
    ) -> Self {
        let fan_in = (c_in * kernel * kernel) as f32;
        let std = (2.0 / fan_in).sqrt();
        let dist = Normal::new(0.0, std).expect("std is finite and positive");

        Self {
            weight: Array4::random_using((c_out, c_in, kernel, kernel), dist, rng),
            wgrad: Array4::zeros((c_out, c_in, kernel, kernel)),
            stride,
            padding,
            cols: Array2::zeros((0, 0)),
            in_shape: (0, 0, 0, 0),
        }
    }

    pub fn out_channels(&self) -> usize {
        self.weight.dim().0
    }

    fn out_hw(&self, h: usize, w: usize) -> (usize, usize) {
        let (_, _, kh, kw) = self.weight.dim();
        let oh = (h + 2 * self.padding - kh) / self.stride + 1;
        let ow = (w + 2 * self.padding - kw) / self.stride + 1;
        (oh, ow)
    }

    pub fn forward(&mut self, x: &Array4<f32>) -> Array4<f32> {
        let (n, c_in, h, w) = x.dim();
        let (c_out, wc_in, kh, kw) = self.weight.dim();
        debug_assert_eq!(c_in, wc_in);

        let (oh, ow) = self.out_hw(h, w);
        self.in_shape = x.dim();
        self.cols = im2col(x, kh, kw, self.stride, self.padding, oh, ow);

        let wmat = self
            .weight
            .view()
            .into_shape_with_order((c_out, c_in * kh * kw))
            .expect("kernel is standard layout");

        let out = self.cols.dot(&wmat.t()); // (n*oh*ow, c_out)
        out.into_shape_with_order((n, oh, ow, c_out))
            .expect("matmul output is standard layout")
            .permuted_axes([0, 3, 1, 2])
            .as_standard_layout()
            .to_owned()
    }

    /// Accumulates the kernel gradient and returns the input gradient.
    pub fn backward(&mut self, dy: &Array4<f32>) -> Array4<f32> {
        let (n, c_in, h, w) = self.in_shape;
        let (c_out, _, kh, kw) = self.weight.dim();
        let (_, _, oh, ow) = dy.dim();

        // (n, c_out, oh, ow) -> (n*oh*ow, c_out)
        let dyt = dy
            .view()
            .permuted_axes([0, 2, 3, 1])
            .as_standard_layout()
            .to_owned()
            .into_shape_with_order((n * oh * ow, c_out))
            .expect("permuted copy is standard layout");

        let wg = dyt.t().dot(&self.cols); // (c_out, c_in*kh*kw)
        self.wgrad += &wg
            .into_shape_with_order((c_out, c_in, kh, kw))
            .expect("matmul output is standard layout");

        let wmat = self
            .weight
            .view()
            .into_shape_with_order((c_out, c_in * kh * kw))
            .expect("kernel is standard layout");

        let dcols = dyt.dot(&wmat); // (n*oh*ow, c_in*kh*kw)
        col2im(
            &dcols,
            (n, c_in, h, w),
            kh,
            kw,
            self.stride,
            self.padding,
            oh,
            ow,
        )
    }

    pub fn visit_params(&mut self, name: &str, visitor: &mut dyn ParamVisitor) {
        let shape = self.weight.shape().to_vec();
        visitor.param(name, &shape, flat(&mut self.weight), flat(&mut self.wgrad));
    }
}

fn im2col(
    x: &Array4<f32>,
    kh: usize,
    kw: usize,
    stride: usize,
    padding: usize,
    oh: usize,
    ow: usize,
) -> Array2<f32> {
    let (n, c_in, h, w) = x.dim();
    let mut cols = Array2::zeros((n * oh * ow, c_in * kh * kw));

    for b in 0..n {
        for oy in 0..oh {
            for ox in 0..ow {
                let row = (b * oh + oy) * ow + ox;
                let mut col = 0;
                for c in 0..c_in {
                    for ky in 0..kh {
                        for kx in 0..kw {
                            let iy = (oy * stride + ky) as isize - padding as isize;
                            let ix = (ox * stride + kx) as isize - padding as isize;
                            if iy >= 0 && (iy as usize) < h && ix >= 0 && (ix as usize) < w {
                                cols[[row, col]] = x[[b, c, iy as usize, ix as usize]];
                            }
                            col += 1;
                        }
                    }
                }
            }
        }
    }

    cols
}

#[allow(clippy::too_many_arguments)]
fn col2im(
    dcols: &Array2<f32>,
    in_shape: (usize, usize, usize, usize),
    kh: usize,
    kw: usize,
    stride: usize,
    padding: usize,
    oh: usize,
    ow: usize,
) -> Array4<f32> {
    let (n, c_in, h, w) = in_shape;
    let mut dx = Array4::zeros(in_shape);

    for b in 0..n {
        for oy in 0..oh {
            for ox in 0..ow {
                let row = (b * oh + oy) * ow + ox;
                let mut col = 0;
                for c in 0..c_in {
                    for ky in 0..kh {
                        for kx in 0..kw {
                            let iy = (oy * stride + ky) as isize - padding as isize;
                            let ix = (ox * stride + kx) as isize - padding as isize;
                            if iy >= 0 && (iy as usize) < h && ix >= 0 && (ix as usize) < w {
                                dx[[b, c, iy as usize, ix as usize]] += dcols[[row, col]];
                            }
                            col += 1;
                        }
                    }
                }
            }
        }
    }

    dx
}
