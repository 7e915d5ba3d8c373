//! Layer implementations and the parameter-visitation seam.
//!
//! The optimizer, the gradient all-reduce, the initial state broadcast, and
//! the checkpoint writer all consume the model through `ParamVisitor` /
//! `BufferVisitor` rather than through layer-specific APIs.

mod batchnorm;
mod conv;
mod linear;
mod pool;
mod relu;

pub use batchnorm::BatchNorm2d;
pub use conv::Conv2d;
pub use linear::Linear;
pub use pool::{GlobalAvgPool, MaxPool2d};
pub use relu::Relu;

use ndarray::{Array, Dimension};

/// Visits every trainable parameter as a flat value/gradient slice pair.
pub trait ParamVisitor {
    fn param(&mut self, name: &str, shape: &[usize], value: &mut [f32], grad: &mut [f32]);
}

/// Visits every non-trainable state tensor (batch-norm running statistics).
pub trait BufferVisitor {
    fn buffer(&mut self, name: &str, shape: &[usize], value: &mut [f32]);
}

/// A model whose parameters and buffers can be walked in a stable order.
///
/// The visitation order defines the flat layout used by the optimizer's
/// velocity buffer, the gradient all-reduce, and the state broadcast, so it
/// must be identical on every rank and across calls.
pub trait Visitable: Send {
    fn visit_params(&mut self, visitor: &mut dyn ParamVisitor);
    fn visit_buffers(&mut self, visitor: &mut dyn BufferVisitor);
}

/// Flat view of an owned array. Owned arrays are always standard layout.
pub(crate) fn flat<D: Dimension>(a: &mut Array<f32, D>) -> &mut [f32] {
    a.as_slice_mut().expect("owned arrays are standard layout")
}
