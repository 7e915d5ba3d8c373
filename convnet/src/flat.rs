//! Flat-buffer views over a visitable model.
//!
//! The gradient all-reduce and the initial state broadcast both operate on
//! one contiguous `f32` buffer; these helpers map between that buffer and
//! the per-layer tensors, relying on the stable visitation order.

use crate::NetError;
use crate::layers::{BufferVisitor, ParamVisitor, Visitable};

/// Total number of trainable scalars.
pub fn param_count(model: &mut dyn Visitable) -> usize {
    struct Count(usize);

    impl ParamVisitor for Count {
        fn param(&mut self, _: &str, _: &[usize], value: &mut [f32], _: &mut [f32]) {
            self.0 += value.len();
        }
    }

    let mut count = Count(0);
    model.visit_params(&mut count);
    count.0
}

/// Total number of scalars in params plus buffers (the broadcast unit).
pub fn state_len(model: &mut dyn Visitable) -> usize {
    struct Count(usize);

    impl BufferVisitor for Count {
        fn buffer(&mut self, _: &str, _: &[usize], value: &mut [f32]) {
            self.0 += value.len();
        }
    }

    let mut count = Count(param_count(model));
    model.visit_buffers(&mut count);
    count.0
}

/// Copies every parameter gradient into `out`, resizing it to fit.
pub fn flatten_grads(model: &mut dyn Visitable, out: &mut Vec<f32>) {
    struct Flatten<'a>(&'a mut Vec<f32>);

    impl ParamVisitor for Flatten<'_> {
        fn param(&mut self, _: &str, _: &[usize], _: &mut [f32], grad: &mut [f32]) {
            self.0.extend_from_slice(grad);
        }
    }

    out.clear();
    model.visit_params(&mut Flatten(out));
}

/// Copies `src` back into the parameter gradients.
///
/// # Errors
/// `ShapeMismatch` when `src` does not hold exactly one value per scalar.
pub fn unflatten_grads(model: &mut dyn Visitable, src: &[f32]) -> Result<(), NetError> {
    struct Scatter<'a> {
        src: &'a [f32],
        offset: usize,
        overrun: bool,
    }

    impl ParamVisitor for Scatter<'_> {
        fn param(&mut self, _: &str, _: &[usize], _: &mut [f32], grad: &mut [f32]) {
            let end = self.offset + grad.len();
            if end > self.src.len() {
                self.overrun = true;
                return;
            }

            grad.copy_from_slice(&self.src[self.offset..end]);
            self.offset = end;
        }
    }

    let mut scatter = Scatter {
        src,
        offset: 0,
        overrun: false,
    };
    model.visit_params(&mut scatter);

    if scatter.overrun || scatter.offset != src.len() {
        return Err(NetError::ShapeMismatch {
            what: "flat gradients",
            got: src.len(),
            expected: param_count(model),
        });
    }

    Ok(())
}

/// Copies every parameter and buffer value into `out` (params first, then
/// buffers), resizing it to fit.
pub fn flatten_state(model: &mut dyn Visitable, out: &mut Vec<f32>) {
    struct Flatten<'a>(&'a mut Vec<f32>);

    impl ParamVisitor for Flatten<'_> {
        fn param(&mut self, _: &str, _: &[usize], value: &mut [f32], _: &mut [f32]) {
            self.0.extend_from_slice(value);
        }
    }

    impl BufferVisitor for Flatten<'_> {
        fn buffer(&mut self, _: &str, _: &[usize], value: &mut [f32]) {
            self.0.extend_from_slice(value);
        }
    }

    out.clear();
    let mut flatten = Flatten(out);
    model.visit_params(&mut flatten);
    model.visit_buffers(&mut flatten);
}

/// Copies `src` back into parameters and buffers.
///
/// # Errors
/// `ShapeMismatch` when `src` does not hold exactly one value per scalar.
pub fn unflatten_state(model: &mut dyn Visitable, src: &[f32]) -> Result<(), NetError> {
    struct Scatter<'a> {
        src: &'a [f32],
        offset: usize,
        overrun: bool,
    }

    impl Scatter<'_> {
        fn write(&mut self, dst: &mut [f32]) {
            let end = self.offset + dst.len();
            if end > self.src.len() {
                self.overrun = true;
                return;
            }

            dst.copy_from_slice(&self.src[self.offset..end]);
            self.offset = end;
        }
    }

    impl ParamVisitor for Scatter<'_> {
        fn param(&mut self, _: &str, _: &[usize], value: &mut [f32], _: &mut [f32]) {
            self.write(value);
        }
    }

    impl BufferVisitor for Scatter<'_> {
        fn buffer(&mut self, _: &str, _: &[usize], value: &mut [f32]) {
            self.write(value);
        }
    }

    let mut scatter = Scatter {
        src,
        offset: 0,
        overrun: false,
    };
    model.visit_params(&mut scatter);
    model.visit_buffers(&mut scatter);

    if scatter.overrun || scatter.offset != src.len() {
        return Err(NetError::ShapeMismatch {
            what: "flat state",
            got: src.len(),
            expected: state_len(model),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResNet;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn state_round_trips_through_the_flat_buffer() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut a = ResNet::new([1, 1, 1, 1], 10, &mut rng);
        let mut b = ResNet::new([1, 1, 1, 1], 10, &mut rng);

        let mut state = Vec::new();
        flatten_state(&mut a, &mut state);
        unflatten_state(&mut b, &state).unwrap();

        let mut b_state = Vec::new();
        flatten_state(&mut b, &mut b_state);
        assert_eq!(state, b_state);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut net = ResNet::new([1, 1, 1, 1], 10, &mut rng);

        assert!(unflatten_grads(&mut net, &[0.0; 3]).is_err());
    }
}
