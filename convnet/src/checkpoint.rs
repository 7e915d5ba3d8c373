use std::path::Path;

use safetensors::tensor::{Dtype, TensorView};

use crate::NetError;
use crate::layers::{BufferVisitor, ParamVisitor, Visitable};

/// Writes every parameter and buffer to a safetensors file, keyed by the
/// same dotted names a torch state dict would use.
///
/// # Errors
/// `NetError::Checkpoint` on I/O or encoding failure.
pub fn save_checkpoint(model: &mut dyn Visitable, path: &Path) -> Result<(), NetError> {
    struct Collect(Vec<(String, Vec<usize>, Vec<f32>)>);

    impl ParamVisitor for Collect {
        fn param(&mut self, name: &str, shape: &[usize], value: &mut [f32], _: &mut [f32]) {
            self.0.push((name.to_string(), shape.to_vec(), value.to_vec()));
        }
    }

    impl BufferVisitor for Collect {
        fn buffer(&mut self, name: &str, shape: &[usize], value: &mut [f32]) {
            self.0.push((name.to_string(), shape.to_vec(), value.to_vec()));
        }
    }

    let mut collect = Collect(Vec::new());
    model.visit_params(&mut collect);
    model.visit_buffers(&mut collect);

    let views: Vec<(&str, TensorView<'_>)> = collect
        .0
        .iter()
        .map(|(name, shape, data)| {
            let view =
                TensorView::new(Dtype::F32, shape.clone(), bytemuck::cast_slice(data))
                    .map_err(|e| NetError::Checkpoint(format!("{e:?}")))?;
            Ok((name.as_str(), view))
        })
        .collect::<Result<_, NetError>>()?;

    safetensors::serialize_to_file(views, &None, path)
        .map_err(|e| NetError::Checkpoint(format!("{e:?}")))
}
