use collective::ProcessGroup;
use convnet::{Visitable, flatten_grads, flatten_state, unflatten_grads, unflatten_state};
use log::debug;

use crate::TrainError;

/// Data-parallel wrapper around a process group.
///
/// Construction broadcasts rank 0's full state so every replica starts
/// from identical parameters and running statistics. After each local
/// backward pass [`DataParallel::sync_gradients`] replaces every rank's
/// gradients with the fp16-compressed global average.
pub struct DataParallel {
    group: ProcessGroup,
    // Persistent flattening buffer, sized on first use.
    flat: Vec<f32>,
}

impl DataParallel {
    /// Wraps `group` and aligns `model`'s state across all ranks.
    ///
    /// # Errors
    /// Propagates collective failures from the initial broadcast.
    pub fn new(mut group: ProcessGroup, model: &mut dyn Visitable) -> Result<Self, TrainError> {
        let mut state = Vec::new();
        flatten_state(model, &mut state);
        group.broadcast(&mut state)?;
        unflatten_state(model, &state)?;
        debug!(values = state.len(); "replicas aligned to coordinator state");
        Ok(Self { group, flat: Vec::new() })
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.group.rank()
    }

    #[inline]
    pub fn world_size(&self) -> usize {
        self.group.world_size()
    }

    #[inline]
    pub fn is_coordinator(&self) -> bool {
        self.group.is_coordinator()
    }

    /// Averages `model`'s gradients across all ranks, fp16 on the wire.
    ///
    /// # Errors
    /// Propagates collective failures; all ranks must call this the same
    /// number of times per epoch.
    pub fn sync_gradients(&mut self, model: &mut dyn Visitable) -> Result<(), TrainError> {
        flatten_grads(model, &mut self.flat);
        self.group.all_reduce_grad(&mut self.flat)?;
        unflatten_grads(model, &self.flat)?;
        Ok(())
    }

    /// Sums a small metric vector across all ranks, in place.
    ///
    /// # Errors
    /// Propagates collective failures.
    pub fn reduce_counts(&mut self, counts: &mut [f32]) -> Result<(), TrainError> {
        self.group.all_reduce_sum(counts)?;
        Ok(())
    }

    /// Releases the group with a clean disconnect handshake.
    ///
    /// # Errors
    /// Propagates handshake failures; sockets are closed regardless.
    pub fn shutdown(self) -> Result<(), TrainError> {
        self.group.shutdown()?;
        Ok(())
    }
}
