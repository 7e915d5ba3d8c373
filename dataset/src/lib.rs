//! CIFAR-10 input pipeline: on-disk parsing, per-sample augmentation,
//! deterministic distributed sharding and batched iteration.

mod cifar;
mod error;
mod loader;
mod sampler;
mod transforms;

pub use cifar::Cifar10;
pub use error::DataError;
pub use loader::Loader;
pub use sampler::DistributedSampler;
pub use transforms::{Augment, CIFAR_MEAN, CIFAR_STD};

pub type Result<T> = std::result::Result<T, DataError>;

/// Image side length of every CIFAR-10 sample.
pub const IMAGE_SIDE: usize = 32;

/// Channels per CIFAR-10 sample.
pub const CHANNELS: usize = 3;
