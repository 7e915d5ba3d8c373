//! Distributed CIFAR-10 training driver: configuration, logging,
//! the data-parallel wrapper, the epoch loop and result publication.

pub mod config;
pub mod ddp;
pub mod error;
pub mod logging;
pub mod plot;
pub mod run;

pub use config::{Cli, RunConfig};
pub use ddp::DataParallel;
pub use error::TrainError;
pub use run::History;
