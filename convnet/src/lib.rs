mod checkpoint;
mod error;
mod flat;
pub mod layers;
mod loss;
mod metrics;
mod optim;
mod resnet;
mod schedule;

pub use checkpoint::save_checkpoint;
pub use error::NetError;
pub use flat::{flatten_grads, flatten_state, param_count, state_len, unflatten_grads, unflatten_state};
pub use layers::{BufferVisitor, ParamVisitor, Visitable};
pub use loss::CrossEntropyLoss;
pub use metrics::MulticlassAccuracy;
pub use optim::Sgd;
pub use resnet::ResNet;
pub use schedule::MultiStepLr;
