use std::{fmt, io};

use collective::CollectiveErr;
use convnet::NetError;
use dataset::DataError;

/// All errors that can surface in the training driver.
#[derive(Debug)]
pub enum TrainError {
    /// Invalid run configuration, caught before any socket is opened.
    InvalidConfig(String),
    /// A collective operation or the rendezvous failed.
    Collective(CollectiveErr),
    /// The network substrate rejected an input or a checkpoint failed.
    Net(NetError),
    /// The dataset could not be located or decoded.
    Data(DataError),
    /// Chart rendering failed.
    Plot(String),
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Collective(err) => write!(f, "collective failure: {err}"),
            Self::Net(err) => write!(f, "network failure: {err}"),
            Self::Data(err) => write!(f, "dataset failure: {err}"),
            Self::Plot(msg) => write!(f, "plot failure: {msg}"),
            Self::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for TrainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Collective(err) => Some(err),
            Self::Net(err) => Some(err),
            Self::Data(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CollectiveErr> for TrainError {
    fn from(value: CollectiveErr) -> Self {
        Self::Collective(value)
    }
}

impl From<NetError> for TrainError {
    fn from(value: NetError) -> Self {
        Self::Net(value)
    }
}

impl From<DataError> for TrainError {
    fn from(value: DataError) -> Self {
        Self::Data(value)
    }
}

impl From<io::Error> for TrainError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
