use std::{fmt, io};

/// Errors produced at the network's API seams.
#[derive(Debug)]
pub enum NetError {
    /// An input is invalid for semantic or domain reasons.
    InvalidInput(&'static str),

    /// A shape invariant was violated (e.g. mismatched lengths).
    ShapeMismatch {
        /// Human-readable context for the mismatch (e.g. "labels", "flat state").
        what: &'static str,
        /// Observed value.
        got: usize,
        /// Expected value.
        expected: usize,
    },

    /// Checkpoint I/O or encoding failure.
    Checkpoint(String),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            NetError::ShapeMismatch { what, got, expected } => {
                write!(f, "shape mismatch for {what}: got {got}, expected {expected}")
            }
            NetError::Checkpoint(detail) => write!(f, "checkpoint failed: {detail}"),
        }
    }
}

impl std::error::Error for NetError {}

impl From<io::Error> for NetError {
    fn from(value: io::Error) -> Self {
        Self::Checkpoint(value.to_string())
    }
}
