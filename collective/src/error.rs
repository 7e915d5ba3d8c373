use std::{error::Error, fmt, io};

/// Process-group runtime failures.
#[derive(Debug)]
pub enum CollectiveErr {
    Io(io::Error),
    Rendezvous {
        detail: String,
    },
    UnexpectedMessage {
        during: &'static str,
        got: &'static str,
    },
    LengthMismatch {
        during: &'static str,
        got: usize,
        expected: usize,
    },
}

impl fmt::Display for CollectiveErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectiveErr::Io(e) => write!(f, "io error: {e}"),
            CollectiveErr::Rendezvous { detail } => {
                write!(f, "rendezvous failed: {detail}")
            }
            CollectiveErr::UnexpectedMessage { during, got } => {
                write!(f, "unexpected message during {during}: got {got}")
            }
            CollectiveErr::LengthMismatch {
                during,
                got,
                expected,
            } => write!(
                f,
                "payload length mismatch during {during}: got {got}, expected {expected}"
            ),
        }
    }
}

impl Error for CollectiveErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CollectiveErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CollectiveErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<CollectiveErr> for io::Error {
    fn from(value: CollectiveErr) -> Self {
        match value {
            CollectiveErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
