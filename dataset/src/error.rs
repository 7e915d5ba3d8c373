use std::{fmt, io, path::PathBuf};

/// Errors produced while locating or decoding the dataset.
#[derive(Debug)]
pub enum DataError {
    /// An expected batch file is absent on disk.
    MissingFile(PathBuf),

    /// A batch file exists but its contents do not decode.
    Malformed {
        /// The offending file.
        file: PathBuf,
        /// What was wrong with it.
        detail: String,
    },

    /// Underlying filesystem failure.
    Io(io::Error),
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::MissingFile(path) => {
                write!(f, "dataset file not found: {}", path.display())
            }
            DataError::Malformed { file, detail } => {
                write!(f, "malformed dataset file {}: {detail}", file.display())
            }
            DataError::Io(err) => write!(f, "dataset io failure: {err}"),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for DataError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
