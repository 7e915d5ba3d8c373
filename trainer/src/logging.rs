use std::{
    fs::{self, File},
    io::{self, Write},
    path::Path,
};

use chrono::Local;
use env_logger::{Env, Target};

use crate::TrainError;

/// A writer that duplicates every record to stderr and a log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Keeps the logger alive for the duration of the run and flushes
/// buffered records on every exit path.
pub struct LogGuard {
    _private: (),
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        log::logger().flush();
    }
}

/// Initializes logging to stderr plus a timestamped file under
/// `<dir>/logs/`, creating the directory if absent.
///
/// # Errors
/// `TrainError::Io` if the log directory or file cannot be created,
/// `TrainError::InvalidConfig` if a logger is already installed.
pub fn init(dir: &Path) -> Result<LogGuard, TrainError> {
    let logs_dir = dir.join("logs");
    fs::create_dir_all(&logs_dir)?;

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let file = File::create(logs_dir.join(format!("{timestamp}.log")))?;

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Pipe(Box::new(Tee { file })))
        .try_init()
        .map_err(|err| TrainError::InvalidConfig(err.to_string()))?;

    Ok(LogGuard { _private: () })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tee_reaches_the_file() {
        let dir = std::env::temp_dir().join("trainer_tee_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.log");

        let mut tee = Tee { file: File::create(&path).unwrap() };
        tee.write_all(b"a record\n").unwrap();
        tee.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a record\n");
    }

    #[test]
    fn init_creates_the_logs_directory() {
        let dir = std::env::temp_dir().join("trainer_logging_test");
        let _ = fs::remove_dir_all(&dir);

        // A second init in the same process is rejected, never a panic.
        match init(&dir) {
            Ok(_guard) => {}
            Err(TrainError::InvalidConfig(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
        assert!(dir.join("logs").is_dir());
    }
}
