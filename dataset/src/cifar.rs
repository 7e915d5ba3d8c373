use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use ndarray::{Array4, ArrayView3, s};

use crate::{CHANNELS, DataError, IMAGE_SIDE, Result};

/// On-disk size of one sample: a label byte followed by three
/// row-major 32x32 channel planes.
pub const RECORD_BYTES: usize = 1 + CHANNELS * IMAGE_SIDE * IMAGE_SIDE;

const TRAIN_FILES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const TEST_FILE: &str = "test_batch.bin";

/// An in-memory CIFAR-10 split, kept as raw pixels.
///
/// Pixels stay `u8` until batch assembly so a full split costs
/// one byte per value; augmentation converts to `f32` per sample.
#[derive(Debug, Clone)]
pub struct Cifar10 {
    images: Array4<u8>,
    labels: Vec<u8>,
}

impl Cifar10 {
    /// Loads the five training batches from `<dir>/CIFAR10/cifar-10-batches-bin`.
    ///
    /// # Errors
    /// `DataError::MissingFile` if any batch file is absent,
    /// `DataError::Malformed` if a file is not a whole number of records.
    pub fn train(dir: &Path) -> Result<Self> {
        let root = batches_root(dir);
        let paths: Vec<PathBuf> = TRAIN_FILES.iter().map(|f| root.join(f)).collect();
        Self::from_files(&paths)
    }

    /// Loads the held-out batch from `<dir>/CIFAR10/cifar-10-batches-bin`.
    ///
    /// # Errors
    /// Same conditions as [`Cifar10::train`].
    pub fn test(dir: &Path) -> Result<Self> {
        Self::from_files(&[batches_root(dir).join(TEST_FILE)])
    }

    fn from_files(paths: &[PathBuf]) -> Result<Self> {
        let mut pixels = Vec::new();
        let mut labels = Vec::new();

        for path in paths {
            if !path.is_file() {
                return Err(DataError::MissingFile(path.clone()));
            }
            let bytes = fs::read(path)?;
            if bytes.is_empty() || bytes.len() % RECORD_BYTES != 0 {
                return Err(DataError::Malformed {
                    file: path.clone(),
                    detail: format!(
                        "{} bytes is not a whole number of {RECORD_BYTES}-byte records",
                        bytes.len()
                    ),
                });
            }

            let records = bytes.len() / RECORD_BYTES;
            pixels.reserve(records * (RECORD_BYTES - 1));
            labels.reserve(records);
            for record in bytes.chunks_exact(RECORD_BYTES) {
                labels.push(record[0]);
                pixels.extend_from_slice(&record[1..]);
            }
            debug!(records = records; "loaded {}", path.display());
        }

        let n = labels.len();
        let images = Array4::from_shape_vec((n, CHANNELS, IMAGE_SIDE, IMAGE_SIDE), pixels)
            .map_err(|err| DataError::Malformed {
                file: paths[0].clone(),
                detail: err.to_string(),
            })?;
        Ok(Self { images, labels })
    }

    /// Builds a split directly from in-memory tensors.
    ///
    /// # Errors
    /// `DataError::Malformed` if the image count and label count disagree.
    pub fn from_raw(images: Array4<u8>, labels: Vec<u8>) -> Result<Self> {
        if images.shape()[0] != labels.len() {
            return Err(DataError::Malformed {
                file: PathBuf::from("<memory>"),
                detail: format!(
                    "{} images but {} labels",
                    images.shape()[0],
                    labels.len()
                ),
            });
        }
        Ok(Self { images, labels })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Raw pixel planes of the sample at `idx` (panics if out of bounds).
    #[inline]
    pub fn image(&self, idx: usize) -> ArrayView3<'_, u8> {
        self.images.slice(s![idx, .., .., ..])
    }

    /// Label of the sample at `idx` (panics if out of bounds).
    #[inline]
    pub fn label(&self, idx: usize) -> u8 {
        self.labels[idx]
    }
}

fn batches_root(dir: &Path) -> PathBuf {
    dir.join("CIFAR10").join("cifar-10-batches-bin")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_batch(path: &Path, records: usize) {
        let mut file = fs::File::create(path).unwrap();
        for i in 0..records {
            let mut record = vec![0u8; RECORD_BYTES];
            record[0] = (i % 10) as u8;
            // distinct first pixel per channel so parsing order is visible
            record[1] = 10 + i as u8;
            record[1 + 1024] = 20 + i as u8;
            record[1 + 2048] = 30 + i as u8;
            file.write_all(&record).unwrap();
        }
    }

    #[test]
    fn parses_channel_major_records() {
        let dir = std::env::temp_dir().join("cifar_parse_test");
        let root = batches_root(&dir);
        fs::create_dir_all(&root).unwrap();
        write_batch(&root.join(TEST_FILE), 3);

        let data = Cifar10::test(&dir).unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data.label(2), 2);
        let img = data.image(1);
        assert_eq!(img[[0, 0, 0]], 11);
        assert_eq!(img[[1, 0, 0]], 21);
        assert_eq!(img[[2, 0, 0]], 31);
    }

    #[test]
    fn missing_file_names_expected_path() {
        let dir = std::env::temp_dir().join("cifar_missing_test");
        let err = Cifar10::test(&dir).unwrap_err();
        match err {
            DataError::MissingFile(path) => {
                assert!(path.ends_with("CIFAR10/cifar-10-batches-bin/test_batch.bin"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = std::env::temp_dir().join("cifar_truncated_test");
        let root = batches_root(&dir);
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(TEST_FILE), vec![0u8; RECORD_BYTES + 1]).unwrap();

        assert!(matches!(
            Cifar10::test(&dir),
            Err(DataError::Malformed { .. })
        ));
    }

    #[test]
    fn from_raw_checks_label_count() {
        let images = Array4::<u8>::zeros((2, CHANNELS, IMAGE_SIDE, IMAGE_SIDE));
        assert!(Cifar10::from_raw(images.clone(), vec![0]).is_err());
        assert!(Cifar10::from_raw(images, vec![0, 1]).is_ok());
    }
}
