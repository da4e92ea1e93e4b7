//! Saved camera and settings snapshots.
//!
//! A test-case file is a flat sequence of fixed-size records, each one a
//! [`SettingsBlock`] followed by a [`CameraStateBlock`]. Records are
//! addressed by index; deleting one shifts the rest down.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::error::GraphicsError;
use crate::params::{CameraState, CameraStateBlock, RenderParams, RenderSettings, SettingsBlock};

const SETTINGS_SIZE: usize = std::mem::size_of::<SettingsBlock>();
const CAMERA_SIZE: usize = std::mem::size_of::<CameraStateBlock>();

/// Size of one record on disk.
pub const RECORD_SIZE: usize = SETTINGS_SIZE + CAMERA_SIZE;

/// Test-case file error type
#[derive(Error, Debug)]
pub enum TestCaseError {
    #[error("Test case I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Test case {index} out of range ({count} stored)")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("Test case file size {size} is not a whole number of records")]
    Truncated { size: u64 },
    #[error("Test case {index} is corrupt: {source}")]
    Corrupt {
        index: usize,
        #[source]
        source: GraphicsError,
    },
}

pub type TestCaseResult<T> = Result<T, TestCaseError>;

/// A loaded snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub settings: RenderSettings,
    pub camera: CameraState,
}

impl TestCase {
    /// Frame parameters replaying this snapshot. History is always reset.
    pub fn params(&self) -> RenderParams {
        RenderParams::new(self.settings, self.camera).with_history_reset(true)
    }
}

/// Handle to a test-case file on disk. The file need not exist yet.
#[derive(Debug, Clone)]
pub struct TestCaseFile {
    path: PathBuf,
}

impl TestCaseFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored records; 0 if the file does not exist.
    pub fn count(&self) -> TestCaseResult<usize> {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        if size % RECORD_SIZE as u64 != 0 {
            return Err(TestCaseError::Truncated { size });
        }
        Ok((size / RECORD_SIZE as u64) as usize)
    }

    /// Load record `index`.
    ///
    /// The debug value and denoiser come back as defaults so a replayed
    /// case always starts from the standard denoising path.
    pub fn load(&self, index: usize) -> TestCaseResult<TestCase> {
        let data = self.read_all()?;
        let count = data.len() / RECORD_SIZE;
        if index >= count {
            return Err(TestCaseError::IndexOutOfRange { index, count });
        }

        let record = &data[index * RECORD_SIZE..(index + 1) * RECORD_SIZE];
        let settings_block: SettingsBlock = bytemuck::pod_read_unaligned(&record[..SETTINGS_SIZE]);
        let camera_block: CameraStateBlock = bytemuck::pod_read_unaligned(&record[SETTINGS_SIZE..]);

        let defaults = RenderSettings::default();
        let mut settings = RenderSettings::try_from(&settings_block)
            .map_err(|source| TestCaseError::Corrupt { index, source })?;
        settings.debug = defaults.debug;
        settings.denoiser = defaults.denoiser;

        log::info!("Loaded test case {} from {}", index, self.path.display());
        Ok(TestCase {
            settings,
            camera: CameraState::from(&camera_block),
        })
    }

    /// Append a record. Returns its index.
    pub fn append(&self, settings: &RenderSettings, camera: &CameraState) -> TestCaseResult<usize> {
        let index = self.count()?;
        let settings_block = SettingsBlock::from(settings);
        let camera_block = CameraStateBlock::from(camera);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(bytemuck::bytes_of(&settings_block))?;
        file.write_all(bytemuck::bytes_of(&camera_block))?;

        log::info!("Saved test case {} to {}", index, self.path.display());
        Ok(index)
    }

    /// Remove record `index`, shifting later records down.
    pub fn delete(&self, index: usize) -> TestCaseResult<()> {
        let mut data = self.read_all()?;
        let count = data.len() / RECORD_SIZE;
        if index >= count {
            return Err(TestCaseError::IndexOutOfRange { index, count });
        }
        data.drain(index * RECORD_SIZE..(index + 1) * RECORD_SIZE);
        fs::write(&self.path, &data)?;
        log::info!("Deleted test case {} from {}", index, self.path.display());
        Ok(())
    }

    fn read_all(&self) -> TestCaseResult<Vec<u8>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        if data.len() % RECORD_SIZE != 0 {
            return Err(TestCaseError::Truncated {
                size: data.len() as u64,
            });
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DenoiserKind;
    use rtframe_core::math::{DVec3, Vec3};

    struct TempFile(PathBuf);

    impl TempFile {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir().join(format!("rtframe-{}-{name}.bin", std::process::id()));
            let _ = fs::remove_file(&path);
            Self(path)
        }
    }

    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.0);
        }
    }

    fn camera(x: f64) -> CameraState {
        CameraState::perspective(DVec3::new(x, 0.0, 2.0), Vec3::y(), 75.0, 1.5, 1.0)
    }

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = TempFile::new("missing");
        let file = TestCaseFile::new(&tmp.0);
        assert_eq!(file.count().unwrap(), 0);
        assert!(matches!(
            file.load(0),
            Err(TestCaseError::IndexOutOfRange { index: 0, count: 0 })
        ));
    }

    #[test]
    fn test_append_load_delete() {
        let tmp = TempFile::new("cycle");
        let file = TestCaseFile::new(&tmp.0);

        let mut settings = RenderSettings::default();
        settings.exposure = 3.0;
        assert_eq!(file.append(&settings, &camera(1.0)).unwrap(), 0);
        settings.exposure = 7.0;
        assert_eq!(file.append(&settings, &camera(2.0)).unwrap(), 1);
        assert_eq!(file.count().unwrap(), 2);

        let second = file.load(1).unwrap();
        assert_eq!(second.settings.exposure, 7.0);
        assert_eq!(second.camera.global_position, DVec3::new(2.0, 0.0, 2.0));

        file.delete(0).unwrap();
        assert_eq!(file.count().unwrap(), 1);
        assert_eq!(file.load(0).unwrap().settings.exposure, 7.0);
        assert!(file.delete(1).is_err());
    }

    #[test]
    fn test_load_resets_debug_and_denoiser() {
        let tmp = TempFile::new("reset");
        let file = TestCaseFile::new(&tmp.0);

        let mut settings = RenderSettings::default();
        settings.debug = 1.0;
        settings.denoiser = DenoiserKind::Relax;
        file.append(&settings, &camera(0.0)).unwrap();

        let case = file.load(0).unwrap();
        let defaults = RenderSettings::default();
        assert_eq!(case.settings.debug, defaults.debug);
        assert_eq!(case.settings.denoiser, defaults.denoiser);
        assert!(case.params().force_history_reset);
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let tmp = TempFile::new("truncated");
        fs::write(&tmp.0, [0u8; 7]).unwrap();
        let file = TestCaseFile::new(&tmp.0);
        assert!(matches!(file.count(), Err(TestCaseError::Truncated { size: 7 })));
    }
}
