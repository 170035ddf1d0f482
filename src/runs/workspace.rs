use chrono::Local;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Timestamp used for run ids and generated file names (`YYYYMMDDHHMMSS`)
pub fn timestamp() -> String {
    Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// Per-run identity and the folder that holds its log, screenshots and other artifacts.
///
/// Two runs started within the same second share an id and therefore a folder;
/// the log file is append-only so their lines interleave instead of clobbering.
#[derive(Debug, Clone)]
pub struct RunWorkspace {
    run_id: String,
    directory: PathBuf,
}

impl RunWorkspace {
    /// Create the workspace under `root`, creating the folder eagerly
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_id(root, timestamp())
    }

    pub fn create_with_id(root: impl AsRef<Path>, run_id: impl Into<String>) -> Result<Self> {
        let run_id = run_id.into();
        let directory = root.as_ref().join(&run_id);
        std::fs::create_dir_all(&directory)?;
        tracing::debug!("Run workspace ready at {:?}", directory);
        Ok(Self { run_id, directory })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path for an artifact inside the run folder
    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.directory.join(file_name)
    }

    pub fn log_path(&self) -> PathBuf {
        self.artifact_path("actions.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_shape() {
        let ts = timestamp();
        assert_eq!(ts.len(), 14);
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_create_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let first = RunWorkspace::create_with_id(root.path(), "20240101120000").unwrap();
        let second = RunWorkspace::create_with_id(root.path(), "20240101120000").unwrap();

        assert!(first.directory().is_dir());
        assert_eq!(first.directory(), second.directory());
        assert_eq!(first.log_path(), root.path().join("20240101120000").join("actions.log"));
    }
}
