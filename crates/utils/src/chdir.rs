//! Scoped change of the process working directory

use provenant_core::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Changes into a directory and restores the previous one when dropped
///
/// The working directory is process global. Callers running instructions
/// concurrently in one process have to serialize around this guard.
#[derive(Debug)]
pub struct ChdirGuard {
    previous: PathBuf,
}

impl ChdirGuard {
    pub fn enter(dir: &Path, create: bool) -> Result<Self> {
        if create {
            fs::create_dir_all(dir).map_err(|e| Error::file_system(dir, "create directory", e))?;
        }
        let previous = std::env::current_dir()
            .map_err(|e| Error::file_system(".", "read current directory", e))?;
        std::env::set_current_dir(dir)
            .map_err(|e| Error::file_system(dir, "change directory", e))?;
        tracing::trace!(dir = %dir.display(), "entered directory");
        Ok(Self { previous })
    }

    /// Directory that will be restored
    pub fn previous(&self) -> &Path {
        &self.previous
    }
}

impl Drop for ChdirGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.previous) {
            tracing::error!(
                dir = %self.previous.display(),
                error = %e,
                "failed to restore working directory"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_restores_directory() {
        let temp_dir = TempDir::new().unwrap();
        let before = std::env::current_dir().unwrap();
        let target = temp_dir.path().join("work").join("demo-0123456789");

        {
            let guard = ChdirGuard::enter(&target, true).unwrap();
            assert_eq!(guard.previous(), before.as_path());
            assert_eq!(
                std::env::current_dir().unwrap().canonicalize().unwrap(),
                target.canonicalize().unwrap()
            );
        }

        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    #[serial]
    fn test_missing_directory_without_create() {
        let temp_dir = TempDir::new().unwrap();
        let result = ChdirGuard::enter(&temp_dir.path().join("absent"), false);
        assert!(result.is_err());
    }
}
