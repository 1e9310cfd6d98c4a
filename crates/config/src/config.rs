//! Resolved settings shared by the cache and the instruction runtime
//!
//! A [`Settings`] value is immutable once the loader has produced it and is
//! passed by reference to everything that needs to know where the cache root
//! lives or how long to wait on the filesystem.

use provenant_core::{
    Error, Result, EXTERNAL_FILES_DIR, PARAMS_FILENAME, RECORDS_DIR, WORK_DIR, WORK_DIRS_FILENAME,
    WORK_DIRS_LOCK_FILENAME,
};
use provenant_utils::PollConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Which cache backend the runtime opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One JSON file per record plus a uid index
    #[default]
    Fs,
    /// Read-only view over flat `results-*.json` files
    Legacy,
    /// Process local, nothing is persisted
    Memory,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fs" | "filesystem" => Ok(BackendKind::Fs),
            "legacy" => Ok(BackendKind::Legacy),
            "memory" | "mem" => Ok(BackendKind::Memory),
            other => Err(Error::configuration(format!(
                "unknown cache backend '{other}', expected one of: fs, legacy, memory"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Fs => "fs",
            BackendKind::Legacy => "legacy",
            BackendKind::Memory => "memory",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Directory containing the root directory, `requires`/`creates` are relative to it
    pub project_dir: PathBuf,
    /// The `.provenant` directory
    pub root: PathBuf,
    pub backend: BackendKind,
    pub poll_interval: Duration,
    /// `None` lets the file barrier wait forever
    pub barrier_timeout: Option<Duration>,
    pub lock_timeout: Duration,
    /// Turn logged-and-skipped per-record failures into errors
    pub test_mode: bool,
    pub rank: u32,
    pub ncores: usize,
}

impl Settings {
    /// Only rank 0 writes to the filesystem
    pub fn is_writer(&self) -> bool {
        self.rank == 0
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig::new(self.poll_interval, self.barrier_timeout)
    }

    pub fn records_dir(&self) -> PathBuf {
        self.root.join(RECORDS_DIR)
    }

    pub fn external_files_dir(&self) -> PathBuf {
        self.root.join(EXTERNAL_FILES_DIR)
    }

    pub fn work_dirs_file(&self) -> PathBuf {
        self.root.join(WORK_DIRS_FILENAME)
    }

    pub fn work_dirs_lock(&self) -> PathBuf {
        self.root.join(WORK_DIRS_LOCK_FILENAME)
    }

    pub fn work_root(&self) -> PathBuf {
        self.root.join(WORK_DIR)
    }

    pub fn params_file(&self) -> PathBuf {
        self.root.join(PARAMS_FILENAME)
    }

    /// Resolve a path declared relative to the project directory
    pub fn project_path(&self, relative: &Path) -> PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.project_dir.join(relative)
        }
    }
}

/// Shape of `<root>/config.json`, every key optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileSettings {
    #[serde(default)]
    pub backend: Option<BackendKind>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub barrier_timeout_secs: Option<f64>,
    #[serde(default)]
    pub lock_timeout_secs: Option<f64>,
    #[serde(default)]
    pub test_mode: Option<bool>,
    #[serde(default)]
    pub ncores: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("fs".parse::<BackendKind>().unwrap(), BackendKind::Fs);
        assert_eq!("Memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!(" legacy ".parse::<BackendKind>().unwrap(), BackendKind::Legacy);
        assert!(matches!(
            "sqlite".parse::<BackendKind>(),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_backend_display_round_trips() {
        for kind in [BackendKind::Fs, BackendKind::Legacy, BackendKind::Memory] {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_file_settings_rejects_unknown_keys() {
        let parsed: std::result::Result<FileSettings, _> =
            serde_json::from_str(r#"{"backend": "memory", "colour": "blue"}"#);
        assert!(parsed.is_err());

        let parsed: FileSettings =
            serde_json::from_str(r#"{"backend": "memory", "lock_timeout_secs": 2.5}"#).unwrap();
        assert_eq!(parsed.backend, Some(BackendKind::Memory));
        assert_eq!(parsed.lock_timeout_secs, Some(2.5));
    }
}
