//! Settings loader for provenant
//!
//! Finds the project root, reads `<root>/config.json` if present, applies
//! environment variables and finally the values set on the builder.

use crate::config::{BackendKind, FileSettings, Settings};
use provenant_core::{
    Error, Result, ResultExt, CONFIG_FILENAME, DEFAULT_LOCK_TIMEOUT_SECS,
    DEFAULT_POLL_INTERVAL_MS, PROVENANT_BACKEND_VAR, PROVENANT_BARRIER_TIMEOUT_VAR,
    PROVENANT_LOCK_TIMEOUT_VAR, PROVENANT_NCORES_VAR, PROVENANT_POLL_INTERVAL_VAR,
    PROVENANT_TEST_MODE_VAR, RANK_VARS, ROOT_DIR_NAME,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Walk up from `start` looking for a `.provenant` directory
///
/// Returns the project directory, i.e. the parent of the root directory.
pub fn find_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(ROOT_DIR_NAME).is_dir())
        .map(Path::to_path_buf)
}

/// Create `<project_dir>/.provenant`, returning its path
pub fn initialize_root(project_dir: &Path) -> Result<PathBuf> {
    let root = project_dir.join(ROOT_DIR_NAME);
    if root.is_dir() {
        tracing::debug!(root = %root.display(), "root directory already initialized");
        return Ok(root);
    }
    fs::create_dir_all(&root).map_err(|e| Error::file_system(&root, "create root directory", e))?;
    tracing::info!(root = %root.display(), "initialized root directory");
    Ok(root)
}

/// Builder producing [`Settings`]
#[derive(Debug, Default)]
pub struct SettingsLoader {
    directory: Option<PathBuf>,
    initialize: bool,
    backend: Option<BackendKind>,
    poll_interval: Option<Duration>,
    barrier_timeout: Option<Option<Duration>>,
    lock_timeout: Option<Duration>,
    test_mode: Option<bool>,
    rank: Option<u32>,
    ncores: Option<usize>,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory to start the root search from (defaults to the current directory)
    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    /// Create the root in the start directory when none is found
    pub fn initialize(mut self, initialize: bool) -> Self {
        self.initialize = initialize;
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn barrier_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.barrier_timeout = Some(timeout);
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = Some(test_mode);
        self
    }

    pub fn rank(mut self, rank: u32) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn ncores(mut self, ncores: usize) -> Self {
        self.ncores = Some(ncores);
        self
    }

    /// Load the settings
    pub fn load(self) -> Result<Settings> {
        let start = match self.directory.clone() {
            Some(dir) => dir,
            None => std::env::current_dir()
                .map_err(|e| Error::file_system(".", "read current directory", e))?,
        };

        let project_dir = match find_root(&start) {
            Some(dir) => dir,
            None if self.initialize => {
                initialize_root(&start)?;
                start
            }
            None => {
                return Err(Error::configuration(format!(
                    "no {ROOT_DIR_NAME} directory found in '{}' or any parent, run `provenant init` first",
                    start.display()
                )))
            }
        };
        let root = project_dir.join(ROOT_DIR_NAME);

        let file = read_file_settings(&root.join(CONFIG_FILENAME))?;
        let env = EnvSettings::from_env()?;

        let settings = Settings {
            backend: self
                .backend
                .or(env.backend)
                .or(file.backend)
                .unwrap_or_default(),
            poll_interval: self
                .poll_interval
                .or(env.poll_interval)
                .or(file.poll_interval_ms.map(Duration::from_millis))
                .unwrap_or(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
            barrier_timeout: match self.barrier_timeout {
                Some(explicit) => explicit,
                None => env
                    .barrier_timeout
                    .or(seconds(file.barrier_timeout_secs, "barrier_timeout_secs")?),
            },
            lock_timeout: self
                .lock_timeout
                .or(env.lock_timeout)
                .or(seconds(file.lock_timeout_secs, "lock_timeout_secs")?)
                .unwrap_or(Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS)),
            test_mode: self
                .test_mode
                .or(env.test_mode)
                .or(file.test_mode)
                .unwrap_or(false),
            rank: self.rank.or(env.rank).unwrap_or(0),
            ncores: self
                .ncores
                .or(env.ncores)
                .or(file.ncores)
                .unwrap_or_else(default_ncores),
            project_dir,
            root,
        };

        tracing::debug!(
            root = %settings.root.display(),
            backend = %settings.backend,
            rank = settings.rank,
            "loaded settings"
        );
        Ok(settings)
    }
}

fn read_file_settings(path: &Path) -> Result<FileSettings> {
    if !path.exists() {
        return Ok(FileSettings::default());
    }
    let content = provenant_utils::read_string(path)?;
    serde_json::from_str(&content).with_context(|| format!("invalid settings file '{}'", path.display()))
}

fn seconds(value: Option<f64>, key: &str) -> Result<Option<Duration>> {
    value
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .map_err(|_| Error::configuration(format!("'{key}' must be a non-negative number of seconds, got {secs}")))
        })
        .transpose()
}

fn default_ncores() -> usize {
    std::thread::available_parallelism().map_or(1, usize::from)
}

/// Settings picked up from the process environment
#[derive(Debug, Default)]
struct EnvSettings {
    backend: Option<BackendKind>,
    poll_interval: Option<Duration>,
    barrier_timeout: Option<Duration>,
    lock_timeout: Option<Duration>,
    test_mode: Option<bool>,
    rank: Option<u32>,
    ncores: Option<usize>,
}

impl EnvSettings {
    fn from_env() -> Result<Self> {
        let rank = RANK_VARS
            .iter()
            .find_map(|var| env_var(var).map(|value| (*var, value)))
            .map(|(var, value)| parse_var::<u32>(var, &value))
            .transpose()?;

        Ok(Self {
            backend: env_var(PROVENANT_BACKEND_VAR)
                .map(|v| BackendKind::from_str(&v))
                .transpose()?,
            poll_interval: env_var(PROVENANT_POLL_INTERVAL_VAR)
                .map(|v| parse_var::<u64>(PROVENANT_POLL_INTERVAL_VAR, &v))
                .transpose()?
                .map(Duration::from_millis),
            barrier_timeout: env_var(PROVENANT_BARRIER_TIMEOUT_VAR)
                .map(|v| parse_var::<f64>(PROVENANT_BARRIER_TIMEOUT_VAR, &v))
                .transpose()?
                .map(|s| seconds(Some(s), PROVENANT_BARRIER_TIMEOUT_VAR))
                .transpose()?
                .flatten(),
            lock_timeout: env_var(PROVENANT_LOCK_TIMEOUT_VAR)
                .map(|v| parse_var::<f64>(PROVENANT_LOCK_TIMEOUT_VAR, &v))
                .transpose()?
                .map(|s| seconds(Some(s), PROVENANT_LOCK_TIMEOUT_VAR))
                .transpose()?
                .flatten(),
            test_mode: env_var(PROVENANT_TEST_MODE_VAR).map(|v| parse_flag(&v)),
            rank,
            ncores: env_var(PROVENANT_NCORES_VAR)
                .map(|v| parse_var::<usize>(PROVENANT_NCORES_VAR, &v))
                .transpose()?,
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::configuration(format!("invalid value '{value}' for {name}")))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
