//! Filesystem polling primitives for processes that cooperate on one computation
//!
//! Only the writer process deletes files. Every process, writer or not, polls
//! until the filesystem reflects the expected state before moving on.

use provenant_core::{Error, Result, DEFAULT_POLL_INTERVAL_MS};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// How often to look at the filesystem and how long to keep looking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: None,
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    fn wait_for<F>(&self, paths: &[PathBuf], mut done: F) -> Result<()>
    where
        F: FnMut(&Path) -> bool,
    {
        let started = Instant::now();
        loop {
            let pending: Vec<PathBuf> = paths.iter().filter(|p| !done(p)).cloned().collect();
            if pending.is_empty() {
                return Ok(());
            }
            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    return Err(Error::barrier_timeout(pending, timeout));
                }
            }
            tracing::trace!(pending = pending.len(), "polling filesystem");
            thread::sleep(self.interval);
        }
    }
}

/// Block until every path exists
pub fn wait_until_present(paths: &[PathBuf], poll: &PollConfig) -> Result<()> {
    poll.wait_for(paths, Path::exists)
}

/// Block until no path exists
pub fn wait_until_absent(paths: &[PathBuf], poll: &PollConfig) -> Result<()> {
    poll.wait_for(paths, |p| !p.exists())
}

/// Remove a file on the writer, then wait until the removal is visible
pub fn unlink(path: &Path, writer: bool, poll: &PollConfig) -> Result<()> {
    if writer {
        match fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::file_system(path, "remove file", e)),
        }
    }
    wait_until_absent(&[path.to_path_buf()], poll)
}

/// Delete-then-execute-then-wait-for-presence around a body
#[derive(Debug, Clone)]
pub struct FileBarrier {
    created: Vec<PathBuf>,
    delete: bool,
    writer: bool,
    poll: PollConfig,
}

impl FileBarrier {
    pub fn new(created: Vec<PathBuf>, poll: PollConfig) -> Self {
        Self {
            created,
            delete: true,
            writer: true,
            poll,
        }
    }

    /// Whether the created files are removed before the body runs
    pub fn delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    /// Whether this process is the one that writes to disk
    pub fn writer(mut self, writer: bool) -> Self {
        self.writer = writer;
        self
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.created
    }

    /// Run `body` between the two synchronization points
    pub fn run<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if self.delete {
            for path in &self.created {
                unlink(path, self.writer, &self.poll)?;
            }
        }

        let output = body()?;

        wait_until_present(&self.created, &self.poll)?;
        Ok(output)
    }
}
