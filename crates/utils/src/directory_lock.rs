//! Advisory lock file guarding read-modify-write of shared JSON tables

use fs2::FileExt;
use provenant_core::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Exclusive lock held on a file for as long as the value lives
#[derive(Debug)]
pub struct DirectoryLock {
    lock_file: File,
    lock_path: PathBuf,
    pid: u32,
}

impl DirectoryLock {
    /// Try once to acquire the lock
    pub fn try_acquire(lock_path: &Path) -> io::Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        lock_file.try_lock_exclusive()?;

        let pid = std::process::id();
        lock_file.set_len(0)?;
        writeln!(lock_file, "{pid}")?;
        lock_file.sync_all()?;

        Ok(Self {
            lock_file,
            lock_path: lock_path.to_path_buf(),
            pid,
        })
    }

    /// Acquire the lock, polling every `interval` until `timeout` has passed
    pub fn acquire(lock_path: &Path, timeout: Duration, interval: Duration) -> Result<Self> {
        let started = Instant::now();
        loop {
            match Self::try_acquire(lock_path) {
                Ok(lock) => return Ok(lock),
                Err(e) if is_contended(&e) => {
                    if started.elapsed() >= timeout {
                        return Err(Error::lock_timeout(lock_path, timeout));
                    }
                    tracing::trace!(lock = %lock_path.display(), "waiting for lock");
                    thread::sleep(interval);
                }
                Err(e) => return Err(Error::file_system(lock_path, "acquire lock", e)),
            }
        }
    }

    /// PID that owns this lock
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        // The file stays: removing it would let a waiter lock a fresh inode
        // while another process still holds the old one.
        let _ = FileExt::unlock(&self.lock_file);
    }
}

fn is_contended(error: &io::Error) -> bool {
    let contended = fs2::lock_contended_error();
    error.kind() == io::ErrorKind::WouldBlock
        || (error.raw_os_error().is_some() && error.raw_os_error() == contended.raw_os_error())
}
