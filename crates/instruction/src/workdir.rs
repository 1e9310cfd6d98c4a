//! Working directories reserved per name and parameters
//!
//! `<root>/work_dirs.json` maps a digest of name and parameters to a
//! directory under `<root>/work`. The writer chooses or creates the entry
//! under the work directory lock; other processes wait until it shows up.

use indexmap::IndexMap;
use provenant_config::Settings;
use provenant_core::value::encode;
use provenant_core::{Error, Result, ResultExt};
use provenant_record::RunSpecification;
use provenant_utils::{read_string, sha256_hex, write_atomic_string, DirectoryLock};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

type WorkDirTable = IndexMap<String, String>;

#[derive(Debug, Clone)]
pub struct WorkDirRegistry {
    table_path: PathBuf,
    lock_path: PathBuf,
    work_root: PathBuf,
    lock_timeout: Duration,
    poll_interval: Duration,
    writer: bool,
}

impl WorkDirRegistry {
    pub fn new(settings: &Settings) -> Self {
        Self {
            table_path: settings.work_dirs_file(),
            lock_path: settings.work_dirs_lock(),
            work_root: settings.work_root(),
            lock_timeout: settings.lock_timeout,
            poll_interval: settings.poll_interval,
            writer: settings.is_writer(),
        }
    }

    /// Directory for this computation, created on first use
    pub fn get_or_create(&self, spec: &RunSpecification) -> Result<PathBuf> {
        let key = workdir_key(spec);
        let name = if self.writer {
            self.reserve(&key, spec)?
        } else {
            self.wait_for_entry(&key)?
        };
        Ok(self.work_root.join(name))
    }

    /// Every registered directory
    pub fn entries(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .read_table()?
            .values()
            .map(|name| self.work_root.join(name))
            .collect())
    }

    fn reserve(&self, key: &str, spec: &RunSpecification) -> Result<String> {
        let _lock = DirectoryLock::acquire(&self.lock_path, self.lock_timeout, self.poll_interval)?;
        let mut table = self.read_table()?;
        let name = match table.get(key) {
            Some(name) => {
                tracing::debug!(workdir = %name, "reusing working directory");
                name.clone()
            }
            None => {
                let name = spec.file_stem();
                table.insert(key.to_string(), name.clone());
                write_atomic_string(&self.table_path, &serde_json::to_string_pretty(&table)?)?;
                tracing::debug!(workdir = %name, "reserved working directory");
                name
            }
        };

        let dir = self.work_root.join(&name);
        fs::create_dir_all(&dir).map_err(|e| Error::file_system(&dir, "create directory", e))?;
        Ok(name)
    }

    fn wait_for_entry(&self, key: &str) -> Result<String> {
        let started = Instant::now();
        loop {
            if let Some(name) = self.read_table()?.get(key) {
                if self.work_root.join(name).is_dir() {
                    return Ok(name.clone());
                }
            }
            if started.elapsed() >= self.lock_timeout {
                return Err(Error::lock_timeout(&self.lock_path, self.lock_timeout));
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn read_table(&self) -> Result<WorkDirTable> {
        if !self.table_path.exists() {
            return Ok(WorkDirTable::new());
        }
        let content = read_string(&self.table_path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("corrupt work directory table '{}'", self.table_path.display()))
    }
}

/// Digest of name and parameters, independent of version and uid
fn workdir_key(spec: &RunSpecification) -> String {
    let parameters: BTreeMap<&str, serde_json::Value> = spec
        .parameters()
        .iter()
        .map(|(k, v)| (k.as_str(), encode(v)))
        .collect();
    sha256_hex(serde_json::json!([spec.name(), parameters]).to_string().as_bytes())
}
