//! The record cache
//!
//! [`Cache`] layers the public contract on top of a [`CacheBackend`]: exact
//! lookups, migration lineage and compute-or-fetch. On processes that are not
//! the writer nothing is persisted, but results are still handed back.

use crate::backend::{CacheBackend, FileCacheBackend, LegacyFileSystemBackend, MemoryCacheBackend};
use provenant_config::{BackendKind, Settings};
use provenant_core::{Error, Result};
use provenant_record::{Record, RunSpecification, Selector, Serializer};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    writer: bool,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            writer: true,
        }
    }

    /// Cache on the backend named in the settings
    pub fn from_settings(settings: &Settings, serializer: Serializer) -> Result<Self> {
        let backend: Arc<dyn CacheBackend> = match settings.backend {
            BackendKind::Fs => Arc::new(
                FileCacheBackend::new(&settings.root, serializer)
                    .with_lock_timeout(settings.lock_timeout, settings.poll_interval),
            ),
            BackendKind::Legacy => Arc::new(LegacyFileSystemBackend::new(&settings.project_dir, serializer)?),
            BackendKind::Memory => Arc::new(MemoryCacheBackend::new()),
        };
        tracing::debug!(backend = backend.name(), writer = settings.is_writer(), "opened cache");
        Ok(Self::new(backend).writer(settings.is_writer()))
    }

    /// In-memory cache, mostly for tests
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryCacheBackend::new()))
    }

    /// Whether this process persists anything
    pub fn writer(mut self, writer: bool) -> Self {
        self.writer = writer;
        self
    }

    pub fn is_writer(&self) -> bool {
        self.writer
    }

    pub fn backend(&self) -> &dyn CacheBackend {
        self.backend.as_ref()
    }

    pub fn add(&self, record: &Record) -> Result<()> {
        if !self.writer {
            tracing::trace!(uid = record.uid(), "not the writer, skipping add");
            return Ok(());
        }
        self.backend.add(record)
    }

    pub fn update(&self, record: &Record) -> Result<()> {
        if !self.writer {
            tracing::trace!(uid = record.uid(), "not the writer, skipping update");
            return Ok(());
        }
        self.backend.update(record)
    }

    pub fn select(&self, selector: Option<&Selector>) -> Result<Vec<Record>> {
        self.backend.select(selector)
    }

    pub fn has(&self, selector: &Selector) -> Result<bool> {
        self.backend.has(selector)
    }

    pub fn remove(&self, selector: Option<&Selector>) -> Result<Vec<Record>> {
        if !self.writer {
            return self.backend.select(selector);
        }
        self.backend.remove(selector)
    }

    /// The single record matching `selector`
    pub fn get(&self, selector: &Selector) -> Result<Record> {
        let mut records = self.backend.select(Some(selector))?;
        match records.len() {
            0 => Err(Error::no_match(selector)),
            1 => Ok(records.remove(0)),
            count => Err(Error::ambiguous_match(selector, count)),
        }
    }

    /// Supersede `original` with `migrated`
    ///
    /// The migrated record gets a fresh uid and both records point at each
    /// other. The original is updated first so a crash in between leaves no
    /// record that claims a predecessor which is still current.
    pub fn migrate_record(&self, original: &Record, mut migrated: Record, label: &str) -> Result<Record> {
        let mut superseded = original.clone();
        migrated.run_specification = migrated.run_specification.with_uid();
        migrated.migrated_from = Some(original.uid().to_string());
        migrated.migrated_to = None;
        migrated.migration_id = Some(label.to_string());
        superseded.migrated_to = Some(migrated.uid().to_string());

        self.update(&superseded)?;
        self.add(&migrated)?;
        tracing::info!(
            from = original.uid(),
            to = migrated.uid(),
            migration = label,
            "migrated record"
        );
        Ok(migrated)
    }

    /// The current cached record for this computation, computing it on a miss
    pub fn get_or_compute<F>(&self, spec: &RunSpecification, compute: F) -> Result<Record>
    where
        F: FnOnce(&RunSpecification) -> Result<Record>,
    {
        let selector = Selector::fingerprint(spec);
        let mut cached = self.backend.select(Some(&selector))?;
        if !cached.is_empty() {
            if cached.len() > 1 {
                tracing::warn!(
                    name = spec.name(),
                    count = cached.len(),
                    "several current records for one computation, using the first"
                );
            }
            let record = cached.remove(0);
            tracing::info!(name = spec.name(), uid = record.uid(), "cache hit");
            return Ok(record);
        }

        tracing::info!(name = spec.name(), "cache miss, computing");
        let record = compute(spec)?;
        self.add(&record)?;
        Ok(record)
    }

    /// Compute-or-fetch as a reusable function
    pub fn wrapper<F>(&self, compute: F) -> impl Fn(&RunSpecification) -> Result<Record> + '_
    where
        F: Fn(&RunSpecification) -> Result<Record> + 'static,
    {
        move |spec: &RunSpecification| self.get_or_compute(spec, &compute)
    }

    /// Add every legacy record whose name and parameters are not cached yet
    pub fn import_legacy(&self, legacy: &LegacyFileSystemBackend) -> Result<Vec<String>> {
        let mut imported = Vec::new();
        for record in legacy.select(None)? {
            let selector = Selector::new()
                .equal("run_specification.name", record.name())
                .equal(
                    "run_specification.parameters",
                    provenant_core::Value::Map(record.parameters().clone()),
                );
            if self.has(&selector)? {
                tracing::debug!(name = record.name(), "legacy record already cached");
                continue;
            }
            self.add(&record)?;
            imported.push(record.uid().to_string());
        }
        tracing::info!(count = imported.len(), "imported legacy records");
        Ok(imported)
    }
}
