//! One JSON file per record plus a uid index
//!
//! ```text
//! <root>/records/run-data.json          uid -> record file name
//! <root>/records/run-data.lock          held during index read-modify-write
//! <root>/records/<name>-<uid10>.json
//! <root>/external_files/<uid10>-<name>
//! ```
//!
//! The index is the single source of truth. It is rewritten in full on every
//! change, atomically, while the index lock is held, so concurrent writers of
//! different uids are serialized.

use super::CacheBackend;
use indexmap::IndexMap;
use provenant_core::{
    Error, ExternalFile, Result, EXTERNAL_FILES_DIR, RECORDS_DIR, ROOT_DIR_NAME,
    UID_TABLE_FILENAME, UID_TABLE_LOCK_FILENAME,
};
use provenant_record::{uid_prefix, Record, Selector, Serializer};
use provenant_utils::{copy_atomic, read_string, sha256_file, write_atomic_string, DirectoryLock};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

type UidTable = IndexMap<String, String>;

#[derive(Debug, Clone)]
pub struct FileCacheBackend {
    root: PathBuf,
    serializer: Serializer,
    lock_timeout: Duration,
    poll_interval: Duration,
}

impl FileCacheBackend {
    /// Backend rooted at a `.provenant` directory
    pub fn new(root: impl Into<PathBuf>, serializer: Serializer) -> Self {
        Self {
            root: root.into(),
            serializer,
            lock_timeout: Duration::from_secs(provenant_core::DEFAULT_LOCK_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(provenant_core::DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// How long to wait for the index lock and how often to retry
    pub fn with_lock_timeout(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.lock_timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn records_dir(&self) -> PathBuf {
        self.root.join(RECORDS_DIR)
    }

    fn uid_table_path(&self) -> PathBuf {
        self.records_dir().join(UID_TABLE_FILENAME)
    }

    fn external_files_dir(&self) -> PathBuf {
        self.root.join(EXTERNAL_FILES_DIR)
    }

    /// Directory relative paths in records are resolved against
    fn project_dir(&self) -> &Path {
        self.root.parent().unwrap_or(&self.root)
    }

    /// The cache exists once the index file does
    pub fn initialized(&self) -> bool {
        self.uid_table_path().is_file()
    }

    fn initialize(&self) -> Result<()> {
        if self.initialized() {
            return Ok(());
        }
        let records_dir = self.records_dir();
        fs::create_dir_all(&records_dir)
            .map_err(|e| Error::file_system(&records_dir, "create records directory", e))?;
        self.write_uid_table(&UidTable::new())?;
        tracing::debug!(root = %self.root.display(), "initialized file cache");
        Ok(())
    }

    fn read_uid_table(&self) -> Result<UidTable> {
        let path = self.uid_table_path();
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                Error::unknown_data_format(format!("invalid uid table '{}': {e}", path.display()))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(UidTable::new()),
            Err(e) => Err(Error::file_system(&path, "read uid table", e)),
        }
    }

    fn write_uid_table(&self, table: &UidTable) -> Result<()> {
        write_atomic_string(&self.uid_table_path(), &serde_json::to_string_pretty(table)?)
    }

    /// Run a read-modify-write of the index under the index lock
    fn with_uid_table<T>(&self, f: impl FnOnce(&mut UidTable) -> Result<T>) -> Result<T> {
        self.initialize()?;
        let lock_path = self.records_dir().join(UID_TABLE_LOCK_FILENAME);
        let _lock = DirectoryLock::acquire(&lock_path, self.lock_timeout, self.poll_interval)?;
        let mut table = self.read_uid_table()?;
        let output = f(&mut table)?;
        self.write_uid_table(&table)?;
        Ok(output)
    }

    fn read_record(&self, file_name: &str) -> Result<Record> {
        let path = self.records_dir().join(file_name);
        self.serializer.deserialize_record(&read_string(&path)?)
    }

    fn write_record(&self, file_name: &str, record: &Record) -> Result<()> {
        let path = self.records_dir().join(file_name);
        write_atomic_string(&path, &self.serializer.serialize_record(record)?)
    }

    /// Take ownership of every external file the result references
    fn store_external_files(&self, record: &Record) -> Result<Record> {
        let mut stored = record.clone();
        let prefix = uid_prefix(record.uid()).to_string();
        stored
            .result
            .visit_files_mut(&mut |file| self.store_external_file(&prefix, file))?;
        Ok(stored)
    }

    fn store_external_file(&self, prefix: &str, file: &mut ExternalFile) -> Result<()> {
        let external_dir = self.external_files_dir();
        let source = if file.path.is_absolute() {
            file.path.clone()
        } else {
            self.project_dir().join(&file.path)
        };
        if source.starts_with(&external_dir) {
            return Ok(());
        }

        let file_name = format!("{prefix}-{}", file.file_name());
        let destination = external_dir.join(&file_name);
        if file.sha256.is_empty() {
            file.sha256 = sha256_file(&source)?;
        }

        let reusable = destination.is_file() && sha256_file(&destination)? == file.sha256;
        if !reusable {
            copy_atomic(&source, &destination)?;
            tracing::debug!(
                source = %source.display(),
                destination = %destination.display(),
                "copied external file into cache"
            );
        }
        file.path = Path::new(ROOT_DIR_NAME).join(EXTERNAL_FILES_DIR).join(file_name);
        Ok(())
    }

    fn records_in(&self, table: &UidTable) -> impl Iterator<Item = Result<Record>> + '_ {
        table
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .map(move |file_name| self.read_record(&file_name))
    }
}

impl CacheBackend for FileCacheBackend {
    fn add(&self, record: &Record) -> Result<()> {
        let stored = self.store_external_files(record)?;
        let file_name = format!("{}.json", record.run_specification.file_stem());
        self.with_uid_table(|table| {
            if table.contains_key(record.uid()) {
                return Err(Error::duplicate_record(record.uid()));
            }
            self.write_record(&file_name, &stored)?;
            table.insert(record.uid().to_string(), file_name.clone());
            Ok(())
        })?;
        tracing::debug!(uid = record.uid(), name = record.name(), "added record");
        Ok(())
    }

    fn update(&self, record: &Record) -> Result<()> {
        let stored = self.store_external_files(record)?;
        self.with_uid_table(|table| {
            let file_name = table
                .get(record.uid())
                .ok_or_else(|| Error::record_not_found(record.uid()))?;
            self.write_record(file_name, &stored)
        })?;
        tracing::debug!(uid = record.uid(), name = record.name(), "updated record");
        Ok(())
    }

    fn select(&self, selector: Option<&Selector>) -> Result<Vec<Record>> {
        let table = self.read_uid_table()?;
        let mut selected = Vec::new();
        for record in self.records_in(&table) {
            let record = record?;
            if selector.map_or(true, |s| s.matches(&record)) {
                selected.push(record);
            }
        }
        Ok(selected)
    }

    fn has(&self, selector: &Selector) -> Result<bool> {
        let table = self.read_uid_table()?;
        for record in self.records_in(&table) {
            if selector.matches(&record?) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn remove(&self, selector: Option<&Selector>) -> Result<Vec<Record>> {
        if !self.initialized() {
            return Ok(Vec::new());
        }
        // every entry is read before the index changes, files go only once it is rewritten
        let (removed, file_names) = self.with_uid_table(|table| {
            let mut removed = Vec::new();
            let mut file_names = Vec::new();
            let mut kept = UidTable::new();
            for (uid, file_name) in table.iter() {
                let record = self.read_record(file_name)?;
                if selector.map_or(true, |s| s.matches(&record)) {
                    removed.push(record);
                    file_names.push(file_name.clone());
                } else {
                    kept.insert(uid.clone(), file_name.clone());
                }
            }
            *table = kept;
            Ok((removed, file_names))
        })?;
        for file_name in file_names {
            let path = self.records_dir().join(&file_name);
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "could not remove unindexed record file");
            }
        }
        tracing::debug!(count = removed.len(), "removed records");
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "fs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenant_core::{Map, Value};
    use provenant_record::RunSpecification;
    use tempfile::TempDir;

    fn backend(temp_dir: &TempDir) -> FileCacheBackend {
        FileCacheBackend::new(temp_dir.path().join(ROOT_DIR_NAME), Serializer::default())
    }

    fn record(n: i64) -> Record {
        let mut params = Map::new();
        params.insert("n".into(), Value::from(n));
        Record::new(RunSpecification::new("demo::main", params, 0), n * 2)
    }

    #[test]
    fn test_lazily_initialized() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let backend = backend(&temp_dir);
        assert!(!backend.initialized());
        assert!(backend.select(None)?.is_empty());
        assert!(!backend.initialized());

        backend.add(&record(1))?;
        assert!(backend.initialized());
        Ok(())
    }

    #[test]
    fn test_layout_on_disk() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let backend = backend(&temp_dir);
        let r = record(3);
        backend.add(&r)?;

        let records_dir = temp_dir.path().join(ROOT_DIR_NAME).join(RECORDS_DIR);
        let file_name = format!("demo::main-{}.json", &r.uid()[..10]);
        assert!(records_dir.join(&file_name).is_file());

        let table: UidTable =
            serde_json::from_str(&fs::read_to_string(records_dir.join(UID_TABLE_FILENAME))?)?;
        assert_eq!(table.get(r.uid()), Some(&file_name));
        Ok(())
    }

    #[test]
    fn test_remove_deletes_files_and_index_entries() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let backend = backend(&temp_dir);
        let keep = record(1);
        let gone = record(2);
        backend.add(&keep)?;
        backend.add(&gone)?;

        let removed = backend.remove(Some(&Selector::new().equal("parameters.n", 2)))?;
        assert_eq!(removed, vec![gone.clone()]);
        assert_eq!(backend.select(None)?, vec![keep]);
        assert!(!backend.has(&Selector::uid(gone.uid()))?);

        let records_dir = temp_dir.path().join(ROOT_DIR_NAME).join(RECORDS_DIR);
        let json_files = fs::read_dir(&records_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("demo::main"))
            .count();
        assert_eq!(json_files, 1);
        Ok(())
    }

    #[test]
    fn test_external_files_are_copied_once() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let backend = backend(&temp_dir);
        let artifact = temp_dir.path().join("gs.gpw");
        fs::write(&artifact, b"wavefunctions")?;

        let spec = RunSpecification::new("demo::main", Map::new(), 0);
        let r = Record::new(spec, Value::File(ExternalFile::new("gs.gpw", "")));
        backend.add(&r)?;

        let stored = backend.select(None)?.remove(0);
        let expected = Path::new(ROOT_DIR_NAME)
            .join(EXTERNAL_FILES_DIR)
            .join(format!("{}-gs.gpw", &r.uid()[..10]));
        let Value::File(file) = &stored.result else {
            panic!("result is not an external file: {:?}", stored.result);
        };
        assert_eq!(file.path, expected);
        assert_eq!(file.sha256, sha256_file(&artifact)?);
        assert_eq!(fs::read(temp_dir.path().join(&expected))?, b"wavefunctions");

        // a reference already owned by the cache is left alone
        let mut migrated = stored.clone();
        migrated.tags.push("migrated".into());
        backend.update(&migrated)?;
        let copies = fs::read_dir(temp_dir.path().join(ROOT_DIR_NAME).join(EXTERNAL_FILES_DIR))?.count();
        assert_eq!(copies, 1);
        Ok(())
    }

    #[test]
    fn test_missing_record_file_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let backend = backend(&temp_dir);
        let r = record(1);
        backend.add(&r)?;
        let path = temp_dir
            .path()
            .join(ROOT_DIR_NAME)
            .join(RECORDS_DIR)
            .join(format!("{}.json", r.run_specification.file_stem()));
        fs::remove_file(path)?;

        assert!(matches!(backend.select(None), Err(Error::FileSystem { .. })));
        Ok(())
    }

    #[test]
    fn test_failed_remove_leaves_cache_readable() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let backend = backend(&temp_dir);
        let records: Vec<Record> = (1..=3).map(record).collect();
        for r in &records {
            backend.add(r)?;
        }
        let corrupt = temp_dir
            .path()
            .join(ROOT_DIR_NAME)
            .join(RECORDS_DIR)
            .join(format!("{}.json", records[2].run_specification.file_stem()));
        fs::write(&corrupt, "not json")?;

        assert!(backend.remove(None).is_err());

        let first = backend.select(Some(&Selector::uid(records[0].uid())))?;
        assert_eq!(first, vec![records[0].clone()]);
        assert!(backend.has(&Selector::uid(records[1].uid()))?);
        Ok(())
    }
}
