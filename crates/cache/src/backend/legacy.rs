//! Read-only view over flat `results-<name>.json` files
//!
//! Older projects kept one result file per instruction next to the inputs.
//! These are exposed as records with version `-1` so they can be queried and
//! imported, but nothing is ever written in this layout.

use super::legacy_json::decode_legacy;
use super::CacheBackend;
use chrono::{DateTime, TimeZone, Utc};
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use provenant_core::{
    Error, Map, Result, Value, DEFAULT_STEP, LEGACY_RESULTS_PREFIX, ROOT_DIR_NAME,
    STEP_SEPARATOR,
};
use provenant_record::{Record, Resources, RunSpecification, Selector, Serializer};
use provenant_utils::{read_string, sha256_hex};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const RESULT_PATTERNS: &[&str] = &[
    "results-*.json",
    "displacements*/*/results-*.json",
    "strains*/results-*.json",
];

const SKIP_PATTERNS: &[&str] = &[
    "results-*.database.fromtree.json",
    "results-*.database.app.json",
    "results-*.database.key_descriptions.json",
    "displacements*/*/results-*.database.material_fingerprint.json",
    "strains*/results-*.database.material_fingerprint.json",
    "*.setup.params.json",
];

#[derive(Debug)]
pub struct LegacyFileSystemBackend {
    directory: PathBuf,
    patterns: GlobSet,
    skip: GlobSet,
    serializer: Serializer,
}

fn glob(pattern: &str) -> Result<Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| Error::configuration(format!("invalid glob pattern '{pattern}': {e}")))
}

fn glob_set<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(glob(pattern)?);
    }
    builder
        .build()
        .map_err(|e| Error::configuration(format!("invalid glob set: {e}")))
}

impl LegacyFileSystemBackend {
    /// View over the result files below `directory`
    pub fn new(directory: impl Into<PathBuf>, serializer: Serializer) -> Result<Self> {
        Ok(Self {
            directory: directory.into(),
            patterns: glob_set(RESULT_PATTERNS.iter().copied())?,
            skip: glob_set(SKIP_PATTERNS.iter().copied())?,
            serializer,
        })
    }

    /// Replace the default skip patterns
    pub fn with_skip_patterns<'a>(mut self, patterns: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        self.skip = glob_set(patterns)?;
        Ok(self)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Result files relative to the directory, in a stable order
    pub fn result_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.directory)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.file_name() != ROOT_DIR_NAME)
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.directory)
                    .ok()
                    .map(Path::to_path_buf)
            })
            .filter(|relative| self.patterns.is_match(relative) && !self.skip.is_match(relative))
            .collect();
        files.sort();
        files
    }

    /// Build the record for one result file
    pub fn read_record(&self, relative: &Path) -> Result<Record> {
        let path = self.directory.join(relative);
        let json: serde_json::Value = serde_json::from_str(&read_string(&path)?)?;

        let (data, metadata) = match json {
            serde_json::Value::Object(mut map)
                if map.contains_key("data") && map.contains_key("metadata") =>
            {
                let data = map.remove("data").unwrap_or_default();
                let metadata = map.remove("metadata").unwrap_or_default();
                (data, metadata)
            }
            other => (other, serde_json::Value::Null),
        };

        let result = decode_legacy(&data)?;
        self.serializer.registry().validate(&result)?;

        let name = metadata
            .get("asr_name")
            .or_else(|| metadata.get("name"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .or_else(|| name_from_file(relative))
            .ok_or_else(|| {
                Error::unknown_data_format(format!(
                    "cannot derive an instruction name from '{}'",
                    relative.display()
                ))
            })?;

        let parameters = match metadata.get("params") {
            Some(params) => match decode_legacy(params)? {
                Value::Map(map) => map,
                other => {
                    return Err(Error::unknown_data_format(format!(
                        "parameters in '{}' must be a mapping, got {}",
                        relative.display(),
                        other.type_name()
                    )))
                }
            },
            None => Map::new(),
        };

        let uid = legacy_uid(relative);
        let spec = RunSpecification::from_parts(normalize_name(&name), parameters, -1, uid);
        let mut record = Record::new(spec, result);
        record.resources = metadata.get("resources").map(legacy_resources);
        Ok(record)
    }

    fn records(&self) -> Result<Vec<Record>> {
        self.result_files()
            .iter()
            .map(|relative| self.read_record(relative))
            .collect()
    }
}

/// `results-a.b@step.json` -> `a.b@step`
fn name_from_file(relative: &Path) -> Option<String> {
    let file_name = relative.file_name()?.to_str()?;
    let stem = file_name.strip_prefix(LEGACY_RESULTS_PREFIX)?.strip_suffix(".json")?;
    Some(stem.to_string())
}

/// `a.b@step` -> `a.b::step`, `a.b` -> `a.b::main`
fn normalize_name(name: &str) -> String {
    if name.contains(STEP_SEPARATOR) {
        name.to_string()
    } else if name.contains('@') {
        name.replace('@', STEP_SEPARATOR)
    } else {
        format!("{name}{STEP_SEPARATOR}{DEFAULT_STEP}")
    }
}

/// Stable uid so that repeated scans agree
fn legacy_uid(relative: &Path) -> String {
    let digest = sha256_hex(relative.to_string_lossy().as_bytes());
    digest[..32].to_string()
}

fn legacy_time(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::Number(n) => {
            let secs = n.as_f64()?;
            let nanos = (secs.fract() * 1e9).round() as u32;
            Utc.timestamp_opt(secs.trunc() as i64, nanos.min(999_999_999)).single()
        }
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    }
}

fn legacy_resources(resources: &serde_json::Value) -> Resources {
    Resources {
        execution_start: resources.get("tstart").and_then(legacy_time),
        execution_end: resources.get("tend").and_then(legacy_time),
        execution_duration: resources.get("time").and_then(serde_json::Value::as_f64),
        ncores: resources
            .get("ncores")
            .and_then(serde_json::Value::as_u64)
            .map(|n| n as usize),
    }
}

impl CacheBackend for LegacyFileSystemBackend {
    fn add(&self, _record: &Record) -> Result<()> {
        Err(Error::unsupported("add", "the legacy results layout is read-only"))
    }

    fn update(&self, _record: &Record) -> Result<()> {
        Err(Error::unsupported("update", "the legacy results layout is read-only"))
    }

    fn select(&self, selector: Option<&Selector>) -> Result<Vec<Record>> {
        let records = self.records()?;
        Ok(match selector {
            Some(selector) => records.into_iter().filter(|r| selector.matches(r)).collect(),
            None => records,
        })
    }

    fn has(&self, selector: &Selector) -> Result<bool> {
        for relative in self.result_files() {
            if selector.matches(&self.read_record(&relative)?) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn remove(&self, _selector: Option<&Selector>) -> Result<Vec<Record>> {
        Err(Error::unsupported("remove", "the legacy results layout is read-only"))
    }

    fn name(&self) -> &'static str {
        "legacy"
    }
}
