use super::CacheBackend;
use indexmap::IndexMap;
use parking_lot::RwLock;
use provenant_core::{Error, Result};
use provenant_record::{Record, Selector};

/// Process local backend, nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    records: RwLock<IndexMap<String, Record>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

fn matches(selector: Option<&Selector>, record: &Record) -> bool {
    selector.map_or(true, |s| s.matches(record))
}

impl CacheBackend for MemoryCacheBackend {
    fn add(&self, record: &Record) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(record.uid()) {
            return Err(Error::duplicate_record(record.uid()));
        }
        records.insert(record.uid().to_string(), record.clone());
        Ok(())
    }

    fn update(&self, record: &Record) -> Result<()> {
        let mut records = self.records.write();
        match records.get_mut(record.uid()) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(Error::record_not_found(record.uid())),
        }
    }

    fn select(&self, selector: Option<&Selector>) -> Result<Vec<Record>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| matches(selector, r))
            .cloned()
            .collect())
    }

    fn has(&self, selector: &Selector) -> Result<bool> {
        Ok(self.records.read().values().any(|r| selector.matches(r)))
    }

    fn remove(&self, selector: Option<&Selector>) -> Result<Vec<Record>> {
        let mut records = self.records.write();
        let mut removed = Vec::new();
        records.retain(|_, record| {
            if matches(selector, record) {
                removed.push(record.clone());
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
