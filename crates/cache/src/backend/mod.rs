//! Storage backends behind [`crate::Cache`]

mod file;
mod legacy;
mod legacy_json;
mod memory;

pub use file::FileCacheBackend;
pub use legacy::LegacyFileSystemBackend;
pub use memory::MemoryCacheBackend;

use provenant_core::Result;
use provenant_record::{Record, Selector};
use std::fmt;

/// Persistence operations over records keyed by uid
///
/// `add` fails with a duplicate-record error for a known uid and `update`
/// fails with a record-not-found error for an unknown one.
pub trait CacheBackend: fmt::Debug + Send + Sync {
    fn add(&self, record: &Record) -> Result<()>;

    fn update(&self, record: &Record) -> Result<()>;

    /// `None` selects every record
    fn select(&self, selector: Option<&Selector>) -> Result<Vec<Record>>;

    /// Stops at the first match
    fn has(&self, selector: &Selector) -> Result<bool>;

    /// Delete matching records and return them
    fn remove(&self, selector: Option<&Selector>) -> Result<Vec<Record>>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
