//! Atomic file operations so readers never observe half written records

use provenant_core::{Error, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

fn parent_dir(path: &Path) -> Result<&Path> {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| {
            Error::configuration(format!("invalid file path '{}': no parent directory", path.display()))
        })
}

/// Fill a sibling temporary file, sync it, then rename it over `path`
fn persist_with(path: &Path, fill: impl FnOnce(&mut NamedTempFile) -> io::Result<()>) -> Result<()> {
    let parent = parent_dir(path)?;
    fs::create_dir_all(parent)
        .map_err(|e| Error::file_system(parent, "create parent directory", e))?;

    let mut temp = NamedTempFile::new_in(parent)
        .map_err(|e| Error::file_system(parent, "create temporary file", e))?;
    fill(&mut temp).map_err(|e| Error::file_system(temp.path(), "write to temporary file", e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::file_system(temp.path(), "sync temporary file", e))?;

    // Dropping the temp file on error removes it
    temp.persist(path)
        .map_err(|e| Error::file_system(path, "atomic rename", e.error))?;
    Ok(())
}

/// Write data to a file atomically by writing to a sibling temporary file and renaming
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    persist_with(path, |temp| temp.write_all(content))
}

/// Write string content to a file atomically
pub fn write_atomic_string(path: &Path, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes())
}

/// Read a whole file, attaching the path to any error
pub fn read_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::file_system(path, "read", e))
}

/// Copy a file so the destination appears complete or not at all
///
/// The content is streamed, artifacts can be far larger than memory.
pub fn copy_atomic(from: &Path, to: &Path) -> Result<()> {
    let mut source = fs::File::open(from).map_err(|e| Error::file_system(from, "open for copy", e))?;
    persist_with(to, |temp| io::copy(&mut source, temp).map(|_| ()))
}
