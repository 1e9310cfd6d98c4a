//! Shared utilities for provenant
//!
//! Everything that touches the shared working tree on behalf of several
//! cooperating processes lives here: atomic writes, content digests, the
//! advisory directory lock, the file barrier and the unlink helper. All waiting
//! is sleep-and-repoll against the filesystem.

pub mod atomic_file;
pub mod barrier;
pub mod chdir;
pub mod digest;
pub mod directory_lock;
pub mod logging;

pub use atomic_file::*;
pub use barrier::{unlink, wait_until_absent, wait_until_present, FileBarrier, PollConfig};
pub use chdir::ChdirGuard;
pub use digest::*;
pub use directory_lock::DirectoryLock;
