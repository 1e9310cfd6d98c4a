//! Configuration for provenant
//!
//! Settings are layered: built-in defaults, then `<root>/config.json`, then
//! environment variables, then whatever the caller sets on the loader. The
//! per-instruction parameter override file lives here as well.

pub mod config;
pub mod loader;
pub mod params;

pub use config::{BackendKind, Settings};
pub use loader::{find_root, initialize_root, SettingsLoader};
pub use params::ParameterOverrides;
