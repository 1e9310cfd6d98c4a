//! Provenance model for provenant
//!
//! - [`RunSpecification`]: what was run (name, parameters, version, uid)
//! - [`Resources`]: what it cost
//! - [`Record`]: the envelope persisted in the cache
//! - [`Selector`]: declarative queries over records, shared by cache lookups
//!   and migration applicability
//! - [`Serializer`]: JSON text in and out, constructing tagged objects only
//!   through the [`TypeRegistry`]

pub mod record;
pub mod resources;
pub mod selector;
pub mod serialize;
pub mod specification;

pub use record::{Record, SideEffect};
pub use resources::Resources;
pub use selector::{parse_literal, Comparator, Selector, DEFAULT_RTOL};
pub use serialize::{Serializer, TypeRegistry};
pub use specification::{new_uid, uid_prefix, RunSpecification};
