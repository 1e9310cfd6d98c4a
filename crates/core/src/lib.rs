//! Core domain types, errors, and constants for `provenant`.
//!
//! ## Key Components
//!
//! - **`errors`**: the primary `Error` enum and `Result` alias, covering every
//!   failure the cache, serializer, migration engine and instruction wrapper
//!   can surface.
//! - **`value`**: the dynamically shaped [`Value`] carried by parameters and
//!   results, together with its JSON wire encoding.
//! - **`annotated`**: [`Annotated`], a payload with an explanation attached.
//! - **`constants`**: on-disk layout names and environment variables.

pub mod annotated;
pub mod constants;
pub mod errors;
pub mod value;

pub use self::{
    annotated::Annotated,
    constants::*,
    errors::{Error, Result, ResultExt},
    value::{ArrayData, Complex, ExternalFile, Map, NdArray, Object, Tagged, Value},
};
