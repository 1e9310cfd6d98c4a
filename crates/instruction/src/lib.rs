//! Instruction wrapper for provenant
//!
//! Turns plain functions into reproducible, cached units: parameters are
//! layered and validated, dependencies run first, the body executes in a
//! reserved working directory behind a file barrier, and the outcome is
//! returned as a [`Record`](provenant_record::Record).

pub mod instruction;
pub mod param;
pub mod registry;
pub mod runtime;
pub mod workdir;

pub use instruction::{canonical_name, ExecutionContext, Instruction, InstructionBuilder};
pub use param::{ParamSpec, Parameters};
pub use registry::Registry;
pub use runtime::{RunOptions, Runtime};
pub use workdir::WorkDirRegistry;
