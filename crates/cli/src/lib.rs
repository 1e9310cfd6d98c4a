pub mod commands;
pub mod demo;

pub use commands::Commands;
