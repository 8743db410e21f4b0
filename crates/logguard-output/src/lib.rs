//! LogGuard Output
//!
//! Prints ingested events to stdout as pretty text, JSON or raw lines.

pub mod stdout;

pub use stdout::{OutputFormat, StdoutWriter};
