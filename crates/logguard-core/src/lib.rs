//! LogGuard Core
//!
//! Event model, configuration and error types shared by the LogGuard crates.

pub mod config;
pub mod error;
pub mod id;
pub mod log_event;

// Re-export commonly used types
pub use config::Config;
pub use error::{
    EventError, IdGenerationError, IngestionError, LogGuardError, OutputError, Result,
};
pub use id::{IdGenerator, UuidGenerator};
pub use log_event::{parse_severity, LogEvent, Metadata, Severity, SourceKind};
