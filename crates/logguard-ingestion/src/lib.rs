//! LogGuard Ingestion
//!
//! Live log sources for LogGuard: stdin, tailed files and unix sockets,
//! fanned into one bounded channel by the [`Orchestrator`].

pub mod channel;
pub mod file;
pub mod fs;
pub mod orchestrator;
pub mod shutdown;
pub mod signals;
pub mod stdin;
pub mod unix;

pub use channel::{
    create_error_channel, create_event_channel, SourceContext, DEFAULT_CHANNEL_SIZE,
    DEFAULT_ERROR_CHANNEL_SIZE,
};
pub use file::{expand_paths, FileSource};
pub use fs::{
    ChangeKind, FileChange, FileHandle, FileSystem, FileWatcher, NotifyWatcherFactory,
    OsFileSystem, WatcherFactory,
};
pub use orchestrator::{Collector, EventSink, Orchestrator, OrchestratorHandle};
pub use shutdown::{ShutdownCoordinator, ShutdownGuard};
pub use stdin::StdinSource;
pub use unix::{Connection, Dialer, UnixDialer, UnixSocketSource};

use logguard_core::SourceKind;

/// A log source that can be started once.
///
/// `start` must not block: it spawns the source's task and returns. The task
/// owns `guard` and drops it after every resource it acquired is released.
pub trait Source: Send {
    fn kind(&self) -> SourceKind;

    /// Human readable location, for logs
    fn describe(&self) -> String;

    fn start(self: Box<Self>, ctx: SourceContext, guard: ShutdownGuard);
}
