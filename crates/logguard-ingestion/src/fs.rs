//! Filesystem capabilities used by the watched-file source.
//!
//! The file source never touches `tokio::fs` or `notify` directly; it goes
//! through [`FileSystem`] and [`WatcherFactory`] so tests can substitute
//! failing or scripted implementations.

use async_trait::async_trait;
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncSeek};
use tokio::sync::mpsc;
use tracing::debug;

/// Capacity of the bridge between the notify thread and the async loop
const WATCH_CHANNEL_SIZE: usize = 100;

/// An open, seekable, readable file
pub trait FileHandle: AsyncRead + AsyncSeek + Unpin + Send {}

impl<T: AsyncRead + AsyncSeek + Unpin + Send> FileHandle for T {}

/// Opens files for reading
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn open(&self, path: &Path) -> io::Result<Box<dyn FileHandle>>;
}

/// The real filesystem, through `tokio::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

#[async_trait]
impl FileSystem for OsFileSystem {
    async fn open(&self, path: &Path) -> io::Result<Box<dyn FileHandle>> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(file))
    }
}

/// What happened to a watched path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Content was appended or rewritten
    Write,
    /// Anything else (create, rename, permission change, ...)
    Other,
}

impl From<&EventKind> for ChangeKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                ChangeKind::Write
            }
            _ => ChangeKind::Other,
        }
    }
}

/// A change notification for one or more watched paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub paths: Vec<PathBuf>,
}

impl FileChange {
    pub fn write(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Write,
            paths: vec![path.into()],
        }
    }
}

impl From<Event> for FileChange {
    fn from(event: Event) -> Self {
        Self {
            kind: ChangeKind::from(&event.kind),
            paths: event.paths,
        }
    }
}

/// A registered filesystem watcher.
///
/// Changes and errors arrive on two separate channels. A `None` on the error
/// channel is a wake-up without a payload and carries no failure. Dropping
/// the watcher releases every registration it holds.
pub trait FileWatcher: Send {
    fn watch(&mut self, path: &Path) -> Result<(), notify::Error>;

    /// Both notification channels, borrowed together so they can be awaited
    /// side by side
    fn channels(
        &mut self,
    ) -> (
        &mut mpsc::Receiver<FileChange>,
        &mut mpsc::Receiver<Option<notify::Error>>,
    );
}

/// Creates filesystem watchers
pub trait WatcherFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn FileWatcher>, notify::Error>;
}

/// Factory for the platform's recommended `notify` backend
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyWatcherFactory;

impl WatcherFactory for NotifyWatcherFactory {
    fn create(&self) -> Result<Box<dyn FileWatcher>, notify::Error> {
        let (change_tx, change_rx) = mpsc::channel(WATCH_CHANNEL_SIZE);
        let (error_tx, error_rx) = mpsc::channel(WATCH_CHANNEL_SIZE);

        // notify calls back on its own thread, so blocking_send is safe here
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    debug!(kind = ?event.kind, paths = ?event.paths, "Received file event");
                    let _ = change_tx.blocking_send(FileChange::from(event));
                }
                Err(e) => {
                    let _ = error_tx.blocking_send(Some(e));
                }
            },
            Config::default(),
        )?;

        Ok(Box::new(NotifyWatcher {
            watcher,
            changes: change_rx,
            errors: error_rx,
        }))
    }
}

struct NotifyWatcher {
    watcher: RecommendedWatcher,
    changes: mpsc::Receiver<FileChange>,
    errors: mpsc::Receiver<Option<notify::Error>>,
}

impl FileWatcher for NotifyWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), notify::Error> {
        self.watcher.watch(path, RecursiveMode::NonRecursive)
    }

    fn channels(
        &mut self,
    ) -> (
        &mut mpsc::Receiver<FileChange>,
        &mut mpsc::Receiver<Option<notify::Error>>,
    ) {
        (&mut self.changes, &mut self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind, RenameMode};
    use std::io::Write;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_change_kind_mapping() {
        assert_eq!(
            ChangeKind::from(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            ChangeKind::Write
        );
        assert_eq!(
            ChangeKind::from(&EventKind::Modify(ModifyKind::Any)),
            ChangeKind::Write
        );
        assert_eq!(
            ChangeKind::from(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            ChangeKind::Other
        );
        assert_eq!(
            ChangeKind::from(&EventKind::Create(CreateKind::File)),
            ChangeKind::Other
        );
        assert_eq!(
            ChangeKind::from(&EventKind::Access(AccessKind::Any)),
            ChangeKind::Other
        );
    }

    #[tokio::test]
    async fn test_os_file_system_open() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "content").unwrap();
        file.flush().unwrap();

        let mut handle = OsFileSystem.open(file.path()).await.unwrap();
        let mut buf = String::new();
        handle.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "content");

        assert!(OsFileSystem
            .open(Path::new("/nonexistent/logguard.log"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_notify_watcher_reports_writes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut watcher = NotifyWatcherFactory.create().unwrap();
        watcher.watch(file.path()).unwrap();

        writeln!(file, "appended").unwrap();
        file.flush().unwrap();

        let (changes, _errors) = watcher.channels();
        let change = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match changes.recv().await {
                    Some(change) if change.kind == ChangeKind::Write => return Some(change),
                    Some(_) => continue,
                    None => return None,
                }
            }
        })
        .await
        .expect("write notification should arrive");

        assert!(change.is_some());
    }
}
