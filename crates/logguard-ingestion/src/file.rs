use crate::channel::SourceContext;
use crate::fs::{ChangeKind, FileHandle, FileSystem, FileWatcher, WatcherFactory};
use crate::shutdown::ShutdownGuard;
use crate::Source;
use glob::glob;
use logguard_core::config::is_glob_pattern;
use logguard_core::{IdGenerator, IngestionError, SourceKind};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info, warn};

/// Expand glob patterns into actual file paths, skipping ignored ones.
///
/// Literal paths are kept even when they do not exist yet, so that opening
/// them fails visibly instead of silently matching nothing.
pub fn expand_paths(patterns: &[String], ignore: &[String]) -> Vec<PathBuf> {
    let ignore: Vec<glob::Pattern> = ignore
        .iter()
        .filter_map(|pattern| match glob::Pattern::new(pattern) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid ignore pattern");
                None
            }
        })
        .collect();

    let mut files = Vec::new();

    for pattern in patterns {
        if !is_glob_pattern(pattern) {
            let path = PathBuf::from(pattern);
            if !is_ignored(&path, &ignore) {
                files.push(path);
            }
            continue;
        }

        match glob(pattern) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    if entry.is_file() && !is_ignored(&entry, &ignore) {
                        files.push(entry);
                    }
                }
            }
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid glob pattern");
            }
        }
    }

    files.sort();
    files.dedup();
    files
}

fn is_ignored(path: &Path, ignore: &[glob::Pattern]) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy());
    ignore.iter().any(|pattern| {
        pattern.matches_path(path) || name.as_deref().is_some_and(|n| pattern.matches(n))
    })
}

/// Tails one file with `tail -f` semantics: only content appended after the
/// source starts is read.
pub struct FileSource {
    path: PathBuf,
    ids: Arc<dyn IdGenerator>,
    fs: Arc<dyn FileSystem>,
    watchers: Arc<dyn WatcherFactory>,
}

impl FileSource {
    pub fn new(
        path: impl Into<PathBuf>,
        ids: Arc<dyn IdGenerator>,
        fs: Arc<dyn FileSystem>,
        watchers: Arc<dyn WatcherFactory>,
    ) -> Self {
        Self {
            path: path.into(),
            ids,
            fs,
            watchers,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run(self, ctx: SourceContext) {
        let mut file = match self.fs.open(&self.path).await {
            Ok(file) => file,
            Err(source) => {
                warn!(path = %self.path.display(), error = %source, "Failed to open file");
                ctx.report(IngestionError::FileOpen {
                    path: self.path.clone(),
                    source,
                })
                .await;
                return;
            }
        };

        let position = match file.seek(SeekFrom::End(0)).await {
            Ok(position) => position,
            Err(source) => {
                drop(file);
                warn!(path = %self.path.display(), error = %source, "Failed to seek file");
                ctx.report(IngestionError::FileSeek {
                    path: self.path.clone(),
                    source,
                })
                .await;
                return;
            }
        };
        let mut reader = BufReader::new(file);

        let mut watcher = match self.watchers.create() {
            Ok(watcher) => watcher,
            Err(e) => {
                drop(reader);
                ctx.report(IngestionError::WatcherCreate(e.to_string())).await;
                return;
            }
        };

        if let Err(e) = watcher.watch(&self.path) {
            drop(watcher);
            drop(reader);
            ctx.report(IngestionError::Watch {
                path: self.path.clone(),
                message: e.to_string(),
            })
            .await;
            return;
        }

        info!(path = %self.path.display(), position, "Watching file");

        self.watch_loop(&ctx, watcher.as_mut(), &mut reader).await;

        drop(watcher);
        drop(reader);
        debug!(path = %self.path.display(), "File source closed");
    }

    async fn watch_loop(
        &self,
        ctx: &SourceContext,
        watcher: &mut dyn FileWatcher,
        reader: &mut BufReader<Box<dyn FileHandle>>,
    ) {
        // Bytes of a line whose terminator has not been written yet
        let mut pending = Vec::new();
        let (changes, errors) = watcher.channels();

        loop {
            tokio::select! {
                biased;
                _ = ctx.token().cancelled() => {
                    debug!(path = %self.path.display(), "File source cancelled");
                    return;
                }
                change = changes.recv() => match change {
                    Some(change) if change.kind == ChangeKind::Write => {
                        if !self.read_appended(ctx, reader, &mut pending).await {
                            return;
                        }
                    }
                    Some(change) => {
                        debug!(kind = ?change.kind, "Ignoring file event");
                    }
                    None => break,
                },
                fault = errors.recv() => match fault {
                    Some(None) => continue,
                    Some(Some(e)) => {
                        warn!(path = %self.path.display(), error = %e, "File watch error");
                        ctx.report(IngestionError::WatcherFault {
                            path: self.path.clone(),
                            message: e.to_string(),
                        })
                        .await;
                        return;
                    }
                    None => break,
                },
            }
        }

        // The watcher went away: whatever is left is the end of the stream
        if let Some(line) = take_line(&mut pending) {
            ctx.emit_line(SourceKind::File, &line, self.ids.as_ref()).await;
        }
    }

    /// Read every complete line appended since the last call.
    ///
    /// Returns `false` once the source has to stop.
    async fn read_appended(
        &self,
        ctx: &SourceContext,
        reader: &mut BufReader<Box<dyn FileHandle>>,
        pending: &mut Vec<u8>,
    ) -> bool {
        let mut lines_read = 0;

        loop {
            let read = tokio::select! {
                biased;
                _ = ctx.token().cancelled() => return false,
                read = reader.read_until(b'\n', pending) => read,
            };

            match read {
                Ok(0) => break,
                Ok(_) if pending.last() != Some(&b'\n') => break,
                Ok(_) => {
                    let Some(line) = take_line(pending) else {
                        continue;
                    };
                    if !ctx.emit_line(SourceKind::File, &line, self.ids.as_ref()).await {
                        return false;
                    }
                    lines_read += 1;
                }
                Err(source) => {
                    warn!(path = %self.path.display(), error = %source, "Failed to read from file");
                    ctx.report(IngestionError::FileRead {
                        path: self.path.clone(),
                        source,
                    })
                    .await;
                    return false;
                }
            }
        }

        if lines_read > 0 {
            debug!(path = %self.path.display(), lines = lines_read, "Read lines from file");
        }
        true
    }
}

/// Drain `pending` into a line without its terminator; `None` if it is blank
pub(crate) fn take_line(pending: &mut Vec<u8>) -> Option<String> {
    let mut bytes = std::mem::take(pending);
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
    }
    if bytes.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

impl Source for FileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }

    fn start(self: Box<Self>, ctx: SourceContext, guard: ShutdownGuard) {
        tokio::spawn(async move {
            let _guard = guard;
            self.run(ctx).await;
        });
    }
}
