use crate::channel::{create_error_channel, create_event_channel, SourceContext};
use crate::file::{expand_paths, FileSource};
use crate::fs::{FileSystem, NotifyWatcherFactory, OsFileSystem, WatcherFactory};
use crate::shutdown::ShutdownCoordinator;
use crate::signals::wait_for_shutdown_signal;
use crate::stdin::StdinSource;
use crate::unix::{Dialer, UnixDialer, UnixSocketSource};
use crate::Source;
use async_trait::async_trait;
use logguard_core::{Config, IdGenerator, IngestionError, LogEvent, UuidGenerator};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives everything the orchestrator drains from the shared channels
#[async_trait]
pub trait EventSink: Send {
    async fn on_event(&mut self, event: LogEvent);

    async fn on_error(&mut self, error: IngestionError);
}

/// Sink that keeps every event and error in memory
#[derive(Debug, Default)]
pub struct Collector {
    pub events: Vec<LogEvent>,
    pub errors: Vec<IngestionError>,
}

#[async_trait]
impl EventSink for Collector {
    async fn on_event(&mut self, event: LogEvent) {
        self.events.push(event);
    }

    async fn on_error(&mut self, error: IngestionError) {
        self.errors.push(error);
    }
}

/// Cancels or shuts down a running orchestrator from another task
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    token: CancellationToken,
    coordinator: ShutdownCoordinator,
}

impl OrchestratorHandle {
    /// Request shutdown without waiting for it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel every source and wait until all of them released their resources
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.coordinator.wait().await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once shutdown has been requested
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Sources (and accepted connections) still running
    pub fn active_sources(&self) -> usize {
        self.coordinator.active()
    }
}

/// Starts the configured sources and drains their shared channels
pub struct Orchestrator {
    config: Config,
    ids: Arc<dyn IdGenerator>,
    stdin_reader: Option<Box<dyn AsyncRead + Unpin + Send>>,
    fs: Arc<dyn FileSystem>,
    watchers: Arc<dyn WatcherFactory>,
    dialer: Arc<dyn Dialer>,
    extra_sources: Vec<Box<dyn Source>>,
    handle_signals: bool,
    token: CancellationToken,
    coordinator: ShutdownCoordinator,
    senders: Option<(mpsc::Sender<LogEvent>, mpsc::Sender<IngestionError>)>,
    events: mpsc::Receiver<LogEvent>,
    errors: mpsc::Receiver<IngestionError>,
    collected: Collector,
    started: bool,
}

impl Orchestrator {
    /// Create an orchestrator over the real OS capabilities
    pub fn new(config: Config) -> Self {
        let (event_tx, events) = create_event_channel(config.general.buffer_size.max(1));
        let (error_tx, errors) = create_error_channel(config.general.error_buffer_size.max(1));

        Self {
            config,
            ids: Arc::new(UuidGenerator::new()),
            stdin_reader: None,
            fs: Arc::new(OsFileSystem),
            watchers: Arc::new(NotifyWatcherFactory),
            dialer: Arc::new(UnixDialer),
            extra_sources: Vec::new(),
            handle_signals: true,
            token: CancellationToken::new(),
            coordinator: ShutdownCoordinator::new(),
            senders: Some((event_tx, error_tx)),
            events,
            errors,
            collected: Collector::default(),
            started: false,
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Read "stdin" from `reader` instead of the process stdin
    pub fn with_stdin_reader(mut self, reader: impl AsyncRead + Unpin + Send + 'static) -> Self {
        self.stdin_reader = Some(Box::new(reader));
        self
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_watcher_factory(mut self, watchers: Arc<dyn WatcherFactory>) -> Self {
        self.watchers = watchers;
        self
    }

    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Run an additional source next to the configured ones
    pub fn with_source(mut self, source: Box<dyn Source>) -> Self {
        self.extra_sources.push(source);
        self
    }

    /// Whether SIGINT/SIGTERM end the central loop (on by default)
    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            token: self.token.clone(),
            coordinator: self.coordinator.clone(),
        }
    }

    /// Build one source per enabled configuration entry
    fn build_sources(&mut self) -> Vec<Box<dyn Source>> {
        let ingestion = &self.config.ingestion;
        let mut sources: Vec<Box<dyn Source>> = Vec::new();

        if ingestion.stdin.enabled {
            let source = match self.stdin_reader.take() {
                Some(reader) => StdinSource::with_reader(reader, self.ids.clone()),
                None => StdinSource::new(self.ids.clone()),
            };
            sources.push(Box::new(source));
        }

        if ingestion.file.enabled {
            let paths = expand_paths(&ingestion.file.paths, &ingestion.file.ignore);
            if paths.is_empty() {
                warn!(patterns = ?ingestion.file.paths, "No files matched the configured paths");
            }
            for path in paths {
                sources.push(Box::new(FileSource::new(
                    path,
                    self.ids.clone(),
                    self.fs.clone(),
                    self.watchers.clone(),
                )));
            }
        }

        if ingestion.unix.enabled {
            if ingestion.unix.sockets.is_empty() {
                warn!("Unix ingestion enabled but no sockets configured");
            }
            for socket in &ingestion.unix.sockets {
                sources.push(Box::new(UnixSocketSource::new(
                    socket.clone(),
                    self.ids.clone(),
                    self.dialer.clone(),
                )));
            }
        }

        sources.append(&mut self.extra_sources);
        sources
    }

    /// Start every source exactly once.
    ///
    /// Returns the number of sources started.
    fn start_sources(&mut self) -> usize {
        if self.started {
            return 0;
        }
        self.started = true;

        let Some((event_tx, error_tx)) = self.senders.take() else {
            return 0;
        };
        let ctx = SourceContext::new(self.token.clone(), event_tx, error_tx);

        let sources = self.build_sources();
        let count = sources.len();
        for source in sources {
            let guard = self.coordinator.register();
            info!(kind = %source.kind(), source = %source.describe(), "Starting source");
            source.start(ctx.clone(), guard);
        }

        // Only sources hold senders now: both channels close once all of them are done
        drop(ctx);
        count
    }

    /// Start the sources and forward their output to `sink` until
    /// cancellation, a termination signal or the end of every source; then
    /// shut down.
    pub async fn run(&mut self, sink: &mut dyn EventSink) {
        let count = self.start_sources();
        info!(
            instance = %self.config.general.instance_name,
            sources = count,
            "LogGuard is running"
        );

        let token = self.token.clone();
        let signal = wait_for_shutdown_signal();
        tokio::pin!(signal);
        let mut listen_for_signals = self.handle_signals;
        let mut events_open = true;
        let mut errors_open = true;

        while events_open || errors_open {
            tokio::select! {
                event = self.events.recv(), if events_open => match event {
                    Some(event) => sink.on_event(event).await,
                    None => events_open = false,
                },
                error = self.errors.recv(), if errors_open => match error {
                    Some(error) => {
                        debug!(error = %error, "Source reported an error");
                        sink.on_error(error).await;
                    }
                    None => errors_open = false,
                },
                _ = token.cancelled() => {
                    info!("Cancellation requested");
                    break;
                }
                received = &mut signal, if listen_for_signals => match received {
                    Ok(name) => {
                        info!(signal = name, "Received shutdown signal");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to install signal handlers");
                        listen_for_signals = false;
                    }
                },
            }
        }

        if !events_open && !errors_open {
            info!("All sources finished");
        }

        info!("LogGuard is shutting down");
        self.handle().shutdown().await;

        // Whatever was queued before the sources stopped still reaches the sink
        while let Ok(event) = self.events.try_recv() {
            sink.on_event(event).await;
        }
        while let Ok(error) = self.errors.try_recv() {
            sink.on_error(error).await;
        }
    }

    /// Run with the built-in [`Collector`]; see [`outputs`](Self::outputs)
    /// and [`errors`](Self::errors) afterwards
    pub async fn execute(&mut self) {
        let mut collector = std::mem::take(&mut self.collected);
        self.run(&mut collector).await;
        self.collected = collector;
    }

    /// Cancel every source and wait for all of them to finish. Safe to call
    /// any number of times.
    pub async fn shutdown(&self) {
        self.handle().shutdown().await;
    }

    /// Events collected by [`execute`](Self::execute)
    pub fn outputs(&self) -> &[LogEvent] {
        &self.collected.events
    }

    /// Errors collected by [`execute`](Self::execute)
    pub fn errors(&self) -> &[IngestionError] {
        &self.collected.errors
    }
}
