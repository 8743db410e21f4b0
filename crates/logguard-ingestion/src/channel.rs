//! Shared fan-in channels.
//!
//! All sources write into one bounded event channel and one error channel.
//! Every send is raced against the root cancellation token, so a full channel
//! can never keep a source alive past shutdown.

use logguard_core::{IdGenerator, IngestionError, LogEvent, Severity, SourceKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Default capacity of the shared event channel
pub const DEFAULT_CHANNEL_SIZE: usize = 100;

/// Default capacity of the shared error channel
pub const DEFAULT_ERROR_CHANNEL_SIZE: usize = 10;

/// Create the bounded event channel
pub fn create_event_channel(
    buffer_size: usize,
) -> (mpsc::Sender<LogEvent>, mpsc::Receiver<LogEvent>) {
    mpsc::channel(buffer_size)
}

/// Create the error channel
pub fn create_error_channel(
    buffer_size: usize,
) -> (mpsc::Sender<IngestionError>, mpsc::Receiver<IngestionError>) {
    mpsc::channel(buffer_size)
}

/// Everything a running source needs to talk to the orchestrator
#[derive(Debug, Clone)]
pub struct SourceContext {
    token: CancellationToken,
    events: mpsc::Sender<LogEvent>,
    errors: mpsc::Sender<IngestionError>,
}

impl SourceContext {
    pub fn new(
        token: CancellationToken,
        events: mpsc::Sender<LogEvent>,
        errors: mpsc::Sender<IngestionError>,
    ) -> Self {
        Self {
            token,
            events,
            errors,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Offer an event downstream.
    ///
    /// Returns `false` when the source should stop: the token was cancelled
    /// or the receiving side is gone.
    pub async fn emit(&self, event: LogEvent) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            sent = self.events.send(event) => sent.is_ok(),
        }
    }

    /// Turn one ingested line into an INFO event and offer it downstream.
    ///
    /// A line whose event cannot be built (id generation failure) is reported
    /// and skipped; the source keeps running.
    pub async fn emit_line(&self, source: SourceKind, line: &str, ids: &dyn IdGenerator) -> bool {
        match LogEvent::new(source, line, Severity::Info, None, ids) {
            Ok(event) => self.emit(event).await,
            Err(e) => {
                warn!(source = %source, error = %e, "Dropping line, failed to build event");
                self.report(IngestionError::Event(e)).await;
                !self.is_cancelled()
            }
        }
    }

    /// Offer an error downstream, giving up on cancellation
    pub async fn report(&self, error: IngestionError) {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {}
            _ = self.errors.send(error) => {}
        }
    }
}
