use async_trait::async_trait;
use logguard_core::{IngestionError, LogEvent, OutputError};
use logguard_ingestion::EventSink;
use std::str::FromStr;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Output format for stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed, human-readable format
    #[default]
    Pretty,
    /// Compact JSON (one line per event)
    Json,
    /// Message only (the original log line)
    Raw,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "raw" => Ok(Self::Raw),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Writes log events to stdout, or any writer standing in for it
pub struct StdoutWriter {
    format: OutputFormat,
    out: Box<dyn AsyncWrite + Unpin + Send>,
    written: u64,
    errors_seen: usize,
}

impl StdoutWriter {
    /// Create a new stdout writer with default format
    pub fn new() -> Self {
        Self::with_format(OutputFormat::default())
    }

    /// Create a new stdout writer with a specific format
    pub fn with_format(format: OutputFormat) -> Self {
        Self::with_writer(format, tokio::io::stdout())
    }

    pub fn with_writer(
        format: OutputFormat,
        out: impl AsyncWrite + Unpin + Send + 'static,
    ) -> Self {
        Self {
            format,
            out: Box::new(out),
            written: 0,
            errors_seen: 0,
        }
    }

    /// Write a single event followed by a newline
    pub async fn write(&mut self, event: &LogEvent) -> Result<(), OutputError> {
        let mut output = self.format_event(event)?;
        output.push('\n');

        self.out
            .write_all(output.as_bytes())
            .await
            .map_err(OutputError::Stdout)?;
        self.out.flush().await.map_err(OutputError::Stdout)?;

        self.written += 1;
        Ok(())
    }

    /// Number of events written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Number of ingestion errors received so far
    pub fn error_count(&self) -> usize {
        self.errors_seen
    }

    fn format_event(&self, event: &LogEvent) -> Result<String, OutputError> {
        match self.format {
            OutputFormat::Pretty => Ok(format_pretty(event)),
            OutputFormat::Json => {
                let bytes = event.to_json()?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            OutputFormat::Raw => Ok(event.message().to_string()),
        }
    }
}

impl Default for StdoutWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn format_pretty(event: &LogEvent) -> String {
    let mut parts = vec![
        format!("[{}]", event.timestamp().format("%Y-%m-%d %H:%M:%S%.3f")),
        format!("[{}]", event.source()),
        format!("[{}]", event.severity()),
    ];

    if let Some(metadata) = event.metadata_map() {
        let mut pairs: Vec<String> = metadata.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        parts.push(format!("[{}]", pairs.join(" ")));
    }

    parts.push(event.message().to_string());
    parts.join(" ")
}

#[async_trait]
impl EventSink for StdoutWriter {
    async fn on_event(&mut self, event: LogEvent) {
        if let Err(e) = self.write(&event).await {
            warn!(id = %event.id(), error = %e, "Failed to write event");
        }
    }

    async fn on_error(&mut self, error: IngestionError) {
        self.errors_seen += 1;
        warn!(error = %error, "Ingestion error");
        debug!(errors = self.errors_seen, "Ingestion errors so far");
    }
}
