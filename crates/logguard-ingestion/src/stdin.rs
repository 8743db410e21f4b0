use crate::channel::SourceContext;
use crate::file::take_line;
use crate::shutdown::ShutdownGuard;
use crate::Source;
use logguard_core::{IdGenerator, IngestionError, SourceKind};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

/// Reads log lines from the process stdin, or any reader standing in for it
pub struct StdinSource {
    reader: Box<dyn AsyncRead + Unpin + Send>,
    ids: Arc<dyn IdGenerator>,
}

impl StdinSource {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self::with_reader(tokio::io::stdin(), ids)
    }

    pub fn with_reader(
        reader: impl AsyncRead + Unpin + Send + 'static,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            ids,
        }
    }

    /// Read until EOF, a read failure or cancellation.
    ///
    /// Lines are split on raw bytes and decoded lossily, so a line that is
    /// not valid UTF-8 does not end ingestion.
    ///
    /// Returns the number of lines sent downstream.
    async fn run(self, ctx: SourceContext) -> usize {
        let mut reader = BufReader::new(self.reader);
        let mut buf = Vec::new();
        let mut count = 0;

        info!("Starting stdin ingestion");

        loop {
            // `read_until` keeps partial input in `buf` if the select drops it
            let read = tokio::select! {
                biased;
                _ = ctx.token().cancelled() => {
                    debug!(lines_read = count, "Stdin source cancelled");
                    break;
                }
                read = reader.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    info!(lines_read = count, "Stdin EOF reached");
                    break;
                }
                Ok(_) => {
                    let Some(line) = take_line(&mut buf) else {
                        continue;
                    };
                    if !ctx.emit_line(SourceKind::Stdin, &line, self.ids.as_ref()).await {
                        break;
                    }
                    count += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Error reading from stdin");
                    ctx.report(IngestionError::StdinRead(e)).await;
                    break;
                }
            }
        }

        count
    }
}

impl Source for StdinSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Stdin
    }

    fn describe(&self) -> String {
        "stdin".to_string()
    }

    fn start(self: Box<Self>, ctx: SourceContext, guard: ShutdownGuard) {
        tokio::spawn(async move {
            let _guard = guard;
            self.run(ctx).await;
        });
    }
}
