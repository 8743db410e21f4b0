//! Unix domain socket source.
//!
//! In dial mode the source connects to an existing listener and reads one
//! stream. In listen mode it binds the address itself and reads every
//! accepted client concurrently, up to `max_connections`.

use crate::channel::SourceContext;
use crate::shutdown::ShutdownGuard;
use crate::Source;
use async_trait::async_trait;
use logguard_core::config::{SocketMode, UnixSocketConfig};
use logguard_core::{IdGenerator, IngestionError, SourceKind};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Semaphore;
use tokio::time;
use tracing::{debug, info, warn};

const INITIAL_BUF_SIZE: usize = 4096;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A readable byte stream from a socket peer
pub trait Connection: AsyncRead + Unpin + Send {}

impl<T: AsyncRead + Unpin + Send> Connection for T {}

/// Opens client connections to a socket address
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, address: &str, timeout: Duration) -> io::Result<Box<dyn Connection>>;
}

/// Dials unix domain sockets through `tokio::net::UnixStream`
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixDialer;

#[async_trait]
impl Dialer for UnixDialer {
    async fn dial(&self, address: &str, timeout: Duration) -> io::Result<Box<dyn Connection>> {
        let stream = time::timeout(timeout, UnixStream::connect(address))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {timeout:?}"),
                )
            })??;
        Ok(Box::new(stream))
    }
}

/// Removes the socket file of a bound listener when dropped
#[derive(Debug)]
struct SocketFileGuard {
    path: PathBuf,
}

impl Drop for SocketFileGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove socket file");
            }
        }
    }
}

/// Per-connection line reader; cheap to clone into connection tasks
#[derive(Clone)]
struct LineReader {
    address: String,
    ids: Arc<dyn IdGenerator>,
    read_deadline: Duration,
    max_message_size: usize,
}

impl LineReader {
    /// Read newline-terminated messages until end-of-stream, a read error,
    /// an oversized message or cancellation.
    async fn run(&self, ctx: &SourceContext, connection: Box<dyn Connection>) -> usize {
        let mut reader = BufReader::with_capacity(INITIAL_BUF_SIZE, connection);
        let mut buf = Vec::with_capacity(INITIAL_BUF_SIZE);
        let mut count = 0;

        loop {
            // Partially read bytes stay in `buf` when the deadline elapses
            let next_line = reader.read_until(b'\n', &mut buf);
            let read = tokio::select! {
                biased;
                _ = ctx.token().cancelled() => break,
                read = time::timeout(self.read_deadline, next_line) => read,
            };

            let n = match read {
                Err(_) => continue,
                Ok(Err(source)) => {
                    warn!(address = %self.address, error = %source, "Socket read error");
                    ctx.report(IngestionError::SocketRead {
                        address: self.address.clone(),
                        source,
                    })
                    .await;
                    break;
                }
                Ok(Ok(n)) => n,
            };

            if n == 0 || buf.last() != Some(&b'\n') {
                debug!(address = %self.address, lines = count, "Socket stream ended");
                break;
            }

            let raw = std::mem::take(&mut buf);
            let trimmed = raw.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }

            // Size is measured on the wire bytes, before lossy decoding
            if trimmed.len() > self.max_message_size {
                warn!(
                    address = %self.address,
                    size = trimmed.len(),
                    max = self.max_message_size,
                    "Dropping oversized message"
                );
                ctx.report(IngestionError::MessageTooLarge {
                    size: trimmed.len(),
                    max: self.max_message_size,
                })
                .await;
                break;
            }

            let line = String::from_utf8_lossy(trimmed);
            if !ctx.emit_line(SourceKind::UnixSocket, &line, self.ids.as_ref()).await {
                break;
            }
            count += 1;
        }

        count
    }
}

/// Unix socket source for log ingestion
pub struct UnixSocketSource {
    config: UnixSocketConfig,
    dialer: Arc<dyn Dialer>,
    reader: LineReader,
}

impl UnixSocketSource {
    pub fn new(
        config: UnixSocketConfig,
        ids: Arc<dyn IdGenerator>,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        let reader = LineReader {
            address: config.address.clone(),
            ids,
            read_deadline: config.read_deadline(),
            max_message_size: config.max_message_size,
        };
        Self {
            config,
            dialer,
            reader,
        }
    }

    pub fn address(&self) -> &str {
        &self.config.address
    }

    pub fn mode(&self) -> SocketMode {
        self.config.mode
    }

    async fn dial(self, ctx: SourceContext) {
        let address = &self.config.address;

        let dialed = tokio::select! {
            biased;
            _ = ctx.token().cancelled() => return,
            dialed = self.dialer.dial(address, self.config.timeout()) => dialed,
        };

        let connection = match dialed {
            Ok(connection) => connection,
            Err(source) => {
                warn!(address = %address, error = %source, "Failed to dial socket");
                ctx.report(IngestionError::Dial {
                    address: address.clone(),
                    source,
                })
                .await;
                return;
            }
        };

        info!(address = %address, "Connected to unix socket");
        let lines = self.reader.run(&ctx, connection).await;
        debug!(address = %address, lines, "Unix socket connection closed");
    }

    async fn listen(self, ctx: SourceContext, guard: &ShutdownGuard) {
        let address = self.config.address.clone();

        let listener = match UnixListener::bind(&address) {
            Ok(listener) => listener,
            Err(source) => {
                warn!(address = %address, error = %source, "Failed to bind socket");
                ctx.report(IngestionError::Listen { address, source }).await;
                return;
            }
        };
        let socket_file = SocketFileGuard {
            path: PathBuf::from(&address),
        };

        info!(
            address = %address,
            max_connections = self.config.max_connections,
            "Unix socket listener started"
        );

        let permits = Arc::new(Semaphore::new(self.config.max_connections));

        loop {
            let accepted = tokio::select! {
                biased;
                _ = ctx.token().cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            let stream = match accepted {
                Ok((stream, _)) => stream,
                Err(source) => {
                    if accept_failed(&ctx, &address, source).await {
                        continue;
                    }
                    break;
                }
            };

            let Ok(permit) = permits.clone().try_acquire_owned() else {
                warn!(
                    address = %address,
                    max = self.config.max_connections,
                    "Max connections reached, rejecting"
                );
                drop(stream);
                continue;
            };

            let connection_guard = guard.fork();
            let reader = self.reader.clone();
            let ctx = ctx.clone();
            debug!(
                address = %address,
                active = self.config.max_connections - permits.available_permits(),
                "New unix socket connection"
            );

            tokio::spawn(async move {
                let _guard = connection_guard;
                let _permit = permit;
                let lines = reader.run(&ctx, Box::new(stream)).await;
                debug!(address = %reader.address, lines, "Unix socket client disconnected");
            });
        }

        drop(listener);
        drop(socket_file);
        debug!(address = %address, "Unix socket listener closed");
    }
}

/// Report a failed accept and pause before the next one.
///
/// Returns `false` when cancelled during the pause.
async fn accept_failed(ctx: &SourceContext, address: &str, source: io::Error) -> bool {
    warn!(address = %address, error = %source, "Failed to accept connection");
    ctx.report(IngestionError::Accept {
        address: address.to_string(),
        source,
    })
    .await;

    tokio::select! {
        biased;
        _ = ctx.token().cancelled() => false,
        _ = time::sleep(ACCEPT_BACKOFF) => true,
    }
}

impl Source for UnixSocketSource {
    fn kind(&self) -> SourceKind {
        SourceKind::UnixSocket
    }

    fn describe(&self) -> String {
        format!("unix://{}", self.config.address)
    }

    fn start(self: Box<Self>, ctx: SourceContext, guard: ShutdownGuard) {
        let mode = self.config.mode;
        tokio::spawn(async move {
            match mode {
                SocketMode::Dial => self.dial(ctx).await,
                SocketMode::Listen => self.listen(ctx, &guard).await,
            }
            drop(guard);
        });
    }
}
