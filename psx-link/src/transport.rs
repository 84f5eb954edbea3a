//! Short-lived TCP sessions to a PSX host.
//!
//! PSX pushes variable updates whenever they change and has no notion of a
//! reply to a particular line. A [`Transport`] therefore fakes request/response:
//! it connects, writes the lines, collects whatever arrives during a short
//! grace period and closes the socket again.

use std::{
    fmt::Display,
    time::Duration,
};

use bytes::BytesMut;
use tokio::{
    io::{
        AsyncReadExt,
        AsyncWriteExt,
    },
    net::TcpStream,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::codec::WireLine;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 10747;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(4);

/// How long to wait for replies after the last line was written.
///
/// This is an empirical value. Longer waits catch more late replies, shorter
/// waits make the UI snappier.
pub const DEFAULT_GRACE: Duration = Duration::from_millis(150);

/// size of the read buffer: 4 KiB, PSX replies to a demand are a single line
const READ_BUFFER_SIZE: usize = 0x1000;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("PSX at {endpoint} is unreachable: {source}")]
    Unreachable {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },
    #[error("Timeout connecting to PSX at {endpoint}")]
    Timeout { endpoint: Endpoint },
    #[error("Writing to PSX at {endpoint} failed: {source}")]
    WriteFailed {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },
    #[error("Session to PSX at {endpoint} was cancelled")]
    Cancelled { endpoint: Endpoint },
}

/// Something that can deliver Q-lines to PSX and hand back the raw reply text.
///
/// [`Transport`] is the real implementation. The seam exists so the resolver,
/// the pushback sequencer and the poller can run against a recording fake.
pub trait LineSink: Send + Sync {
    fn send_lines(
        &self,
        lines: &[WireLine],
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

impl<T: LineSink + ?Sized> LineSink for &T {
    fn send_lines(
        &self,
        lines: &[WireLine],
    ) -> impl Future<Output = Result<String, TransportError>> + Send {
        T::send_lines(*self, lines)
    }
}

/// Connection parameters for PSX sessions.
///
/// Cheap to clone, every call opens its own connection.
#[derive(Clone, Debug)]
pub struct Transport {
    endpoint: Endpoint,
    connect_timeout: Duration,
    grace: Duration,
    shutdown: CancellationToken,
}

impl Transport {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            grace: DEFAULT_GRACE,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Sessions observe this token at every suspension point.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Same settings, different host.
    pub fn with_endpoint(&self, endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..self.clone()
        }
    }

    /// Writes all `lines` in order over one connection and returns everything
    /// received until the grace period ran out.
    ///
    /// Replies of several lines are concatenated in arrival order.
    pub async fn send_lines(&self, lines: &[WireLine]) -> Result<String, TransportError> {
        let session = Session::new(self, self.shutdown.child_token());
        session.run(lines).await
    }

    /// Connects and disconnects without exchanging data.
    pub async fn ping(&self) -> Result<(), TransportError> {
        let session = Session::new(self, self.shutdown.child_token());
        let tcp = session.connect().await?;
        drop(tcp);
        Ok(())
    }
}

impl LineSink for Transport {
    async fn send_lines(&self, lines: &[WireLine]) -> Result<String, TransportError> {
        Transport::send_lines(self, lines).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    Connecting,
    Writing,
    Draining,
    Closed,
}

/// One connection's worth of work.
#[derive(Debug)]
struct Session<'a> {
    transport: &'a Transport,
    state: SessionState,
    cancel: CancellationToken,
}

impl<'a> Session<'a> {
    fn new(transport: &'a Transport, cancel: CancellationToken) -> Self {
        Self {
            transport,
            state: SessionState::Connecting,
            cancel,
        }
    }

    fn transition(&mut self, state: SessionState) {
        tracing::debug!(endpoint = %self.transport.endpoint, from = ?self.state, to = ?state, "psx session");
        self.state = state;
    }

    async fn run(mut self, lines: &[WireLine]) -> Result<String, TransportError> {
        let mut tcp = self.connect().await?;

        self.transition(SessionState::Writing);
        if let Err(source) = write_lines(&mut tcp, lines).await {
            self.transition(SessionState::Closed);
            return Err(TransportError::WriteFailed {
                endpoint: self.transport.endpoint.clone(),
                source,
            });
        }

        self.transition(SessionState::Draining);
        let received = self.drain(&mut tcp).await;
        tracing::debug!(endpoint = %self.transport.endpoint, num_lines = lines.len(), num_bytes_received = received.len());

        // best effort, PSX doesn't care
        let _ = tcp.shutdown().await;
        self.transition(SessionState::Closed);

        Ok(String::from_utf8_lossy(&received).into_owned())
    }

    async fn connect(&self) -> Result<TcpStream, TransportError> {
        let endpoint = &self.transport.endpoint;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(TransportError::Cancelled { endpoint: endpoint.clone() })
            }
            result = tokio::time::timeout(
                self.transport.connect_timeout,
                TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
            ) => {
                match result {
                    Ok(Ok(tcp)) => {
                        // lines are tiny, don't let nagle hold them back
                        let _ = tcp.set_nodelay(true);
                        Ok(tcp)
                    }
                    Ok(Err(source)) => {
                        Err(TransportError::Unreachable {
                            endpoint: endpoint.clone(),
                            source,
                        })
                    }
                    Err(_) => Err(TransportError::Timeout { endpoint: endpoint.clone() }),
                }
            }
        }
    }

    /// Reads until the grace period is over, the peer closes, or the session
    /// is cancelled. Read errors end the drain, they don't fail the session:
    /// the lines were already delivered.
    async fn drain(&self, tcp: &mut TcpStream) -> BytesMut {
        let deadline = Instant::now() + self.transport.grace;
        let mut received = BytesMut::with_capacity(READ_BUFFER_SIZE);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep_until(deadline) => break,
                result = tcp.read_buf(&mut received) => {
                    match result {
                        Ok(0) => break,
                        Ok(_) => {}
                        Err(error) => {
                            tracing::debug!(?error, "read error while draining psx session");
                            break;
                        }
                    }
                }
            }
        }

        received
    }
}

async fn write_lines(tcp: &mut TcpStream, lines: &[WireLine]) -> Result<(), std::io::Error> {
    for line in lines {
        tcp.write_all(line.as_bytes()).await?;
    }
    tcp.flush().await?;
    Ok(())
}
