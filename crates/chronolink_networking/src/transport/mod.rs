//! # Transport Layer
//!
//! Line-delimited message transports behind one trait.
//!
//! ## Design
//!
//! - Every message is one line of envelope text, newline terminated
//! - Transports never block: `poll` drains what has arrived and returns
//! - A [`Connector`] produces a fresh [`Transport`] per dial, so each
//!   reconnect is a new connection value rather than a reused socket

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use thiserror::Error;

/// Transport failures.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Dialing the remote side failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The connection is no longer open.
    #[error("connection closed")]
    Closed,

    /// An underlying socket operation failed.
    #[error("transport i/o: {0}")]
    Io(#[from] io::Error),
}

/// Something a transport observed since the last poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established and ready to carry messages.
    Connected,
    /// One complete inbound message line.
    Message(String),
    /// The remote side went away cleanly.
    Disconnected,
    /// The connection failed; no further events will follow.
    Error(String),
}

/// One bidirectional message pipe.
pub trait Transport: Send {
    /// Sends one message line.
    fn send(&mut self, line: &str) -> Result<(), TransportError>;

    /// Returns the next pending event, if any. Never blocks.
    fn poll(&mut self) -> Option<TransportEvent>;

    /// Closes the connection. Further sends fail with [`TransportError::Closed`].
    fn close(&mut self);
}

/// Produces a fresh connection per dial.
pub trait Connector: Send {
    /// Dials the remote side.
    fn connect(&mut self) -> Result<Box<dyn Transport>, TransportError>;
}

// ---------------------------------------------------------------------------
// In-memory channel transport
// ---------------------------------------------------------------------------

/// In-process transport over crossbeam channels.
///
/// Used by tests and by embedders hosting client and authority in one
/// process. Either end closing the pair closes both.
#[derive(Debug)]
pub struct ChannelTransport {
    outgoing: Sender<String>,
    incoming: Receiver<String>,
    open: Arc<AtomicBool>,
    announced: bool,
    finished: bool,
}

impl ChannelTransport {
    /// Creates two connected endpoints.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = crossbeam_channel::unbounded();
        let (b_tx, b_rx) = crossbeam_channel::unbounded();
        let open = Arc::new(AtomicBool::new(true));
        let left = Self {
            outgoing: a_tx,
            incoming: b_rx,
            open: Arc::clone(&open),
            announced: false,
            finished: false,
        };
        let right = Self {
            outgoing: b_tx,
            incoming: a_rx,
            open,
            announced: false,
            finished: false,
        };
        (left, right)
    }

    fn closed_event(&mut self) -> Option<TransportEvent> {
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(TransportEvent::Disconnected)
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, line: &str) -> Result<(), TransportError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.outgoing
            .send(line.to_string())
            .map_err(|_| TransportError::Closed)
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        // Connected always comes first, even when messages queued up before
        // the first poll. Matches the TCP transport's ordering.
        if !self.announced {
            self.announced = true;
            return Some(TransportEvent::Connected);
        }
        // Drain queued messages even after close, then report the close once.
        match self.incoming.try_recv() {
            Ok(line) => Some(TransportEvent::Message(line)),
            Err(TryRecvError::Empty) => {
                if self.open.load(Ordering::Acquire) {
                    None
                } else {
                    self.closed_event()
                }
            }
            Err(TryRecvError::Disconnected) => self.closed_event(),
        }
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}

/// Connector handing one end of a fresh [`ChannelTransport`] pair per dial.
#[derive(Debug)]
pub struct ChannelConnector {
    accepted: Sender<ChannelTransport>,
}

/// Creates a connector plus the stream of server-side endpoints it produces.
///
/// Every [`Connector::connect`] call yields a new pair; the far end arrives
/// on the returned receiver for the authority to accept.
#[must_use]
pub fn channel_link() -> (ChannelConnector, Receiver<ChannelTransport>) {
    let (accepted, endpoints) = crossbeam_channel::unbounded();
    (ChannelConnector { accepted }, endpoints)
}

impl Connector for ChannelConnector {
    fn connect(&mut self) -> Result<Box<dyn Transport>, TransportError> {
        let (near, far) = ChannelTransport::pair();
        self.accepted
            .send(far)
            .map_err(|_| TransportError::Connect("no listener".to_string()))?;
        Ok(Box::new(near))
    }
}

// ---------------------------------------------------------------------------
// TCP transport
// ---------------------------------------------------------------------------

/// TCP transport carrying newline-delimited envelope text.
///
/// A thin wrapper around std TCP with:
/// - Non-blocking mode
/// - Nagle disabled, messages are small and latency-sensitive
/// - Line reassembly across reads
pub struct TcpTransport {
    stream: TcpStream,
    read_buffer: Vec<u8>,
    pending: VecDeque<String>,
    announced: bool,
    closed: bool,
}

impl TcpTransport {
    /// Wraps an accepted or freshly dialed stream.
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            read_buffer: Vec::with_capacity(4096),
            pending: VecDeque::new(),
            announced: false,
            closed: false,
        })
    }

    /// The peer's address.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    fn drain_socket(&mut self) -> Option<TransportEvent> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.closed = true;
                    self.split_lines();
                    return Some(TransportEvent::Disconnected);
                }
                Ok(n) => {
                    self.read_buffer.extend_from_slice(&chunk[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.split_lines();
                    return None;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.closed = true;
                    return Some(TransportEvent::Error(e.to_string()));
                }
            }
        }
    }

    fn split_lines(&mut self) {
        while let Some(pos) = self.read_buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.read_buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            self.pending.push_back(text.trim_end_matches('\r').to_string());
        }
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, line: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\n")?;
        Ok(())
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        if !self.announced {
            self.announced = true;
            return Some(TransportEvent::Connected);
        }
        if let Some(line) = self.pending.pop_front() {
            return Some(TransportEvent::Message(line));
        }
        if self.closed {
            return None;
        }
        let ended = self.drain_socket();
        if let Some(line) = self.pending.pop_front() {
            return Some(TransportEvent::Message(line));
        }
        ended
    }

    fn close(&mut self) {
        self.closed = true;
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

/// Connector dialing a TCP authority.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    addr: SocketAddr,
}

impl TcpConnector {
    /// Creates a connector for the given authority address.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

impl Connector for TcpConnector {
    fn connect(&mut self) -> Result<Box<dyn Transport>, TransportError> {
        let stream = TcpStream::connect(self.addr)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Box::new(TcpTransport::from_stream(stream)?))
    }
}

/// Non-blocking TCP listener producing [`TcpTransport`] peers.
pub struct TcpAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpAcceptor {
    /// Binds to the given address.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The bound address, useful after binding port zero.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts one pending connection, if any. Never blocks.
    pub fn accept(&mut self) -> Option<TcpTransport> {
        match self.listener.accept() {
            Ok((stream, _)) => match TcpTransport::from_stream(stream) {
                Ok(transport) => Some(transport),
                Err(e) => {
                    tracing::warn!("accepted stream setup failed: {e}");
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) => {
                tracing::warn!("accept failed: {e}");
                None
            }
        }
    }
}
