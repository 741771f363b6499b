use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, instrument, trace, warn};

use crate::codec;
use crate::graphics::Rgb;
use crate::{Error, Result};

/// Default controller port
pub const DEFAULT_PORT: u16 = 49152;

/// Outgoing frames buffered per strip; roughly one second at 22 fps
pub const QUEUE_CAPACITY: usize = 21;

/// How long a pop waits before the worker rechecks connection health
const QUEUE_POP_TIMEOUT: Duration = Duration::from_millis(100);

/// TCP connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Socket write timeout
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// First reconnect delay after a failure
const BACKOFF_FLOOR: Duration = Duration::from_millis(250);

/// Reconnect delay cap
const BACKOFF_CEILING: Duration = Duration::from_secs(5);

/// Configuration for one physical strip controller.
///
/// A strip covers the pixels `[offset, offset + length)` of its site's
/// buffer. Immutable for the life of the process.
#[derive(Debug, Clone)]
pub struct StripConfig {
    /// Controller hostname or address
    pub host: String,
    /// Controller TCP port
    pub port: u16,
    /// Display name for status output
    pub name: String,
    /// Number of pixels the strip drives
    pub length: usize,
    /// Which of the controller's output channels receive the data
    /// (bit i drives channel i)
    pub channel_mask: u16,
    /// First pixel of the site buffer this strip covers
    pub offset: usize,
    /// Whether the slice is reversed before encoding
    pub reversed: bool,
    /// Whether frames are DEFLATE-compressed on the wire
    pub compress: bool,
}

impl StripConfig {
    /// A forward, uncompressed strip on the default port driving all
    /// channels.
    pub fn new(host: impl Into<String>, name: impl Into<String>, offset: usize, length: usize) -> Self {
        StripConfig {
            host: host.into(),
            port: DEFAULT_PORT,
            name: name.into(),
            length,
            channel_mask: 0xFFFF,
            offset,
            reversed: false,
            compress: false,
        }
    }
}

/// Connection lifecycle of a strip's send worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No socket, not yet attempting one
    Disconnected = 0,
    /// A connect attempt is in flight
    Connecting = 1,
    /// Socket is up; frames flow
    Connected = 2,
    /// Last attempt or write failed; waiting out the backoff delay
    Backoff = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Backoff,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// One encoded frame awaiting transmission
struct OutgoingFrame {
    wire_bytes: Bytes,
}

/// Streams encoded frames to one strip controller, in order,
/// best-effort, with bounded memory.
///
/// The site render thread talks to the client only through
/// [`ready_for_data`](Self::ready_for_data) and
/// [`enqueue`](Self::enqueue); a dedicated worker thread owns the
/// socket and the connection state machine. A full queue or a downed
/// connection makes the render thread drop frames for this strip
/// rather than ever blocking.
pub struct StripClient {
    config: StripConfig,
    tx: Sender<OutgoingFrame>,
    rx: Receiver<OutgoingFrame>,
    state: AtomicU8,
    drops: AtomicU64,
    sent: AtomicU64,
}

impl StripClient {
    pub fn new(config: StripConfig) -> Arc<Self> {
        let (tx, rx) = bounded(QUEUE_CAPACITY);
        Arc::new(StripClient {
            config,
            tx,
            rx,
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            drops: AtomicU64::new(0),
            sent: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &StripConfig {
        &self.config
    }

    /// Current state of the connection state machine
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Whether the send worker holds a live socket
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Frames dropped because the strip could not take them
    pub fn drops_total(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Frames fully written to the socket
    pub fn frames_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Encoded frames waiting in the queue
    pub fn queue_depth(&self) -> usize {
        self.tx.len()
    }

    /// True when the strip can accept another frame: connected and the
    /// queue has room. This is the backpressure signal the render
    /// thread reads before extracting a slice.
    pub fn ready_for_data(&self) -> bool {
        self.is_connected() && !self.tx.is_full()
    }

    /// Encodes `pixels` with the intended presentation time and queues
    /// the frame for this strip. If the strip is not ready the frame is
    /// dropped silently and counted; the caller is never blocked.
    pub fn enqueue(&self, pixels: &[Rgb], present: DateTime<Utc>) {
        if !self.ready_for_data() {
            self.drops.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let wire_bytes = match codec::encode_frame(
            pixels,
            self.config.channel_mask,
            present,
            self.config.compress,
        ) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode frame for {}: {}", self.config.name, e);
                self.drops.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        if self.tx.try_send(OutgoingFrame { wire_bytes }).is_err() {
            self.drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Spawns the send worker thread. Called once, at site startup.
    pub fn start(self: Arc<Self>) {
        let name = format!("strip-{}", self.config.name);
        std::thread::Builder::new()
            .name(name)
            .spawn(move || self.run())
            .expect("spawn strip worker");
    }

    /// Worker loop: maintain the connection, pop frames, write them.
    /// Loops for the life of the process.
    fn run(self: Arc<Self>) {
        let mut backoff = BACKOFF_FLOOR;
        let mut stream: Option<TcpStream> = None;

        loop {
            let Some(mut sock) = stream.take() else {
                match self.open_connection() {
                    Ok(s) => {
                        info!(
                            "Connected to {} at {}:{}",
                            self.config.name, self.config.host, self.config.port
                        );
                        stream = Some(s);
                        backoff = BACKOFF_FLOOR;
                        self.set_state(ConnectionState::Connected);
                    }
                    Err(e) => {
                        debug!(
                            "Connect to {} failed: {}; retrying in {:?}",
                            self.config.name, e, backoff
                        );
                        self.set_state(ConnectionState::Backoff);
                        std::thread::sleep(backoff);
                        backoff = (backoff * 2).min(BACKOFF_CEILING);
                    }
                }
                continue;
            };

            match self.rx.recv_timeout(QUEUE_POP_TIMEOUT) {
                Ok(frame) => {
                    trace!(
                        "Writing {} bytes to {}",
                        frame.wire_bytes.len(),
                        self.config.name
                    );
                    match sock.write_all(&frame.wire_bytes) {
                        Ok(()) => {
                            self.sent.fetch_add(1, Ordering::Relaxed);
                            stream = Some(sock);
                        }
                        Err(e) => {
                            // The popped frame may be partially written; it
                            // is discarded. Everything still queued survives
                            // the reconnect.
                            warn!("Write to {} failed: {}", self.config.name, e);
                            drop(sock);
                            self.set_state(ConnectionState::Backoff);
                            std::thread::sleep(backoff);
                            backoff = (backoff * 2).min(BACKOFF_CEILING);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => stream = Some(sock),
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    #[instrument(skip(self), fields(strip = %self.config.name))]
    fn open_connection(&self) -> Result<TcpStream> {
        self.set_state(ConnectionState::Connecting);
        let addr = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                Error::HostUnresolved(format!("{}:{}", self.config.host, self.config.port))
            })?;

        let sock = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        // Frames must hit the wire immediately; never coalesce.
        sock.set_nodelay(true)?;
        sock.set_write_timeout(Some(WRITE_TIMEOUT))?;
        Ok(sock)
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, state: ConnectionState) {
        self.set_state(state);
    }
}
