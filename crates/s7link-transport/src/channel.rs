use std::fmt;
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::error::{Result, TransportError};
use crate::shutdown::ShutdownSignal;

/// Default pause between accept polls, and after each accepted peer.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Which way data flows over a channel, seen from this side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The controller sends, we read.
    Inbound,
    /// We send, the controller reads.
    Outbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-channel listening and peer configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Direction served by this channel.
    pub direction: Direction,
    /// Local address to bind and listen on.
    pub addr: SocketAddr,
    /// Pause between accept polls. Default: 5 ms.
    pub poll_interval: Duration,
    /// Pause before retrying a failed bind. Zero retries immediately.
    pub bind_retry_delay: Duration,
    /// Write timeout applied to accepted outbound peers. `None` blocks.
    pub write_timeout: Option<Duration>,
}

impl ChannelConfig {
    pub fn new(direction: Direction, addr: SocketAddr) -> Self {
        Self {
            direction,
            addr,
            poll_interval: DEFAULT_POLL_INTERVAL,
            bind_retry_delay: Duration::ZERO,
            write_timeout: None,
        }
    }
}

/// A listening socket that keeps at most one active peer.
///
/// Every accepted connection replaces the previous peer under the channel's
/// peer lock. The replaced stream is dropped, which closes it.
pub struct ConnectionChannel {
    config: ChannelConfig,
    peer: Mutex<Option<TcpStream>>,
    local_addr: Mutex<Option<SocketAddr>>,
    connected: AtomicBool,
    listening: AtomicBool,
    rebind: AtomicBool,
    generation: AtomicU64,
}

impl ConnectionChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            peer: Mutex::new(None),
            local_addr: Mutex::new(None),
            connected: AtomicBool::new(false),
            listening: AtomicBool::new(false),
            rebind: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    pub fn direction(&self) -> Direction {
        self.config.direction
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Whether a peer has been accepted and not lost or closed since.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Whether the accept loop currently holds a bound listener.
    pub fn listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Number of peers accepted so far. Changes whenever the peer is replaced.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// The address the listener is actually bound to, if listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the active peer slot.
    pub fn current_peer(&self) -> PeerGuard<'_> {
        PeerGuard {
            guard: self.peer.lock().unwrap_or_else(PoisonError::into_inner),
            connected: &self.connected,
            direction: self.config.direction,
        }
    }

    /// Drop the active peer and make the accept loop rebind its listener.
    ///
    /// The accept loop keeps running: it binds and listens again right away.
    pub fn close(&self) {
        self.current_peer().release();
        self.rebind.store(true, Ordering::SeqCst);
        debug!(direction = %self.config.direction, "channel closed");
    }

    /// Bind and listen on the configured address (non-blocking accepts).
    pub fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.addr;
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::Bind { addr, source })?;
        let bound = listener.local_addr()?;

        *self
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(bound);
        self.listening.store(true, Ordering::SeqCst);

        info!(direction = %self.config.direction, addr = %bound, "listening");
        Ok(listener)
    }

    /// Poll the listener once.
    ///
    /// Returns the peer address when a connection was accepted and installed
    /// as the active peer, `None` when nothing is pending.
    pub fn accept_one(&self, listener: &TcpListener) -> Result<Option<SocketAddr>> {
        match listener.accept() {
            Ok((stream, peer)) => {
                self.install(stream, peer)?;
                Ok(Some(peer))
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(None),
            Err(err) => Err(TransportError::Accept(err)),
        }
    }

    /// Accept loop: bind, accept until closed, rebind. Returns on shutdown only.
    ///
    /// Bind failures are retried without limit, after `bind_retry_delay`.
    pub fn run(&self, shutdown: &ShutdownSignal) {
        let direction = self.config.direction;
        let mut bind_failing = false;

        while !shutdown.is_cancelled() {
            self.rebind.store(false, Ordering::SeqCst);

            let listener = match self.bind() {
                Ok(listener) => {
                    bind_failing = false;
                    listener
                }
                Err(err) => {
                    if bind_failing {
                        trace!(%direction, error = %err, "bind retry failed");
                    } else {
                        warn!(%direction, error = %err, "bind failed; retrying");
                        bind_failing = true;
                    }
                    self.pause_before_rebind();
                    continue;
                }
            };

            self.serve(&listener, shutdown);

            self.listening.store(false, Ordering::SeqCst);
            *self
                .local_addr
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = None;
            debug!(%direction, "listener dropped");
        }

        debug!(%direction, "accept loop stopped");
    }

    fn serve(&self, listener: &TcpListener, shutdown: &ShutdownSignal) {
        let direction = self.config.direction;
        loop {
            if shutdown.is_cancelled() || self.rebind.load(Ordering::SeqCst) {
                return;
            }

            match self.accept_one(listener) {
                Ok(_) => {}
                Err(err @ TransportError::Configure { .. }) => {
                    debug!(%direction, error = %err, "rejected peer");
                }
                Err(err) => {
                    debug!(%direction, error = %err, "accept failed; rebinding");
                    return;
                }
            }

            std::thread::sleep(self.config.poll_interval);
        }
    }

    fn install(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let configure = |source| TransportError::Configure { peer, source };
        stream.set_nodelay(true).map_err(configure)?;
        match self.config.direction {
            Direction::Inbound => stream.set_nonblocking(true).map_err(configure)?,
            Direction::Outbound => {
                stream.set_nonblocking(false).map_err(configure)?;
                stream
                    .set_write_timeout(self.config.write_timeout)
                    .map_err(configure)?;
            }
        }

        let mut slot = self.peer.lock().unwrap_or_else(PoisonError::into_inner);
        let replaced = slot.replace(stream).is_some();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        drop(slot);

        info!(
            direction = %self.config.direction,
            %peer,
            replaced,
            "accepted peer"
        );
        Ok(())
    }

    fn pause_before_rebind(&self) {
        if self.config.bind_retry_delay.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(self.config.bind_retry_delay);
        }
    }
}

impl fmt::Debug for ConnectionChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionChannel")
            .field("direction", &self.config.direction)
            .field("addr", &self.config.addr)
            .field("connected", &self.connected())
            .field("listening", &self.listening())
            .field("generation", &self.generation())
            .finish()
    }
}

/// Exclusive access to a channel's active peer.
pub struct PeerGuard<'a> {
    guard: MutexGuard<'a, Option<TcpStream>>,
    connected: &'a AtomicBool,
    direction: Direction,
}

impl PeerGuard<'_> {
    pub fn is_present(&self) -> bool {
        self.guard.is_some()
    }

    pub fn stream_mut(&mut self) -> Option<&mut TcpStream> {
        self.guard.as_mut()
    }

    /// Drop the active peer and mark the channel disconnected.
    pub fn release(&mut self) {
        if let Some(stream) = self.guard.take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!(direction = %self.direction, "peer released");
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}
