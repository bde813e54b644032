//! Blocking socket transport with cooperative cancellation.
//!
//! Every blocking call here waits at most one poll interval (100 ms by
//! default) before re-checking the shared [`RunSignal`].  That is the only
//! way a server thread is stopped: clearing the signal makes every loop
//! return within one interval, and closing the client sockets unblocks any
//! reader immediately.
//!
//! # How the bounded waits work
//!
//! - The listener is non-blocking.  [`accept_with_timeout`] tries once and,
//!   when nobody is waiting, sleeps one poll interval and returns `None`.
//! - Accepted streams are switched back to blocking mode with a read timeout
//!   equal to the poll interval.  [`read_exact`] treats a timeout as "check
//!   the flag and read again" and keeps the bytes collected so far.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use ocam_core::protocol::{check_payload_len, ProtocolError};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::device_state::ClientLink;

/// Size of the scratch buffer used to discard unwanted payloads.
pub const DRAIN_CHUNK_SIZE: usize = 1024;

/// Errors produced by the transport primitives.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the connection (a read returned zero bytes).
    #[error("connection closed by peer")]
    Closed,

    /// The run signal was cleared while waiting.
    #[error("operation cancelled by shutdown")]
    Cancelled,

    /// The listener could not be bound, even after retrying.
    #[error("failed to bind {addr} after {attempts} attempts: {source}")]
    BindFailed {
        addr: SocketAddr,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// A length field was rejected before any allocation.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Shared "keep running" flag checked at every poll boundary.
#[derive(Debug, Clone)]
pub struct RunSignal(Arc<AtomicBool>);

impl Default for RunSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSignal {
    /// Creates a signal in the running state.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Timing and size limits for the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    /// Upper bound on any single blocking wait.
    pub poll_interval: Duration,
    /// Write timeout on accepted sockets.
    pub write_timeout: Duration,
    /// Number of bind attempts before giving up.
    pub bind_retries: u32,
    /// Pause between bind attempts.
    pub bind_retry_delay: Duration,
    /// Largest media payload accepted.
    pub max_packet_bytes: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            write_timeout: Duration::from_millis(500),
            bind_retries: 5,
            bind_retry_delay: Duration::from_millis(1000),
            max_packet_bytes: ocam_core::protocol::DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

// ── Listening ─────────────────────────────────────────────────────────────────

/// Binds a non-blocking listener with address/port reuse and `TCP_NODELAY`,
/// retrying while the OS still holds the port from a previous run.
///
/// # Errors
///
/// Returns [`TransportError::BindFailed`] once all attempts are used up, or
/// [`TransportError::Cancelled`] if the signal is cleared while retrying.
pub fn bind_listener(
    addr: SocketAddr,
    opts: &TransportOptions,
    running: &RunSignal,
) -> Result<TcpListener, TransportError> {
    let attempts = opts.bind_retries.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_bind(addr) {
            Ok(listener) => {
                info!("listening on TCP {addr}");
                return Ok(listener);
            }
            Err(source) if attempt >= attempts => {
                return Err(TransportError::BindFailed {
                    addr,
                    attempts,
                    source,
                });
            }
            Err(e) => {
                warn!("bind retry {attempt}/{attempts} on {addr}: {e}");
                if !sleep_while_running(opts.bind_retry_delay, opts.poll_interval, running) {
                    return Err(TransportError::Cancelled);
                }
            }
        }
    }
}

/// Sleeps for `total` in slices of at most `slice`, stopping early when the
/// signal is cleared.  Returns whether the signal is still running.
fn sleep_while_running(total: Duration, slice: Duration, running: &RunSignal) -> bool {
    let slice = slice.max(Duration::from_millis(1));
    let mut remaining = total;
    while !remaining.is_zero() {
        if !running.is_running() {
            return false;
        }
        let step = remaining.min(slice);
        std::thread::sleep(step);
        remaining -= step;
    }
    running.is_running()
}

fn try_bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    socket.set_nodelay(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Waits up to one poll interval for a client.
///
/// Returns `Ok(None)` when nobody connected in time.  An accepted stream is
/// blocking, has `TCP_NODELAY`, a read timeout of one poll interval and the
/// configured write timeout.
///
/// # Errors
///
/// Returns [`TransportError::Cancelled`] when the signal is already cleared,
/// or [`TransportError::Io`] for accept failures other than "would block".
pub fn accept_with_timeout(
    listener: &TcpListener,
    opts: &TransportOptions,
    running: &RunSignal,
) -> Result<Option<(TcpStream, SocketAddr)>, TransportError> {
    if !running.is_running() {
        return Err(TransportError::Cancelled);
    }
    match listener.accept() {
        Ok((stream, peer)) => {
            configure_client(&stream, opts)?;
            Ok(Some((stream, peer)))
        }
        Err(e) if is_timeout_error(&e) => {
            std::thread::sleep(opts.poll_interval);
            Ok(None)
        }
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
        Err(e) => Err(TransportError::Io(e)),
    }
}

fn configure_client(stream: &TcpStream, opts: &TransportOptions) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(opts.poll_interval))?;
    stream.set_write_timeout(Some(opts.write_timeout))?;
    Ok(())
}

// ── Reading ───────────────────────────────────────────────────────────────────

/// Fills `buf` completely, accumulating partial reads.
///
/// Read timeouts are not errors: they only give the loop a chance to check
/// `running`.  An empty `buf` returns immediately.
///
/// # Errors
///
/// - [`TransportError::Closed`] when a read returns zero bytes.
/// - [`TransportError::Cancelled`] when the signal is cleared first.
/// - [`TransportError::Io`] for any other failure.
pub fn read_exact<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    running: &RunSignal,
) -> Result<(), TransportError> {
    let mut filled = 0;
    while filled < buf.len() {
        if !running.is_running() {
            return Err(TransportError::Cancelled);
        }
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => filled += n,
            Err(e) if is_timeout_error(&e) || e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(TransportError::Io(e)),
        }
    }
    Ok(())
}

/// Reads a length-prefixed payload of exactly `len` bytes.
///
/// `len` is checked against `limit` before the buffer is allocated.
///
/// # Errors
///
/// Returns [`TransportError::Protocol`] for an oversized length, otherwise
/// whatever [`read_exact`] returns.
pub fn read_payload<R: Read>(
    reader: &mut R,
    len: u32,
    limit: usize,
    running: &RunSignal,
) -> Result<Vec<u8>, TransportError> {
    let len = check_payload_len(len, limit)?;
    let mut payload = vec![0u8; len];
    read_exact(reader, &mut payload, running)?;
    Ok(payload)
}

/// Reads and discards exactly `len` bytes in fixed-size chunks.
///
/// # Errors
///
/// Same as [`read_exact`].
pub fn drain<R: Read>(reader: &mut R, len: u64, running: &RunSignal) -> Result<(), TransportError> {
    let mut scratch = [0u8; DRAIN_CHUNK_SIZE];
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(DRAIN_CHUNK_SIZE as u64) as usize;
        read_exact(reader, &mut scratch[..n], running)?;
        remaining -= n as u64;
    }
    debug!(bytes = len, "drained payload");
    Ok(())
}

// ── Writing ───────────────────────────────────────────────────────────────────

/// Writes all of `bytes`.
///
/// # Errors
///
/// Returns [`TransportError::Io`] on failure (including the write timeout).
pub fn send_all<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<(), TransportError> {
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}

impl ClientLink for TcpStream {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        send_all(self, bytes).map_err(|e| match e {
            TransportError::Io(io) => io,
            other => io::Error::other(other.to_string()),
        })
    }

    fn close(&mut self) {
        // NotConnected after the peer already left is fine.
        let _ = self.shutdown(Shutdown::Both);
    }
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
pub fn is_timeout_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
