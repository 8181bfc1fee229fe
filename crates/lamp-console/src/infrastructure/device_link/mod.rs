//! Device link: the serial connection to the lamp's microcontroller.
//!
//! Architecture:
//! - `DeviceLink` owns at most one connection: one writer and one reader.
//! - Outbound lines go through a mutex-guarded writer, so two callers never
//!   interleave partial lines.  The writer has its own lock: a stalled write
//!   does not hold up `state()` or `close()`.
//! - Inbound bytes are read on a blocking worker (`spawn_blocking`), scanned
//!   for the `TEMP:` tag, and published on a `watch` channel.  The link is the
//!   only writer of the temperature; everyone else holds a receiver.
//! - Lifecycle changes are reported as [`LinkEvent`]s on an unbounded channel.
//!
//! # State machine
//!
//! ```text
//!                open() ok                      close()
//! Disconnected ──────────► Connecting ──► Connected ──────► Closing
//!      ▲        │ open() failed               │                │
//!      └────────┘                             │ EOF / read err │
//!      ▲                                      ▼                │
//!      └───────────────────────────── Disconnected ◄───────────┘
//! ```
//!
//! There is no automatic reconnect: after the stream ends the link waits for
//! another `open()`.
//!
//! # Why a blocking worker? (for beginners)
//!
//! The `serialport` crate exposes a plain blocking `Read`/`Write` port.
//! Calling a blocking `read` directly on a Tokio worker thread would stall
//! every other task scheduled on it.  `tokio::task::spawn_blocking` moves the
//! loop onto Tokio's dedicated blocking thread pool instead.  The port is
//! opened with a short read timeout so the loop wakes up regularly and can
//! notice the cancellation flag set by `close()`.

pub mod mock;
pub mod serial;

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lamp_core::protocol::DEFAULT_BAUD_RATE;
use lamp_core::{ScanOutcome, TagScanner, TemperatureReading};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::application::control_lamp::CommandSink;

/// Bytes requested per read call.
const READ_BUFFER_SIZE: usize = 256;

/// Default read timeout; bounds how long `close()` waits for the read loop.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Errors that can occur in the device link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The port could not be opened (no such device, busy, unsupported rate).
    #[error("failed to open {port} at {baud_rate} baud: {source}")]
    Connection {
        port: String,
        baud_rate: u32,
        #[source]
        source: io::Error,
    },
    /// `open()` was called while a connection is open or being opened.
    #[error("a serial connection is already open")]
    AlreadyOpen,
    /// A blocking worker panicked or was cancelled by the runtime.
    #[error("serial worker failed: {0}")]
    Worker(String),
}

/// Lifecycle state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `close()` was called.
    Closed,
    /// The port reported end-of-stream.
    EndOfStream,
    /// A read failed; the message is the I/O error text.
    ReadFailed(String),
}

/// Events emitted by the link to the console loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected { port: String },
    Disconnected { reason: DisconnectReason },
}

/// Where and how to open the serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    /// Device path, e.g. `/dev/ttyACM0` or `COM3`.
    pub path: String,
    pub baud_rate: u32,
    /// Upper bound on a single blocking read.
    pub read_timeout: Duration,
}

impl PortSettings {
    /// Settings for `path` at the firmware's default rate.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// The two halves of an opened port.
pub struct PortHandles {
    pub writer: Box<dyn Write + Send>,
    pub reader: Box<dyn Read + Send>,
}

/// Opens a transport.  Called on a blocking worker thread.
pub trait PortOpener: Send + Sync {
    /// # Errors
    ///
    /// Returns the I/O error reported by the platform.
    fn open(&self, settings: &PortSettings) -> io::Result<PortHandles>;
}

/// How the read loop ended.
#[derive(Debug)]
pub(crate) enum ReadLoopExit {
    Cancelled,
    EndOfStream,
    Failed(io::Error),
}

struct ReadSession {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Mutable link state, guarded by one mutex so state, writer and read session
/// always change together.
struct Core {
    state: LinkState,
    writer: Option<SharedWriter>,
    session: Option<ReadSession>,
}

struct Shared {
    core: Mutex<Core>,
    temperature: watch::Sender<TemperatureReading>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl Shared {
    fn lock_core(&self) -> MutexGuard<'_, Core> {
        lock(&self.core)
    }

    fn emit(&self, event: LinkEvent) {
        // The console may already be gone during shutdown.
        let _ = self.events.send(event);
    }

    /// Called by the read task after its loop returns.
    fn finish_session(&self, exit: ReadLoopExit) {
        let reason = match exit {
            ReadLoopExit::Cancelled => return,
            ReadLoopExit::EndOfStream => DisconnectReason::EndOfStream,
            ReadLoopExit::Failed(e) => DisconnectReason::ReadFailed(e.to_string()),
        };

        {
            let mut core = self.lock_core();
            // `close()` owns the transition once it has moved to Closing.
            if core.state != LinkState::Connected {
                return;
            }
            core.state = LinkState::Disconnected;
            core.writer = None;
            core.session = None;
        }

        warn!("serial connection lost: {reason:?}");
        self.emit(LinkEvent::Disconnected { reason });
    }
}

/// Puts the link back to `Disconnected` if an `open()` is abandoned while the
/// port is still being opened.
struct ConnectingGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl ConnectingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut core = self.shared.lock_core();
        if core.state == LinkState::Connecting {
            core.state = LinkState::Disconnected;
            debug!("open abandoned; link back to disconnected");
        }
    }
}

/// Manages the serial connection from the console to the lamp.
pub struct DeviceLink {
    opener: Arc<dyn PortOpener>,
    shared: Arc<Shared>,
}

impl DeviceLink {
    /// Creates a disconnected link and the receiver for its events.
    pub fn new(opener: Arc<dyn PortOpener>) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (temperature, _) = watch::channel(TemperatureReading::Unknown);
        let link = Self {
            opener,
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    state: LinkState::Disconnected,
                    writer: None,
                    session: None,
                }),
                temperature,
                events,
            }),
        };
        (link, events_rx)
    }

    pub fn state(&self) -> LinkState {
        self.shared.lock_core().state
    }

    /// Returns a read-only view of the latest temperature reading.
    pub fn temperature(&self) -> watch::Receiver<TemperatureReading> {
        self.shared.temperature.subscribe()
    }

    /// Opens the port and starts the read loop.
    ///
    /// On failure the link is back in `Disconnected` and nothing is retried.
    /// The same holds when the returned future is dropped before it resolves;
    /// a port the worker opens after that is closed again.
    ///
    /// # Errors
    ///
    /// - [`LinkError::AlreadyOpen`] unless the link is `Disconnected`.
    /// - [`LinkError::Connection`] if the platform refuses to open the port.
    /// - [`LinkError::Worker`] if the blocking open task dies.
    pub async fn open(&self, settings: PortSettings) -> Result<(), LinkError> {
        {
            let mut core = self.shared.lock_core();
            if core.state != LinkState::Disconnected {
                return Err(LinkError::AlreadyOpen);
            }
            core.state = LinkState::Connecting;
        }
        let connecting = ConnectingGuard {
            shared: &self.shared,
            armed: true,
        };
        info!(port = %settings.path, baud = settings.baud_rate, "opening serial port");

        let opener = Arc::clone(&self.opener);
        let worker_settings = settings.clone();
        let opened = tokio::task::spawn_blocking(move || opener.open(&worker_settings)).await;

        let handles = match opened {
            Ok(Ok(handles)) => handles,
            Ok(Err(source)) => {
                let err = LinkError::Connection {
                    port: settings.path,
                    baud_rate: settings.baud_rate,
                    source,
                };
                error!("serial connection failed: {err}");
                return Err(err);
            }
            Err(join_err) => {
                error!("serial open worker failed: {join_err}");
                return Err(LinkError::Worker(join_err.to_string()));
            }
        };

        let mut core = self.shared.lock_core();
        core.writer = Some(Arc::new(Mutex::new(handles.writer)));
        core.state = LinkState::Connected;
        self.shared.emit(LinkEvent::Connected {
            port: settings.path.clone(),
        });

        // Spawned while holding the lock so the task cannot report an early
        // end-of-stream before the session is recorded.
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = {
            let shared = Arc::clone(&self.shared);
            let cancel = Arc::clone(&cancel);
            let reader = handles.reader;
            tokio::task::spawn_blocking(move || {
                let exit = run_read_loop(reader, &cancel, &shared.temperature);
                shared.finish_session(exit);
            })
        };
        core.session = Some(ReadSession { cancel, handle });
        drop(core);
        connecting.disarm();

        info!(port = %settings.path, "serial connected");
        Ok(())
    }

    /// Writes one line (which must already carry its `\n`) and flushes.
    ///
    /// A no-op returning `Ok(())` when no connection is open.
    ///
    /// This is a blocking call.  A device that stops draining its input can
    /// hold it for up to the port timeout, so async callers should go through
    /// `tokio::task::block_in_place` or `spawn_blocking`.  Only the writer lock
    /// is held while writing; other senders queue on it, but `state()` and
    /// `close()` do not.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the port; the connection is left as is.
    pub fn send_line(&self, line: &str) -> io::Result<()> {
        let Some(writer) = self.shared.lock_core().writer.clone() else {
            debug!(line = line.trim_end(), "not connected; dropping line");
            return Ok(());
        };

        let mut writer = lock(&writer);
        let result = writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.flush());
        match &result {
            Ok(()) => trace!(line = line.trim_end(), "line written"),
            Err(e) => warn!("serial write failed: {e}"),
        }
        result
    }

    /// Cancels the read loop, releases both handles and returns to
    /// `Disconnected`.  Does nothing unless the link is `Connected`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Worker`] if the read task panicked; the link is
    /// `Disconnected` regardless.
    pub async fn close(&self) -> Result<(), LinkError> {
        let session = {
            let mut core = self.shared.lock_core();
            if core.state != LinkState::Connected {
                debug!(state = ?core.state, "close requested; nothing to close");
                return Ok(());
            }
            core.state = LinkState::Closing;
            core.writer = None;
            core.session.take()
        };
        info!("closing serial connection");

        let joined = match session {
            Some(session) => {
                session.cancel.store(true, Ordering::Relaxed);
                session
                    .handle
                    .await
                    .map_err(|e| LinkError::Worker(e.to_string()))
            }
            None => Ok(()),
        };

        self.shared.lock_core().state = LinkState::Disconnected;
        self.shared.emit(LinkEvent::Disconnected {
            reason: DisconnectReason::Closed,
        });
        joined
    }
}

impl CommandSink for DeviceLink {
    fn send_line(&self, line: &str) -> io::Result<()> {
        DeviceLink::send_line(self, line)
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        if let Some(session) = self.shared.lock_core().session.take() {
            session.cancel.store(true, Ordering::Relaxed);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reads chunks until cancelled, end-of-stream, or a read error, publishing
/// every well-formed temperature reading.
///
/// Read timeouts are not errors: they are where cancellation is noticed.
/// Nothing is published once `cancel` is set.
pub(crate) fn run_read_loop(
    mut reader: Box<dyn Read + Send>,
    cancel: &AtomicBool,
    temperature: &watch::Sender<TemperatureReading>,
) -> ReadLoopExit {
    let mut scanner = TagScanner::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        if cancel.load(Ordering::Relaxed) {
            return ReadLoopExit::Cancelled;
        }

        let n = match reader.read(&mut buf) {
            Ok(0) => {
                info!("serial stream ended");
                return ReadLoopExit::EndOfStream;
            }
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => {
                error!("serial read error: {e}");
                return ReadLoopExit::Failed(e);
            }
        };

        if cancel.load(Ordering::Relaxed) {
            return ReadLoopExit::Cancelled;
        }

        match scanner.push(&buf[..n]) {
            ScanOutcome::Reading(value) => {
                debug!(%value, "temperature reading");
                temperature.send_replace(TemperatureReading::Value(value));
            }
            ScanOutcome::Malformed(payload) => {
                debug!(%payload, "ignoring malformed temperature tag");
            }
            ScanOutcome::NoTag => trace!(bytes = n, "chunk without temperature tag"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Yields its chunks one per read, then fails with `error`.
    struct ChunkedReader {
        chunks: Vec<Vec<u8>>,
        error: Option<io::ErrorKind>,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.chunks.is_empty() {
                return match self.error {
                    Some(kind) => Err(io::Error::new(kind, "scripted")),
                    None => Ok(0),
                };
            }
            let chunk = self.chunks.remove(0);
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    fn chunked(chunks: &[&str], error: Option<io::ErrorKind>) -> Box<dyn Read + Send> {
        Box::new(ChunkedReader {
            chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            error,
        })
    }

    #[test]
    fn test_port_settings_default_to_9600_baud() {
        let settings = PortSettings::new("/dev/ttyACM0");
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.read_timeout, DEFAULT_READ_TIMEOUT);
    }

    #[test]
    fn test_read_loop_publishes_reading_and_ends_at_eof() {
        // Arrange
        let (tx, rx) = watch::channel(TemperatureReading::Unknown);
        let reader = Box::new(Cursor::new(b"boot\r\nTEMP:24.5\r\n".to_vec()));
        let cancel = AtomicBool::new(false);

        // Act
        let exit = run_read_loop(reader, &cancel, &tx);

        // Assert
        assert!(matches!(exit, ReadLoopExit::EndOfStream));
        assert_eq!(*rx.borrow(), TemperatureReading::Value("24.5".into()));
    }

    #[test]
    fn test_read_loop_reassembles_tag_split_across_reads() {
        let (tx, rx) = watch::channel(TemperatureReading::Unknown);
        let cancel = AtomicBool::new(false);

        run_read_loop(chunked(&["fan on\r\nTEM", "P:19.0\r\n"], None), &cancel, &tx);

        assert_eq!(*rx.borrow(), TemperatureReading::Value("19.0".into()));
    }

    #[test]
    fn test_read_loop_skips_timeouts_and_stops_on_hard_error() {
        // Arrange – timeouts are retried, the later BrokenPipe ends the loop
        struct FlakyReader(u8);
        impl Read for FlakyReader {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                self.0 += 1;
                if self.0 < 3 {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "quiet"))
                } else {
                    Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
                }
            }
        }
        let (tx, rx) = watch::channel(TemperatureReading::Unknown);
        let cancel = AtomicBool::new(false);

        // Act
        let exit = run_read_loop(Box::new(FlakyReader(0)), &cancel, &tx);

        // Assert
        match exit {
            ReadLoopExit::Failed(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(*rx.borrow(), TemperatureReading::Unknown);
    }

    #[test]
    fn test_read_loop_leaves_reading_unchanged_on_malformed_tag() {
        let (tx, rx) = watch::channel(TemperatureReading::Value("21".into()));
        let cancel = AtomicBool::new(false);

        run_read_loop(chunked(&["TEMP:abc\r\n"], None), &cancel, &tx);

        assert_eq!(*rx.borrow(), TemperatureReading::Value("21".into()));
    }

    #[test]
    fn test_read_loop_returns_immediately_when_cancelled() {
        let (tx, rx) = watch::channel(TemperatureReading::Unknown);
        let cancel = AtomicBool::new(true);

        let exit = run_read_loop(chunked(&["TEMP:30\n"], None), &cancel, &tx);

        assert!(matches!(exit, ReadLoopExit::Cancelled));
        assert_eq!(*rx.borrow(), TemperatureReading::Unknown);
    }
}
