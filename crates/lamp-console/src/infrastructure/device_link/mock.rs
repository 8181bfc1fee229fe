//! In-memory port opener for tests and `--dry-run`.
//!
//! # Why a mock port?
//!
//! A real serial port needs a board plugged in, and what the board prints
//! cannot be scripted from test code.  `MockPortOpener` hands the link a
//! writer that records every byte and a reader that yields whatever the test
//! pushes with [`MockPortOpener::feed`].
//!
//! # Usage in tests
//!
//! ```ignore
//! let opener = Arc::new(MockPortOpener::new());
//! let (link, _events) = DeviceLink::new(opener.clone());
//! link.open(PortSettings::new("mock")).await?;
//!
//! opener.feed_text("TEMP:23.5\r\n");
//! link.send_line("AUTO\n")?;
//! assert_eq!(opener.written_lines(), vec!["AUTO"]);
//! ```
//!
//! Each `open()` creates a fresh feed channel, so steps fed before a
//! connection exists are dropped and `feed` returns `false`.
//!
//! # Loopback
//!
//! [`MockPortOpener::loopback`] wires the writer back into the reader, like a
//! TX-to-RX jumper on a real adapter.  Nothing is recorded in that mode, so
//! `--dry-run` sessions do not grow without bound.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use super::{PortHandles, PortOpener, PortSettings};

/// One scripted event on the inbound side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStep {
    /// Bytes returned by the next read.
    Data(Vec<u8>),
    /// The next read fails with this error kind.
    Fail(io::ErrorKind),
    /// The next read reports end-of-stream.
    Eof,
}

/// A port opener that never touches hardware.
#[derive(Default)]
pub struct MockPortOpener {
    written: Arc<Mutex<Vec<u8>>>,
    feeder: Mutex<Option<mpsc::Sender<ReadStep>>>,
    fail_next_open: Mutex<Option<io::ErrorKind>>,
    delay_next_open: Mutex<Option<Duration>>,
    fail_writes: Arc<AtomicBool>,
    write_delay: Arc<Mutex<Duration>>,
    loopback: bool,
    opens: AtomicUsize,
}

impl MockPortOpener {
    /// An opener whose writers record every byte for inspection.
    pub fn new() -> Self {
        Self::default()
    }

    /// An opener whose writers echo every byte to the same connection's
    /// reader instead of recording it.
    pub fn loopback() -> Self {
        Self {
            loopback: true,
            ..Self::default()
        }
    }

    /// Makes the next `open()` block for `delay` before it succeeds or fails.
    pub fn delay_next_open(&self, delay: Duration) {
        *lock(&self.delay_next_open) = Some(delay);
    }

    /// Makes every write block for `delay` first, like a device that is slow
    /// to drain its input.
    pub fn set_write_delay(&self, delay: Duration) {
        *lock(&self.write_delay) = delay;
    }

    /// Makes the next `open()` fail with `kind`.
    pub fn fail_next_open(&self, kind: io::ErrorKind) {
        *lock(&self.fail_next_open) = Some(kind);
    }

    /// When `true`, every write fails with `BrokenPipe`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Queues `step` for the current connection's reader.
    ///
    /// Returns `false` if no reader is listening (never opened, or the read
    /// loop has already finished).
    pub fn feed(&self, step: ReadStep) -> bool {
        match lock(&self.feeder).as_ref() {
            Some(tx) => tx.send(step).is_ok(),
            None => false,
        }
    }

    pub fn feed_text(&self, text: &str) -> bool {
        self.feed(ReadStep::Data(text.as_bytes().to_vec()))
    }

    /// Everything written so far, across all connections.
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&lock(&self.written)).into_owned()
    }

    /// Complete lines written so far, without their terminators.
    pub fn written_lines(&self) -> Vec<String> {
        let text = self.written_text();
        let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
        // The piece after the last '\n' is not a complete line.
        lines.pop();
        lines
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }
}

impl PortOpener for MockPortOpener {
    fn open(&self, settings: &PortSettings) -> io::Result<PortHandles> {
        self.opens.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = lock(&self.delay_next_open).take() {
            std::thread::sleep(delay);
        }
        if let Some(kind) = lock(&self.fail_next_open).take() {
            return Err(io::Error::new(kind, format!("mock refused {}", settings.path)));
        }

        let (tx, rx) = mpsc::channel();
        let sink = if self.loopback {
            WriteSink::Echo(tx.clone())
        } else {
            WriteSink::Record(Arc::clone(&self.written))
        };
        *lock(&self.feeder) = Some(tx);
        debug!(port = %settings.path, loopback = self.loopback, "mock port opened");

        Ok(PortHandles {
            writer: Box::new(MockWriter {
                sink,
                fail: Arc::clone(&self.fail_writes),
                delay: Arc::clone(&self.write_delay),
            }),
            reader: Box::new(ScriptedReader {
                steps: rx,
                timeout: settings.read_timeout,
                pending: VecDeque::new(),
            }),
        })
    }
}

/// Where a mock writer's bytes go.
enum WriteSink {
    Record(Arc<Mutex<Vec<u8>>>),
    Echo(mpsc::Sender<ReadStep>),
}

struct MockWriter {
    sink: WriteSink,
    fail: Arc<AtomicBool>,
    delay: Arc<Mutex<Duration>>,
}

impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let delay = *lock(&self.delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.fail.load(Ordering::Relaxed) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        debug!(bytes = %String::from_utf8_lossy(buf).trim_end(), "mock write");
        match &self.sink {
            WriteSink::Record(written) => lock(written).extend_from_slice(buf),
            WriteSink::Echo(reader) => {
                // A reader that has already finished just loses the echo.
                let _ = reader.send(ReadStep::Data(buf.to_vec()));
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Replays fed steps; behaves like a port with a read timeout when idle.
struct ScriptedReader {
    steps: mpsc::Receiver<ReadStep>,
    timeout: Duration,
    pending: VecDeque<u8>,
}

impl Read for ScriptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if !self.pending.is_empty() {
                let n = buf.len().min(self.pending.len());
                for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }

            match self.steps.recv_timeout(self.timeout) {
                Ok(ReadStep::Data(bytes)) => self.pending.extend(bytes),
                Ok(ReadStep::Fail(kind)) => return Err(io::Error::new(kind, "mock read failure")),
                Ok(ReadStep::Eof) | Err(RecvTimeoutError::Disconnected) => return Ok(0),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "mock read timeout"));
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
