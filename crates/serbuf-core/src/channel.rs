use crate::error::{Error, Result};
use crate::line::{Device, Line, SerialPortDevice};
use crate::queue::{ByteQueue, CHUNK_CAPACITY};
use crate::settings::{ChannelConfig, LineSettings, Parity};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Returned by [`SerialChannel::last_error`] when nothing failed since the
/// previous call.
pub const NO_ERROR: &str = "No error";

#[derive(Default)]
struct ErrorSlot(Mutex<Option<String>>);

impl ErrorSlot {
    fn record(&self, message: String) {
        debug!("recording error: {message}");
        *self.0.lock() = Some(message);
    }

    fn take(&self) -> String {
        self.0.lock().take().unwrap_or_else(|| NO_ERROR.to_string())
    }
}

/// State shared between a session and its drain thread.
struct Inbound {
    queue: Mutex<ByteQueue>,
    faulted: AtomicBool,
}

struct Session {
    line: Box<dyn Line>,
    inbound: Arc<Inbound>,
    shutdown: Sender<()>,
    drain: JoinHandle<()>,
}

impl Session {
    fn is_faulted(&self) -> bool {
        self.inbound.faulted.load(Ordering::Acquire)
    }

    /// Stops the drain thread and hands back the line.
    fn disarm(self) -> Box<dyn Line> {
        let _ = self.shutdown.send(());
        if self.drain.join().is_err() {
            error!("drain thread panicked");
        }
        self.line
    }
}

/// A serial line whose input is drained into a queue in the background.
///
/// Callers pull queued input with [`SerialChannel::read`], which never
/// blocks. Writes go straight to the line.
pub struct SerialChannel {
    config: ChannelConfig,
    device: Box<dyn Device>,
    settings: Option<LineSettings>,
    session: Option<Session>,
    errors: Arc<ErrorSlot>,
}

impl SerialChannel {
    /// Creates a closed channel on the serial port at `config.path`.
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_device(SerialPortDevice, config)
    }

    /// Creates a closed channel that opens its line from `device`.
    pub fn with_device(device: impl Device + 'static, config: ChannelConfig) -> Self {
        Self {
            config,
            device: Box::new(device),
            settings: None,
            session: None,
            errors: Arc::default(),
        }
    }

    pub fn init(&mut self, baud_rate: u32, parity: Parity) -> Result<()> {
        let result = self.try_init(baud_rate, parity);
        self.note(result)
    }

    fn try_init(&mut self, baud_rate: u32, parity: Parity) -> Result<()> {
        self.reap_faulted();
        if self.session.is_some() {
            return Err(Error::AlreadyOpen);
        }
        let settings = LineSettings::new(baud_rate, parity)?;
        let path = self.config.path.clone();

        let mut line = self
            .device
            .open(&path, &settings)
            .map_err(|source| Error::OpenFailed {
                path: path.clone(),
                source,
            })?;
        line.configure(&settings, self.config.poll_interval)
            .and_then(|_| line.discard_buffers())
            .map_err(|source| Error::ConfigurationFailed {
                path: path.clone(),
                source,
            })?;
        let reader = line
            .try_clone_line()
            .map_err(|source| Error::OpenFailed {
                path: path.clone(),
                source,
            })?;

        let inbound = Arc::new(Inbound {
            queue: Mutex::new(ByteQueue::with_chunk_capacity(self.config.chunk_capacity)),
            faulted: AtomicBool::new(false),
        });
        let (shutdown, stop) = bounded::<()>(1);
        let drain = {
            let inbound = inbound.clone();
            let errors = self.errors.clone();
            let drain_path = path.clone();
            thread::Builder::new()
                .name(format!("serbuf-drain {path}"))
                .spawn(move || drain_line(reader, &inbound, &errors, &stop, &drain_path))
                .map_err(|source| Error::OpenFailed {
                    path: path.clone(),
                    source,
                })?
        };

        info!("opened {path} at {} baud, parity {:?}", settings.baud_rate, settings.parity);
        self.settings = Some(settings);
        self.session = Some(Session {
            line,
            inbound,
            shutdown,
            drain,
        });
        Ok(())
    }

    /// Stops background draining, closes the line and drops queued input.
    ///
    /// The channel is closed afterwards even when closing the line fails.
    pub fn deinit(&mut self) -> Result<()> {
        let result = self.try_deinit();
        self.note(result)
    }

    fn try_deinit(&mut self) -> Result<()> {
        self.reap_faulted();
        let session = self.session.take().ok_or(Error::NotOpen)?;
        self.settings = None;
        let line = session.disarm();
        line.close().map_err(|source| Error::CloseFailed {
            path: self.config.path.clone(),
            source,
        })?;
        info!("closed {}", self.config.path);
        Ok(())
    }

    /// Sends `bytes` to the line, waiting at most `write_timeout` for it to
    /// accept them. A write that stalls part way fails with [`Error::Io`];
    /// the caller retries the remainder.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let result = self.try_write(bytes);
        self.note(result)
    }

    fn try_write(&mut self, bytes: &[u8]) -> Result<()> {
        self.reap_faulted();
        let timeout = self.config.write_timeout;
        let backoff = self.config.poll_interval.min(Duration::from_millis(1));
        let session = self.session.as_mut().ok_or(Error::NotOpen)?;
        let deadline = Instant::now() + timeout;
        let mut written = 0;
        while written < bytes.len() {
            match session.line.write(&bytes[written..]) {
                Ok(0) => return Err(short_write(ErrorKind::WriteZero, written, bytes.len())),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(short_write(ErrorKind::TimedOut, written, bytes.len()));
                    }
                    thread::sleep(backoff);
                }
                Err(e) => return Err(e.into()),
            }
        }
        trace!("wrote {written} bytes to {}", self.config.path);
        Ok(())
    }

    /// Pops up to `max_bytes` of queued input. Empty when nothing has arrived.
    pub fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let result = self.inbound().map(|inbound| inbound.queue.lock().pop(max_bytes));
        self.note(result)
    }

    /// Fills `buf` with queued input and returns the number of bytes copied.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let result = self.inbound().map(|inbound| inbound.queue.lock().pop_into(buf));
        self.note(result)
    }

    /// Bytes waiting to be read; zero when the channel is closed.
    pub fn pending_input_size(&self) -> usize {
        match &self.session {
            Some(session) if !session.is_faulted() => session.inbound.queue.lock().len(),
            _ => 0,
        }
    }

    /// Returns and clears the most recent error message, or [`NO_ERROR`].
    pub fn last_error(&self) -> String {
        self.errors.take()
    }

    pub fn is_open(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.is_faulted())
    }

    pub fn settings(&self) -> Option<LineSettings> {
        self.settings
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    fn inbound(&mut self) -> Result<Arc<Inbound>> {
        self.reap_faulted();
        self.session
            .as_ref()
            .map(|s| s.inbound.clone())
            .ok_or(Error::NotOpen)
    }

    fn note<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.errors.record(e.to_string());
        }
        result
    }

    /// Tears down a session whose drain thread hit a terminal line error.
    fn reap_faulted(&mut self) {
        if !self.session.as_ref().is_some_and(Session::is_faulted) {
            return;
        }
        if let Some(session) = self.session.take() {
            warn!("{} failed in the background, closing channel", self.config.path);
            self.settings = None;
            drop(session.disarm());
        }
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.disarm().close() {
                warn!("closing {} on drop failed: {e}", self.config.path);
            }
        }
    }
}

fn short_write(kind: ErrorKind, written: usize, requested: usize) -> Error {
    Error::Io(io::Error::new(
        kind,
        format!("wrote {written} of {requested} bytes"),
    ))
}

fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

/// Moves line input into the queue until told to stop or the line fails.
///
/// Each read blocks until input is ready or the poll interval passes, so the
/// thread sleeps while the line is idle and notices shutdown within one
/// interval.
fn drain_line(
    mut line: Box<dyn Line>,
    inbound: &Inbound,
    errors: &ErrorSlot,
    stop: &Receiver<()>,
    path: &str,
) {
    debug!("drain for {path} started");
    let mut buf = [0u8; CHUNK_CAPACITY];
    loop {
        match stop.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Disconnected) => break,
        }
        match line.read(&mut buf) {
            Ok(0) => {
                fault(inbound, errors, format!("reading {path} failed: end of stream"));
                break;
            }
            Ok(n) => {
                inbound.queue.lock().push(&buf[..n]);
                trace!("drained {n} bytes from {path}");
            }
            Err(e) if is_idle(&e) => {}
            Err(e) => {
                fault(inbound, errors, format!("reading {path} failed: {e}"));
                break;
            }
        }
    }
    debug!("drain for {path} stopped");
}

/// Marks the session dead so the caller side closes it.
fn fault(inbound: &Inbound, errors: &ErrorSlot, message: String) {
    error!("{message}");
    errors.record(message);
    inbound.faulted.store(true, Ordering::Release);
}
