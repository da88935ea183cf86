//! In-memory serial device.
//!
//! [`SimDevice`] stands in for real hardware: bytes handed to
//! [`SimDevice::inject`] show up as line input, and everything written to an
//! open line is recorded for inspection. Faults can be switched on to drive
//! error paths.

use crate::line::{Device, Line};
use crate::settings::LineSettings;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    inbound: VecDeque<u8>,
    transmitted: Vec<u8>,
    write_capacity: Option<usize>,
    settings: Option<LineSettings>,
    timeout: Duration,
    opens: usize,
    closes: usize,
    discards: usize,
    write_calls: usize,
    unplugged: bool,
    hung_up: bool,
    fail_open: bool,
    fail_configure: bool,
    fail_close: bool,
}

#[derive(Default)]
struct SimState {
    inner: Mutex<Inner>,
    readable: Condvar,
}

/// Cloneable handle on a simulated line; clones share the same state.
#[derive(Clone, Default)]
pub struct SimDevice {
    state: Arc<SimState>,
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `bytes` arrive on the line.
    pub fn inject(&self, bytes: &[u8]) {
        self.state.inner.lock().inbound.extend(bytes);
        self.state.readable.notify_all();
    }

    /// Everything written to the line so far.
    pub fn transmitted(&self) -> Vec<u8> {
        self.state.inner.lock().transmitted.clone()
    }

    /// Bytes that arrived but have not been read off the line yet.
    pub fn unread(&self) -> usize {
        self.state.inner.lock().inbound.len()
    }

    /// Limits how many more bytes the line accepts; `None` lifts the limit.
    /// A full line refuses writes with `WouldBlock`, like a non-blocking port.
    pub fn set_write_capacity(&self, capacity: Option<usize>) {
        self.state.inner.lock().write_capacity = capacity;
    }

    /// Settings applied by the last successful `configure`.
    pub fn settings(&self) -> Option<LineSettings> {
        self.state.inner.lock().settings
    }

    pub fn opens(&self) -> usize {
        self.state.inner.lock().opens
    }

    pub fn closes(&self) -> usize {
        self.state.inner.lock().closes
    }

    pub fn discards(&self) -> usize {
        self.state.inner.lock().discards
    }

    /// Number of `write` calls the line has seen, including refused ones.
    pub fn write_calls(&self) -> usize {
        self.state.inner.lock().write_calls
    }

    pub fn fail_open(&self, fail: bool) {
        self.state.inner.lock().fail_open = fail;
    }

    pub fn fail_configure(&self, fail: bool) {
        self.state.inner.lock().fail_configure = fail;
    }

    pub fn fail_close(&self, fail: bool) {
        self.state.inner.lock().fail_close = fail;
    }

    /// Simulates the far end hanging up: reads report end of stream.
    pub fn hang_up(&self) {
        self.state.inner.lock().hung_up = true;
        self.state.readable.notify_all();
    }

    /// Removes the device: every open line starts failing with a broken pipe
    /// and new opens fail.
    pub fn unplug(&self) {
        self.state.inner.lock().unplugged = true;
        self.state.readable.notify_all();
    }
}

impl Device for SimDevice {
    fn open(&self, path: &str, _settings: &LineSettings) -> io::Result<Box<dyn Line>> {
        let mut inner = self.state.inner.lock();
        if inner.unplugged {
            let message = format!("{path}: no such device");
            return Err(io::Error::new(ErrorKind::NotFound, message));
        }
        if inner.fail_open {
            let message = format!("{path}: permission denied");
            return Err(io::Error::new(ErrorKind::PermissionDenied, message));
        }
        inner.opens += 1;
        Ok(Box::new(SimLine {
            state: self.state.clone(),
        }))
    }
}

struct SimLine {
    state: Arc<SimState>,
}

fn unplugged() -> io::Error {
    io::Error::new(ErrorKind::BrokenPipe, "device unplugged")
}

impl Read for SimLine {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut inner = self.state.inner.lock();
        let deadline = Instant::now() + inner.timeout;
        while inner.inbound.is_empty() && !inner.unplugged && !inner.hung_up {
            if self.state.readable.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        if inner.unplugged {
            return Err(unplugged());
        }
        if inner.inbound.is_empty() && inner.hung_up {
            return Ok(0);
        }
        if inner.inbound.is_empty() {
            return Err(io::Error::new(ErrorKind::TimedOut, "no input"));
        }
        let n = buf.len().min(inner.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(inner.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.state.inner.lock();
        if inner.unplugged {
            return Err(unplugged());
        }
        let accept = inner.write_capacity.map_or(buf.len(), |c| c.min(buf.len()));
        inner.write_calls += 1;
        if accept == 0 && !buf.is_empty() {
            return Err(io::Error::new(ErrorKind::WouldBlock, "line not accepting data"));
        }
        inner.transmitted.extend_from_slice(&buf[..accept]);
        if let Some(c) = inner.write_capacity.as_mut() {
            *c -= accept;
        }
        Ok(accept)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Line for SimLine {
    fn configure(&mut self, settings: &LineSettings, timeout: Duration) -> io::Result<()> {
        let mut inner = self.state.inner.lock();
        if inner.fail_configure {
            return Err(io::Error::new(ErrorKind::InvalidInput, "line attributes rejected"));
        }
        inner.settings = Some(*settings);
        inner.timeout = timeout;
        Ok(())
    }

    fn discard_buffers(&mut self) -> io::Result<()> {
        let mut inner = self.state.inner.lock();
        inner.inbound.clear();
        inner.discards += 1;
        Ok(())
    }

    fn try_clone_line(&self) -> io::Result<Box<dyn Line>> {
        Ok(Box::new(SimLine {
            state: self.state.clone(),
        }))
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        let mut inner = self.state.inner.lock();
        if inner.fail_close {
            return Err(io::Error::new(ErrorKind::Other, "close failed"));
        }
        inner.closes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{BaudRate, Parity};

    fn settings() -> LineSettings {
        LineSettings {
            baud_rate: BaudRate::B9600,
            parity: Parity::Disabled,
        }
    }

    fn open_configured(dev: &SimDevice) -> Box<dyn Line> {
        let mut line = dev.open("/dev/sim0", &settings()).unwrap();
        line.configure(&settings(), Duration::from_millis(5)).unwrap();
        line
    }

    #[test]
    fn test_idle_read_times_out() {
        let dev = SimDevice::new();
        let mut line = open_configured(&dev);
        let mut buf = [0u8; 8];
        let err = line.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn test_injected_bytes_are_read_in_order() {
        let dev = SimDevice::new();
        let mut line = open_configured(&dev);
        dev.inject(b"abc");
        dev.inject(b"def");
        let mut buf = [0u8; 4];
        assert_eq!(line.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(dev.unread(), 2);
    }

    #[test]
    fn test_write_capacity_limits_transmission() {
        let dev = SimDevice::new();
        let mut line = open_configured(&dev);
        dev.set_write_capacity(Some(2));
        assert_eq!(line.write(b"ping").unwrap(), 2);
        assert_eq!(line.write(b"ng").unwrap_err().kind(), ErrorKind::WouldBlock);
        assert_eq!(dev.write_calls(), 2);
        assert_eq!(dev.transmitted(), b"pi");
    }

    #[test]
    fn test_discard_drops_pending_input() {
        let dev = SimDevice::new();
        let mut line = open_configured(&dev);
        dev.inject(b"stale");
        line.discard_buffers().unwrap();
        assert_eq!(dev.unread(), 0);
        assert_eq!(dev.discards(), 1);
    }

    #[test]
    fn test_hang_up_reads_end_of_stream_after_pending_input() {
        let dev = SimDevice::new();
        let mut line = open_configured(&dev);
        dev.inject(b"ok");
        dev.hang_up();
        let mut buf = [0u8; 4];
        assert_eq!(line.read(&mut buf).unwrap(), 2);
        assert_eq!(line.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_unplug_breaks_open_lines() {
        let dev = SimDevice::new();
        let mut line = open_configured(&dev);
        dev.unplug();
        let mut buf = [0u8; 1];
        assert_eq!(line.read(&mut buf).unwrap_err().kind(), ErrorKind::BrokenPipe);
        assert!(dev.open("/dev/sim0", &settings()).is_err());
    }
}
