//! Seams between the channel and the operating system's serial line.

use crate::settings::LineSettings;
use serialport::{ClearBuffer, DataBits, FlowControl, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// An open serial line.
///
/// Reads block for at most the timeout given to [`Line::configure`] and
/// report an idle line as [`io::ErrorKind::TimedOut`]. `Ok(0)` means the far
/// end is gone.
pub trait Line: Read + Write + Send {
    /// Applies baud rate and parity with 8 data bits, 1 stop bit and no flow
    /// control. `timeout` bounds every blocking read and write.
    fn configure(&mut self, settings: &LineSettings, timeout: Duration) -> io::Result<()>;

    /// Discards input that has not been read and output not yet sent.
    fn discard_buffers(&mut self) -> io::Result<()>;

    /// Opens a second handle on the same line.
    fn try_clone_line(&self) -> io::Result<Box<dyn Line>>;

    /// Flushes pending output and releases the handle.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// Something lines can be opened from.
pub trait Device: Send {
    fn open(&self, path: &str, settings: &LineSettings) -> io::Result<Box<dyn Line>>;
}

/// Opens lines through the `serialport` crate. On Unix the port is put into
/// raw mode, so control characters pass through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortDevice;

impl Device for SerialPortDevice {
    fn open(&self, path: &str, settings: &LineSettings) -> io::Result<Box<dyn Line>> {
        let port = serialport::new(path, settings.baud_rate.bits_per_second()).open()?;
        Ok(Box::new(SerialPortLine::new(port)))
    }
}

pub struct SerialPortLine {
    port: Box<dyn SerialPort>,
}

impl SerialPortLine {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialPortLine {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialPortLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Line for SerialPortLine {
    fn configure(&mut self, settings: &LineSettings, timeout: Duration) -> io::Result<()> {
        self.port.set_baud_rate(settings.baud_rate.bits_per_second())?;
        self.port.set_data_bits(DataBits::Eight)?;
        self.port.set_parity(settings.parity.into())?;
        self.port.set_stop_bits(StopBits::One)?;
        self.port.set_flow_control(FlowControl::None)?;
        self.port.set_timeout(timeout)?;
        Ok(())
    }

    fn discard_buffers(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn try_clone_line(&self) -> io::Result<Box<dyn Line>> {
        let port = self.port.try_clone()?;
        Ok(Box::new(SerialPortLine { port }))
    }

    fn close(mut self: Box<Self>) -> io::Result<()> {
        self.port.flush()
    }
}
