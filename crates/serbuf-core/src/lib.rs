//! Buffered serial transport: a line whose input is drained into an
//! unbounded byte queue by a background thread, read back on demand.

pub mod channel;
pub mod error;
pub mod line;
pub mod queue;
pub mod settings;
pub mod sim;

pub use channel::{SerialChannel, NO_ERROR};
pub use error::{Error, Result};
pub use line::{Device, Line, SerialPortDevice, SerialPortLine};
pub use queue::{ByteQueue, CHUNK_CAPACITY};
pub use settings::{BaudRate, ChannelConfig, LineSettings, Parity};
pub use sim::SimDevice;
