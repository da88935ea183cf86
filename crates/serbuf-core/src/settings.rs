use crate::error::Error;
use crate::queue::CHUNK_CAPACITY;
use std::str::FromStr;
use std::time::Duration;

/// Baud rates a channel can be initialized with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaudRate {
    B1200,
    B1800,
    B2400,
    B4800,
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
    B230400,
}

impl BaudRate {
    pub const ALL: [BaudRate; 10] = [
        BaudRate::B1200,
        BaudRate::B1800,
        BaudRate::B2400,
        BaudRate::B4800,
        BaudRate::B9600,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
        BaudRate::B230400,
    ];

    pub fn bits_per_second(&self) -> u32 {
        match self {
            BaudRate::B1200 => 1200,
            BaudRate::B1800 => 1800,
            BaudRate::B2400 => 2400,
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19_200,
            BaudRate::B38400 => 38_400,
            BaudRate::B57600 => 57_600,
            BaudRate::B115200 => 115_200,
            BaudRate::B230400 => 230_400,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = Error;

    fn try_from(rate: u32) -> Result<Self, Self::Error> {
        BaudRate::ALL
            .into_iter()
            .find(|b| b.bits_per_second() == rate)
            .ok_or(Error::UnsupportedBaudRate(rate))
    }
}

impl std::fmt::Display for BaudRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bits_per_second())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parity {
    Disabled,
    Odd,
    Even,
}

impl FromStr for Parity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "n" | "disabled" => Ok(Self::Disabled),
            "odd" | "o" => Ok(Self::Odd),
            "even" | "e" => Ok(Self::Even),
            _ => Err(Error::UnsupportedParity(s.to_string())),
        }
    }
}

/// Numeric parity codes: 0 disabled, 1 odd, 2 even.
impl TryFrom<u8> for Parity {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::Odd),
            2 => Ok(Self::Even),
            other => Err(Error::UnsupportedParity(other.to_string())),
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::Disabled => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Line attributes applied by `init`. Words are always eight data bits with
/// one stop bit and no flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    pub baud_rate: BaudRate,
    pub parity: Parity,
}

impl LineSettings {
    pub fn new(baud_rate: u32, parity: Parity) -> Result<Self, Error> {
        Ok(Self {
            baud_rate: BaudRate::try_from(baud_rate)?,
            parity,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Device path of the line, e.g. `/dev/ttyAMA0` or `/dev/ttyUSB0`.
    pub path: String,
    /// How long the drain thread waits for input before checking for shutdown.
    pub poll_interval: Duration,
    /// Upper bound on a single `write` waiting for the line to accept bytes.
    pub write_timeout: Duration,
    /// Chunk size of the inbound queue.
    pub chunk_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            path: String::from("/dev/ttyAMA0"),
            poll_interval: Duration::from_millis(20),
            write_timeout: Duration::from_secs(1),
            chunk_capacity: CHUNK_CAPACITY,
        }
    }
}

impl ChannelConfig {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn with_chunk_capacity(mut self, chunk_capacity: usize) -> Self {
        self.chunk_capacity = chunk_capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_baud_rates() {
        for rate in [1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600, 115200, 230400] {
            let baud = BaudRate::try_from(rate).unwrap();
            assert_eq!(baud.bits_per_second(), rate);
        }
    }

    #[test]
    fn test_unsupported_baud_rates() {
        for rate in [0, 300, 14400, 460800] {
            assert!(matches!(
                BaudRate::try_from(rate),
                Err(Error::UnsupportedBaudRate(r)) if r == rate
            ));
        }
    }

    #[test]
    fn test_parity_parsing() {
        assert_eq!("none".parse::<Parity>().unwrap(), Parity::Disabled);
        assert_eq!("Odd".parse::<Parity>().unwrap(), Parity::Odd);
        assert_eq!(" E ".parse::<Parity>().unwrap(), Parity::Even);
        assert!(matches!("mark".parse::<Parity>(), Err(Error::UnsupportedParity(_))));

        assert_eq!(Parity::try_from(1u8).unwrap(), Parity::Odd);
        assert!(matches!(Parity::try_from(3u8), Err(Error::UnsupportedParity(s)) if s == "3"));
    }

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.path, "/dev/ttyAMA0");
        assert_eq!(config.chunk_capacity, 4096);
    }

    #[test]
    fn test_config_builder() {
        let config = ChannelConfig::new("/dev/ttyUSB0")
            .with_poll_interval(Duration::from_millis(5))
            .with_write_timeout(Duration::from_millis(250))
            .with_chunk_capacity(64);

        assert_eq!(config.path, "/dev/ttyUSB0");
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.write_timeout, Duration::from_millis(250));
        assert_eq!(config.chunk_capacity, 64);
    }
}
