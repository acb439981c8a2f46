//! C2 Bus Transport: RS485 serial transport with retry/backoff and running
//! statistics. The actual byte-level I/O is behind [`SerialLink`] so tests
//! run against a software loopback instead of a real `/dev/ttyOHT485`.

use std::io;
use std::time::Duration;

use oht_common::consts::{
    DEFAULT_RS485_BAUD, DEFAULT_RS485_MAX_RETRIES, DEFAULT_RS485_RETRY_DELAY_MS,
    DEFAULT_RS485_TIMEOUT_MS, DEFAULT_SERIAL_DEVICE,
};
use thiserror::Error;

use super::modbus::{Frame, MAX_FRAME_LEN};

/// The byte-level half-duplex link. Implemented for `serialport::TTYPort`
/// in production; a loopback stub backs the tests.
pub trait SerialLink: Send {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn clear_input(&mut self) -> io::Result<()>;
}

/// A real RS485 link over a serial device, opened with
/// [`serialport`](https://docs.rs/serialport).
pub struct Rs485Link {
    port: Box<dyn serialport::SerialPort>,
}

impl Rs485Link {
    pub fn open(device: &str, baud: u32, timeout_ms: u64) -> Result<Self, TransportError> {
        let port = serialport::new(device, baud)
            .timeout(Duration::from_millis(timeout_ms))
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .open()
            .map_err(|e| TransportError::Open { device: device.to_string(), source: e.to_string() })?;
        Ok(Self { port })
    }
}

impl SerialLink for Rs485Link {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.port.write_all(buf)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port.clear(serialport::ClearBuffer::Input).map_err(io::Error::other)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open {device}: {source}")]
    Open { device: String, source: String },
    #[error("write failed: {0}")]
    Write(String),
    #[error("read timed out after {0} attempts")]
    Timeout(u32),
    #[error("response frame exceeds buffer ({0} bytes)")]
    FrameTooLarge(usize),
    #[error(transparent)]
    Codec(#[from] super::modbus::ModbusError),
}

/// Link health, derived from recent exchange outcomes (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusStatus {
    Healthy,
    Degraded,
    Down,
}

/// Running exchange counters, never reset except by [`BusTransport::reset_stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BusStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub timeouts: u64,
    pub crc_errors: u64,
    pub retries: u64,
    pub consecutive_failures: u32,
}

impl BusStats {
    /// §4.2: Degraded after 3 consecutive failures, Down after 10.
    pub fn status(&self) -> BusStatus {
        match self.consecutive_failures {
            0..=2 => BusStatus::Healthy,
            3..=9 => BusStatus::Degraded,
            _ => BusStatus::Down,
        }
    }
}

/// Owns the serial link and the retry/backoff policy around it.
pub struct BusTransport<L: SerialLink> {
    link: L,
    timeout_ms: u64,
    max_retries: u32,
    retry_delay_ms: u64,
    stats: BusStats,
}

impl BusTransport<Rs485Link> {
    /// Open the default RS485 device with the system defaults (§4.2).
    pub fn open_default() -> Result<Self, TransportError> {
        Self::open(DEFAULT_SERIAL_DEVICE, DEFAULT_RS485_BAUD, DEFAULT_RS485_TIMEOUT_MS)
    }

    pub fn open(device: &str, baud: u32, timeout_ms: u64) -> Result<Self, TransportError> {
        let link = Rs485Link::open(device, baud, timeout_ms)?;
        Ok(Self::with_link(link, timeout_ms))
    }
}

impl<L: SerialLink> BusTransport<L> {
    pub fn with_link(link: L, timeout_ms: u64) -> Self {
        Self {
            link,
            timeout_ms,
            max_retries: DEFAULT_RS485_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RS485_RETRY_DELAY_MS,
            stats: BusStats::default(),
        }
    }

    /// Override the retry/backoff policy (§4.1: `max_retries` default 3,
    /// `retry_delay_ms` default 100). `CoreConfig::bus` carries both so the
    /// configured values, not the hard-coded defaults, govern `exchange`.
    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn stats(&self) -> BusStats {
        self.stats
    }

    pub fn status(&self) -> BusStatus {
        self.stats.status()
    }

    pub fn reset_stats(&mut self) {
        self.stats = BusStats::default();
    }

    /// Send `request` and wait for a response frame, retrying up to
    /// `max_retries` times with exponential backoff starting at
    /// `retry_delay_ms` and doubling on each failed attempt (§4.1: e.g.
    /// 100/200/400 ms). A single successful exchange resets
    /// `consecutive_failures` to zero.
    pub fn exchange(&mut self, request: &Frame) -> Result<Frame, TransportError> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                self.stats.retries += 1;
                let delay_ms = self.retry_delay_ms.saturating_mul(1u64 << (attempt - 1));
                std::thread::sleep(Duration::from_millis(delay_ms));
            }
            match self.try_once(request) {
                Ok(frame) => {
                    self.stats.consecutive_failures = 0;
                    return Ok(frame);
                }
                Err(e) => {
                    last_err = Some(e);
                }
            }
        }
        self.stats.consecutive_failures = self.stats.consecutive_failures.saturating_add(1);
        self.stats.timeouts += 1;
        Err(last_err.unwrap_or(TransportError::Timeout(self.max_retries)))
    }

    fn try_once(&mut self, request: &Frame) -> Result<Frame, TransportError> {
        self.link.clear_input().map_err(|e| TransportError::Write(e.to_string()))?;
        self.link.write_all(request).map_err(|e| TransportError::Write(e.to_string()))?;
        self.stats.frames_sent += 1;

        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = self.link.read(&mut buf).map_err(|_| TransportError::Timeout(1))?;
        if n == 0 {
            return Err(TransportError::Timeout(1));
        }
        if n > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(n));
        }

        let mut frame = Frame::new();
        for &b in &buf[..n] {
            let _ = frame.push(b);
        }
        self.stats.frames_received += 1;
        Ok(frame)
    }
}
