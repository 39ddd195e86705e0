//! Line configuration.
//!
//! A [`LineConfig`] is validated once, when it is built, and is immutable
//! afterwards. Everything downstream (control block, timeouts, buffer sizing)
//! can therefore trust its fields.

use super::error::LineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_BYTE_SIZE: u8 = 8;
pub const DEFAULT_BUFFER_SIZE: u32 = 4096;
pub const DEFAULT_TIMEOUT_MS: u32 = 500;

/// Parity checking mode. Discriminants are the native control-block codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Parity {
    None = 0,
    Odd = 1,
    Even = 2,
    Mark = 3,
    Space = 4,
}

impl Parity {
    pub const ALL: [Parity; 5] = [
        Parity::None,
        Parity::Odd,
        Parity::Even,
        Parity::Mark,
        Parity::Space,
    ];

    /// Native control-block code.
    pub fn code(self) -> u8 {
        self as u8
    }

    fn label(self) -> &'static str {
        match self {
            Parity::None => "NO PARITY",
            Parity::Odd => "ODD PARITY",
            Parity::Even => "EVEN PARITY",
            Parity::Mark => "MARK PARITY",
            Parity::Space => "SPACE PARITY",
        }
    }
}

impl TryFrom<u8> for Parity {
    type Error = LineError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Parity::ALL
            .into_iter()
            .find(|p| p.code() == code)
            .ok_or_else(|| LineError::invalid_config("parity", format!("unknown parity code {code}")))
    }
}

/// Number of stop bits. Discriminants are the native control-block codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StopBits {
    One = 0,
    OnePointFive = 1,
    Two = 2,
}

impl StopBits {
    pub const ALL: [StopBits; 3] = [StopBits::One, StopBits::OnePointFive, StopBits::Two];

    /// Native control-block code.
    pub fn code(self) -> u8 {
        self as u8
    }

    fn label(self) -> &'static str {
        match self {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        }
    }
}

impl TryFrom<u8> for StopBits {
    type Error = LineError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        StopBits::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or_else(|| {
                LineError::invalid_config("stop_bits", format!("unknown stop bits code {code}"))
            })
    }
}

/// Validated line parameters and I/O limits.
///
/// Construct through [`LineConfig::builder`]:
///
/// ```
/// use serial_line::line::{LineConfig, Parity, StopBits};
///
/// let config = LineConfig::builder()
///     .baud_rate(115_200)
///     .parity(Parity::Even)
///     .stop_bits(StopBits::Two)
///     .read_timeout_ms(50)
///     .build()?;
/// assert_eq!(config.baud_rate(), 115_200);
/// # Ok::<(), serial_line::line::LineError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LineConfigBuilder", into = "LineConfigBuilder")]
pub struct LineConfig {
    baud_rate: u32,
    byte_size: u8,
    parity: Parity,
    stop_bits: StopBits,
    max_read_buffer: u32,
    max_write_buffer: u32,
    read_timeout_ms: u32,
    write_timeout_ms: u32,
}

impl LineConfig {
    /// Start a builder with 9600 baud, 8N1, 4 KiB buffers and 500 ms timeouts.
    pub fn builder() -> LineConfigBuilder {
        LineConfigBuilder::default()
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn byte_size(&self) -> u8 {
        self.byte_size
    }

    pub fn parity(&self) -> Parity {
        self.parity
    }

    pub fn stop_bits(&self) -> StopBits {
        self.stop_bits
    }

    pub fn max_read_buffer(&self) -> u32 {
        self.max_read_buffer
    }

    pub fn max_write_buffer(&self) -> u32 {
        self.max_write_buffer
    }

    pub fn read_timeout_ms(&self) -> u32 {
        self.read_timeout_ms
    }

    pub fn write_timeout_ms(&self) -> u32 {
        self.write_timeout_ms
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.into())
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.into())
    }

    /// Human-readable description: eight labelled entries in a fixed order.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Baud rate", format!("{} baud", self.baud_rate)),
            ("Byte size", format!("{} bit", self.byte_size)),
            ("Parity", self.parity.label().to_string()),
            ("Stop bits", format!("{} bit", self.stop_bits.label())),
            ("Max read buffer size", format!("{} bytes", self.max_read_buffer)),
            ("Max write buffer size", format!("{} bytes", self.max_write_buffer)),
            ("Timeout read", format!("{} msec", self.read_timeout_ms)),
            ("Timeout write", format!("{} msec", self.write_timeout_ms)),
        ]
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            byte_size: DEFAULT_BYTE_SIZE,
            parity: Parity::None,
            stop_bits: StopBits::One,
            max_read_buffer: DEFAULT_BUFFER_SIZE,
            max_write_buffer: DEFAULT_BUFFER_SIZE,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl fmt::Display for LineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, value) in self.describe() {
            writeln!(f, "{label}: {value}")?;
        }
        Ok(())
    }
}

/// Unvalidated line parameters. Also the on-disk shape of a [`LineConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfigBuilder {
    pub baud_rate: u32,
    pub byte_size: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub max_read_buffer: u32,
    pub max_write_buffer: u32,
    pub read_timeout_ms: u32,
    pub write_timeout_ms: u32,
}

impl Default for LineConfigBuilder {
    fn default() -> Self {
        LineConfig::default().into()
    }
}

impl LineConfigBuilder {
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn byte_size(mut self, byte_size: u8) -> Self {
        self.byte_size = byte_size;
        self
    }

    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn max_read_buffer(mut self, bytes: u32) -> Self {
        self.max_read_buffer = bytes;
        self
    }

    pub fn max_write_buffer(mut self, bytes: u32) -> Self {
        self.max_write_buffer = bytes;
        self
    }

    pub fn read_timeout_ms(mut self, ms: u32) -> Self {
        self.read_timeout_ms = ms;
        self
    }

    pub fn write_timeout_ms(mut self, ms: u32) -> Self {
        self.write_timeout_ms = ms;
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<LineConfig, LineError> {
        if self.baud_rate == 0 {
            return Err(LineError::invalid_config("baud_rate", "must be positive"));
        }
        if !(5..=8).contains(&self.byte_size) {
            return Err(LineError::invalid_config(
                "byte_size",
                format!("must be between 5 and 8, got {}", self.byte_size),
            ));
        }
        // The native timeout constant reserves u32::MAX as the "no interval" sentinel.
        for (field, value) in [
            ("read_timeout_ms", self.read_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
        ] {
            if value == u32::MAX {
                return Err(LineError::invalid_config(field, "must be below u32::MAX"));
            }
        }

        Ok(LineConfig {
            baud_rate: self.baud_rate,
            byte_size: self.byte_size,
            parity: self.parity,
            stop_bits: self.stop_bits,
            max_read_buffer: self.max_read_buffer,
            max_write_buffer: self.max_write_buffer,
            read_timeout_ms: self.read_timeout_ms,
            write_timeout_ms: self.write_timeout_ms,
        })
    }
}

impl TryFrom<LineConfigBuilder> for LineConfig {
    type Error = LineError;

    fn try_from(builder: LineConfigBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

impl From<LineConfig> for LineConfigBuilder {
    fn from(config: LineConfig) -> Self {
        Self {
            baud_rate: config.baud_rate,
            byte_size: config.byte_size,
            parity: config.parity,
            stop_bits: config.stop_bits,
            max_read_buffer: config.max_read_buffer,
            max_write_buffer: config.max_write_buffer,
            read_timeout_ms: config.read_timeout_ms,
            write_timeout_ms: config.write_timeout_ms,
        }
    }
}
