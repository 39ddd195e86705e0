//! Timeout descriptor translation.

use super::device::{DeviceAccess, Handle};
use super::error::LineError;
use tracing::trace;

/// Interval value meaning "no inter-character gap constraint".
pub const NO_INTERVAL_TIMEOUT: u32 = u32::MAX;

/// Native timeout descriptor, field-for-field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct CommTimeouts {
    pub read_interval_timeout: u32,
    pub read_total_timeout_multiplier: u32,
    pub read_total_timeout_constant: u32,
    pub write_total_timeout_multiplier: u32,
    pub write_total_timeout_constant: u32,
}

impl CommTimeouts {
    /// Descriptor for the given total timeouts in milliseconds.
    ///
    /// Reads rely on the total constant only, and neither direction scales
    /// with the number of bytes requested.
    pub fn new(read_timeout_ms: u32, write_timeout_ms: u32) -> Self {
        Self {
            read_interval_timeout: NO_INTERVAL_TIMEOUT,
            read_total_timeout_multiplier: 0,
            read_total_timeout_constant: read_timeout_ms,
            write_total_timeout_multiplier: 0,
            write_total_timeout_constant: write_timeout_ms,
        }
    }

    /// Build the descriptor and apply it to the line.
    pub fn configure(
        device: &dyn DeviceAccess,
        handle: &Handle,
        read_timeout_ms: u32,
        write_timeout_ms: u32,
    ) -> Result<Self, LineError> {
        let timeouts = Self::new(read_timeout_ms, write_timeout_ms);
        device
            .set_timeouts(handle, &timeouts)
            .map_err(LineError::DeviceConfig)?;
        trace!(?handle, ?timeouts, "timeouts applied");
        Ok(timeouts)
    }
}
