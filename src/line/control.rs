//! Line control block translation.
//!
//! [`ControlBlock`] mirrors the native device control block. It is always
//! built by read-modify-write: the current block is fetched from the device,
//! the fields a [`LineConfig`] owns are overwritten, and every other bit is
//! carried over untouched.

use super::config::{LineConfig, Parity};
use super::device::{DeviceAccess, Handle};
use super::error::LineError;
use tracing::{debug, trace};

/// Bit positions inside [`ControlBlock::flags`].
pub mod flags {
    pub const BINARY: u32 = 1 << 0;
    pub const PARITY: u32 = 1 << 1;
    pub const OUTX_CTS_FLOW: u32 = 1 << 2;
    pub const OUTX_DSR_FLOW: u32 = 1 << 3;
    pub const DTR_CONTROL_MASK: u32 = 0b11 << 4;
    pub const DSR_SENSITIVITY: u32 = 1 << 6;
    pub const TX_CONTINUE_ON_XOFF: u32 = 1 << 7;
    pub const OUT_X: u32 = 1 << 8;
    pub const IN_X: u32 = 1 << 9;
    pub const ERROR_CHAR: u32 = 1 << 10;
    pub const NULL: u32 = 1 << 11;
    pub const RTS_CONTROL_MASK: u32 = 0b11 << 12;
    pub const ABORT_ON_ERROR: u32 = 1 << 14;

    pub const DTR_CONTROL_SHIFT: u32 = 4;
    pub const RTS_CONTROL_SHIFT: u32 = 12;

    /// Two-bit DTR/RTS mode value: lines driven by buffer state.
    pub const CONTROL_HANDSHAKE: u32 = 0x02;

    /// Bits whose value is decided by the translator. All others are preserved.
    pub const OWNED: u32 = BINARY
        | PARITY
        | OUTX_CTS_FLOW
        | OUTX_DSR_FLOW
        | DTR_CONTROL_MASK
        | RTS_CONTROL_MASK
        | ABORT_ON_ERROR;
}

pub const XON_CHAR: u8 = 0x00;
pub const XOFF_CHAR: u8 = 0xFF;
pub const XON_XOFF_LIMIT: u16 = 128;

/// Native line control block, field-for-field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ControlBlock {
    pub length: u32,
    pub baud_rate: u32,
    pub flags: u32,
    pub reserved: u16,
    pub xon_lim: u16,
    pub xoff_lim: u16,
    pub byte_size: u8,
    pub parity: u8,
    pub stop_bits: u8,
    pub xon_char: u8,
    pub xoff_char: u8,
    pub error_char: u8,
    pub eof_char: u8,
    pub evt_char: u8,
    pub reserved1: u16,
}

impl Default for ControlBlock {
    fn default() -> Self {
        Self {
            length: std::mem::size_of::<ControlBlock>() as u32,
            baud_rate: 0,
            flags: 0,
            reserved: 0,
            xon_lim: 0,
            xoff_lim: 0,
            byte_size: 0,
            parity: 0,
            stop_bits: 0,
            xon_char: 0,
            xoff_char: 0,
            error_char: 0,
            eof_char: 0,
            evt_char: 0,
            reserved1: 0,
        }
    }
}

impl ControlBlock {
    /// Fetch the line's block, overlay `config`, and push the result back.
    ///
    /// Any failure of the fetch or the push is a `DeviceConfig` error.
    pub fn build(
        device: &dyn DeviceAccess,
        handle: &Handle,
        config: &LineConfig,
    ) -> Result<Self, LineError> {
        let mut block = device
            .get_control_block(handle)
            .map_err(LineError::DeviceConfig)?;
        trace!(?handle, snapshot = ?block, "fetched control block");

        block.apply(config);

        device
            .set_control_block(handle, &block)
            .map_err(LineError::DeviceConfig)?;
        debug!(
            ?handle,
            baud_rate = block.baud_rate,
            flags = %format!("{:#06x}", block.flags),
            "control block applied"
        );
        Ok(block)
    }

    /// Overlay `config` and the fixed handshake policy onto this block.
    pub fn apply(&mut self, config: &LineConfig) {
        self.length = std::mem::size_of::<ControlBlock>() as u32;
        self.baud_rate = config.baud_rate();
        self.byte_size = config.byte_size();
        self.parity = config.parity().code();
        self.stop_bits = config.stop_bits().code();

        let mut owned = flags::BINARY | flags::OUTX_CTS_FLOW | flags::OUTX_DSR_FLOW;
        if config.parity() != Parity::None {
            owned |= flags::PARITY;
        }
        owned |= flags::CONTROL_HANDSHAKE << flags::DTR_CONTROL_SHIFT;
        owned |= flags::CONTROL_HANDSHAKE << flags::RTS_CONTROL_SHIFT;
        owned |= flags::ABORT_ON_ERROR;
        self.flags = (self.flags & !flags::OWNED) | owned;

        self.xon_char = XON_CHAR;
        self.xoff_char = XOFF_CHAR;
        self.xon_lim = XON_XOFF_LIMIT;
        self.xoff_lim = XON_XOFF_LIMIT;
    }

    pub fn is_binary(&self) -> bool {
        self.flags & flags::BINARY != 0
    }

    pub fn parity_enabled(&self) -> bool {
        self.flags & flags::PARITY != 0
    }

    pub fn cts_output_flow(&self) -> bool {
        self.flags & flags::OUTX_CTS_FLOW != 0
    }

    pub fn dsr_output_flow(&self) -> bool {
        self.flags & flags::OUTX_DSR_FLOW != 0
    }

    pub fn abort_on_error(&self) -> bool {
        self.flags & flags::ABORT_ON_ERROR != 0
    }

    /// Two-bit DTR control mode.
    pub fn dtr_control(&self) -> u32 {
        (self.flags & flags::DTR_CONTROL_MASK) >> flags::DTR_CONTROL_SHIFT
    }

    /// Two-bit RTS control mode.
    pub fn rts_control(&self) -> u32 {
        (self.flags & flags::RTS_CONTROL_MASK) >> flags::RTS_CONTROL_SHIFT
    }
}
