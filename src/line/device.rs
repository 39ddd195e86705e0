//! Device access layer abstraction.
//!
//! Defines the [`DeviceAccess`] trait that the session and the translators
//! drive. One instance is created at process start and shared (usually as an
//! `Arc<dyn DeviceAccess>`) by every session; it holds no per-line state that
//! outlives the handles it issued.

use super::control::ControlBlock;
use super::error::DeviceError;
use super::timeouts::CommTimeouts;
use bitflags::bitflags;
use std::fmt;

/// Exclusive handle to an acquired line.
///
/// Neither `Clone` nor `Copy`. A handle is released by moving it
/// into [`DeviceAccess::close`], so it can only be released once.
#[derive(PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Wrap a raw handle value. Intended for device layer implementations.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle(#{})", self.0)
    }
}

/// Identifies one pending asynchronous operation on a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationToken(u64);

impl OperationToken {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Result of issuing an asynchronous read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStatus {
    /// The operation finished immediately, transferring this many bytes.
    Complete(usize),
    /// The device accepted the operation; completion can be awaited with the token.
    Pending(OperationToken),
}

/// Access requested when acquiring a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessMode {
    pub read: bool,
    pub write: bool,
    /// Operations may be issued and completed separately.
    pub overlapped: bool,
}

impl AccessMode {
    /// Read and write access with overlapped I/O, as every session requests.
    pub const READ_WRITE_OVERLAPPED: AccessMode = AccessMode {
        read: true,
        write: true,
        overlapped: true,
    };
}

bitflags! {
    /// Bitmask selecting what a purge cancels and discards.
    ///
    /// Bit values match the native purge call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PurgeFlags: u32 {
        /// Cancel a pending write.
        const CANCEL_WRITE = 0x0001;
        /// Cancel a pending read.
        const CANCEL_READ  = 0x0002;
        /// Discard the output buffer.
        const CLEAR_OUTPUT = 0x0004;
        /// Discard the input buffer.
        const CLEAR_INPUT  = 0x0008;

        /// Everything scoped to the write direction.
        const WRITE_DIRECTION = Self::CANCEL_WRITE.bits() | Self::CLEAR_OUTPUT.bits();
        /// Everything scoped to the read direction.
        const READ_DIRECTION  = Self::CANCEL_READ.bits() | Self::CLEAR_INPUT.bits();
        /// Both directions.
        const ALL = Self::WRITE_DIRECTION.bits() | Self::READ_DIRECTION.bits();
    }
}

/// Raw device primitives for a serial line.
///
/// Implementations must be usable from several threads at once: a reader
/// thread may be blocked in [`await_completion`](DeviceAccess::await_completion)
/// while a writer thread issues writes on the same handle.
pub trait DeviceAccess: Send + Sync {
    /// Acquire an exclusive handle to the line named `identifier`.
    fn open_exclusive(&self, identifier: &str, access: AccessMode) -> Result<Handle, DeviceError>;

    /// Release a handle. Consumes it, so a handle is released at most once.
    fn close(&self, handle: Handle);

    /// Fetch the line's current control block.
    fn get_control_block(&self, handle: &Handle) -> Result<ControlBlock, DeviceError>;

    /// Apply a control block to the line.
    fn set_control_block(&self, handle: &Handle, block: &ControlBlock) -> Result<(), DeviceError>;

    /// Apply a timeout descriptor to the line.
    fn set_timeouts(&self, handle: &Handle, timeouts: &CommTimeouts) -> Result<(), DeviceError>;

    /// Size the driver's input and output buffers.
    fn setup_buffers(&self, handle: &Handle, read_size: u32, write_size: u32)
        -> Result<(), DeviceError>;

    /// Cancel pending operations and/or discard buffered bytes.
    fn purge(&self, handle: &Handle, flags: PurgeFlags) -> Result<(), DeviceError>;

    /// Issue an asynchronous write of `data`.
    fn write_async(&self, handle: &Handle, data: &[u8]) -> Result<IoStatus, DeviceError>;

    /// Issue an asynchronous read into `buffer`.
    fn read_async(&self, handle: &Handle, buffer: &mut [u8]) -> Result<IoStatus, DeviceError>;

    /// Block until the pending operation `token` finishes and return the byte count.
    ///
    /// For a read, `buffer` is the same buffer that was passed to
    /// [`read_async`](DeviceAccess::read_async). The wait is bounded by the
    /// timeouts applied to the handle; a read that times out yields `Ok(0)`.
    fn await_completion(
        &self,
        handle: &Handle,
        token: OperationToken,
        buffer: &mut [u8],
    ) -> Result<usize, DeviceError>;
}
