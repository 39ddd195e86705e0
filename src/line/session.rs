//! Exclusive session over one serial line.
//!
//! A [`PortSession`] is either Closed or Open. Opening acquires an exclusive
//! handle and runs the setup sequence (buffers, control block, timeouts,
//! purge); the handle is released again if any step fails. Reads and writes
//! purge their own direction before issuing an overlapped operation, so a
//! reader thread and a writer thread can share one session.
//!
//! The session lock is only held long enough to look up the open line. An
//! operation in flight keeps its own reference to the line, so closing never
//! waits for a blocked read: it cancels the read and the handle is released
//! when the last in-flight operation returns.

use super::config::LineConfig;
use super::control::ControlBlock;
use super::device::{AccessMode, DeviceAccess, Handle, IoStatus, PurgeFlags};
use super::error::{DeviceError, LineError};
use super::timeouts::CommTimeouts;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Result of a successful [`PortSession::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were placed at the start of the buffer.
    Received(usize),
    /// The read timeout elapsed with no data. Call `read` again to keep waiting.
    TimeoutNoData,
}

impl ReadOutcome {
    /// Number of bytes received (0 on timeout).
    pub fn bytes(self) -> usize {
        match self {
            ReadOutcome::Received(n) => n,
            ReadOutcome::TimeoutNoData => 0,
        }
    }

    pub fn is_timeout(self) -> bool {
        matches!(self, ReadOutcome::TimeoutNoData)
    }
}

/// Everything a session holds while Open. Releases the handle when dropped.
struct OpenLine {
    device: Arc<dyn DeviceAccess>,
    identifier: String,
    handle: Handle,
    config: LineConfig,
    control_block: ControlBlock,
    timeouts: CommTimeouts,
}

impl Drop for OpenLine {
    fn drop(&mut self) {
        debug!(line = %self.identifier, handle = ?self.handle, "releasing handle");
        // `self.handle` goes away with `self`, so this is the only release.
        self.device.close(Handle::from_raw(self.handle.raw()));
    }
}

/// Exclusive, full-duplex session over a single line.
///
/// # Example
/// ```
/// use serial_line::line::{LineConfig, MockDevice, PortSession, ReadOutcome};
/// use std::sync::Arc;
///
/// let device = Arc::new(MockDevice::new().with_line("LINE0"));
/// let session = PortSession::new(device.clone());
///
/// session.open("LINE0", LineConfig::builder().read_timeout_ms(10).build()?)?;
/// session.write(b"ABC")?;
/// assert_eq!(device.write_log("LINE0"), vec![b"ABC".to_vec()]);
///
/// let mut buffer = [0u8; 16];
/// assert_eq!(session.read(&mut buffer)?, ReadOutcome::TimeoutNoData);
/// session.close();
/// # Ok::<(), serial_line::line::LineError>(())
/// ```
pub struct PortSession {
    device: Arc<dyn DeviceAccess>,
    line: RwLock<Option<Arc<OpenLine>>>,
    /// Serialises reads against each other.
    read_direction: Mutex<()>,
    /// Serialises writes against each other.
    write_direction: Mutex<()>,
}

impl PortSession {
    /// Create a Closed session bound to a device access layer.
    pub fn new(device: Arc<dyn DeviceAccess>) -> Self {
        Self {
            device,
            line: RwLock::new(None),
            read_direction: Mutex::new(()),
            write_direction: Mutex::new(()),
        }
    }

    /// Create a session and open `identifier` in one step.
    pub fn open_with(
        device: Arc<dyn DeviceAccess>,
        identifier: &str,
        config: LineConfig,
    ) -> Result<Self, LineError> {
        let session = Self::new(device);
        session.open(identifier, config)?;
        Ok(session)
    }

    /// Acquire `identifier` and run the setup sequence.
    ///
    /// On any failure the handle is released and the session stays Closed.
    pub fn open(&self, identifier: &str, config: LineConfig) -> Result<(), LineError> {
        let mut line = self.line.write();
        if line.is_some() {
            return Err(LineError::AlreadyOpen);
        }

        let handle = self
            .device
            .open_exclusive(identifier, AccessMode::READ_WRITE_OVERLAPPED)
            .map_err(|e| LineError::acquisition(identifier, e))?;
        debug!(line = identifier, ?handle, "handle acquired");

        match setup(&*self.device, &handle, &config) {
            Ok((control_block, timeouts)) => {
                info!(
                    line = identifier,
                    baud_rate = config.baud_rate(),
                    byte_size = config.byte_size(),
                    parity = ?config.parity(),
                    stop_bits = ?config.stop_bits(),
                    "line open"
                );
                *line = Some(Arc::new(OpenLine {
                    device: Arc::clone(&self.device),
                    identifier: identifier.to_string(),
                    handle,
                    config,
                    control_block,
                    timeouts,
                }));
                Ok(())
            }
            Err(err) => {
                debug!(line = identifier, ?handle, "setup failed, releasing handle");
                self.device.close(handle);
                Err(err)
            }
        }
    }

    /// Release the handle. A no-op on a Closed session.
    ///
    /// Returns without waiting for in-flight operations. A blocked read is
    /// cancelled and the handle is released as soon as it returns.
    pub fn close(&self) {
        let taken = self.line.write().take();
        let Some(open) = taken else { return };
        if let Err(open) = Arc::try_unwrap(open) {
            trace!(line = %open.identifier, "operations in flight, cancelling read");
            if let Err(e) = self.device.purge(&open.handle, PurgeFlags::CANCEL_READ) {
                trace!(error = %e, "cancel on close failed");
            }
        }
    }

    /// Purge with caller-chosen flags.
    pub fn clear(&self, flags: PurgeFlags) -> Result<(), LineError> {
        let open = self.current()?;
        trace!(line = %open.identifier, ?flags, "purge");
        self.device
            .purge(&open.handle, flags)
            .map_err(|e| self.io_failure(&open, e))
    }

    /// Send `data` without waiting for transmission to finish.
    ///
    /// A pending write (the usual outcome) counts as success.
    pub fn write(&self, data: &[u8]) -> Result<(), LineError> {
        let _direction = self.write_direction.lock();
        let open = self.current()?;

        let result = self
            .device
            .purge(&open.handle, PurgeFlags::WRITE_DIRECTION)
            .and_then(|()| self.device.write_async(&open.handle, data));

        match result {
            Ok(IoStatus::Pending(token)) => {
                trace!(bytes = data.len(), ?token, "write pending");
                Ok(())
            }
            Ok(IoStatus::Complete(written)) => {
                trace!(bytes = written, "write completed immediately");
                Ok(())
            }
            Err(e) => Err(self.io_failure(&open, e)),
        }
    }

    /// Read into `buffer`, blocking for at most the configured read timeout.
    pub fn read(&self, buffer: &mut [u8]) -> Result<ReadOutcome, LineError> {
        let _direction = self.read_direction.lock();
        let open = self.current()?;
        let handle = &open.handle;

        let result = self
            .device
            .purge(handle, PurgeFlags::READ_DIRECTION)
            .and_then(|()| self.device.read_async(handle, buffer))
            .and_then(|status| match status {
                IoStatus::Complete(n) => Ok(n),
                IoStatus::Pending(token) => {
                    trace!(?token, "read pending, waiting");
                    self.device.await_completion(handle, token, buffer)
                }
            });

        match result {
            Ok(0) => Ok(ReadOutcome::TimeoutNoData),
            Ok(n) => Ok(ReadOutcome::Received(n)),
            Err(e) => Err(self.io_failure(&open, e)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.line.read().is_some()
    }

    /// Identifier of the open line.
    pub fn identifier(&self) -> Option<String> {
        self.line.read().as_ref().map(|l| l.identifier.clone())
    }

    /// Configuration the line was opened with.
    pub fn config(&self) -> Option<LineConfig> {
        self.line.read().as_ref().map(|l| l.config.clone())
    }

    /// Control block applied during open.
    pub fn control_block(&self) -> Option<ControlBlock> {
        self.line.read().as_ref().map(|l| l.control_block)
    }

    /// Timeout descriptor applied during open.
    pub fn timeouts(&self) -> Option<CommTimeouts> {
        self.line.read().as_ref().map(|l| l.timeouts)
    }

    /// The open line, cloned out from under a short-lived guard.
    fn current(&self) -> Result<Arc<OpenLine>, LineError> {
        self.line.read().clone().ok_or(LineError::NotOpen)
    }

    /// Wrap a device error from an I/O call. A fatal error closes the session,
    /// unless it has already been closed (and maybe reopened) meanwhile.
    fn io_failure(&self, open: &Arc<OpenLine>, error: DeviceError) -> LineError {
        if error.is_fatal() {
            let mut line = self.line.write();
            if line.as_ref().is_some_and(|current| Arc::ptr_eq(current, open)) {
                debug!(line = %open.identifier, "line lost");
                line.take();
            }
        }
        LineError::Io(error)
    }
}

/// Buffers, control block, timeouts, then a full purge.
fn setup(
    device: &dyn DeviceAccess,
    handle: &Handle,
    config: &LineConfig,
) -> Result<(ControlBlock, CommTimeouts), LineError> {
    device
        .setup_buffers(handle, config.max_read_buffer(), config.max_write_buffer())
        .map_err(LineError::Setup)?;
    let control_block = ControlBlock::build(device, handle, config)?;
    let timeouts = CommTimeouts::configure(
        device,
        handle,
        config.read_timeout_ms(),
        config.write_timeout_ms(),
    )?;
    device
        .purge(handle, PurgeFlags::ALL)
        .map_err(LineError::Io)?;
    Ok((control_block, timeouts))
}

impl fmt::Debug for PortSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self.line.read();
        f.debug_struct("PortSession")
            .field("identifier", &line.as_ref().map(|l| l.identifier.as_str()))
            .field("handle", &line.as_ref().map(|l| &l.handle))
            .finish()
    }
}
