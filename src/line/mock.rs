//! In-memory device access layer for testing.
//!
//! Provides a `MockDevice` that simulates a set of named serial lines without
//! requiring hardware. It enforces exclusive handles, keeps a control-block
//! snapshot per line, records every buffer/timeout/purge/write call, and can
//! be told to fail the next call of a given kind.
//!
//! Incoming bytes come from two places:
//! - [`MockDevice::inject`] puts bytes straight into the driver's input buffer
//!   and wakes a blocked reader. A purge of the input buffer discards them.
//! - [`MockDevice::transmit`] queues a chunk "on the wire"; it lands in the
//!   input buffer when the next read is issued, i.e. after that read's purge.

use super::control::{flags, ControlBlock};
use super::device::{AccessMode, DeviceAccess, Handle, IoStatus, OperationToken, PurgeFlags};
use super::error::DeviceError;
use super::timeouts::CommTimeouts;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Device calls that can be made to fail once via [`MockDevice::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Open,
    SetupBuffers,
    GetControlBlock,
    SetControlBlock,
    SetTimeouts,
    Purge,
    Write,
    Read,
    Await,
}

/// Control-block snapshot a fresh mock line reports.
///
/// Carries bits the translator does not own (DSR sensitivity, XON/XOFF
/// enable, error char replacement, high reserved bits) so tests can check
/// they survive a rebuild.
pub fn factory_control_block() -> ControlBlock {
    ControlBlock {
        baud_rate: 1200,
        flags: flags::DSR_SENSITIVITY
            | flags::OUT_X
            | flags::IN_X
            | flags::ERROR_CHAR
            | (0x01 << flags::DTR_CONTROL_SHIFT)
            | 0x0001_8000,
        reserved: 0x5A5A,
        xon_lim: 2048,
        xoff_lim: 512,
        byte_size: 7,
        parity: 2,
        stop_bits: 0,
        xon_char: 0x11,
        xoff_char: 0x13,
        error_char: 0x3F,
        eof_char: 0x1A,
        evt_char: 0x0A,
        reserved1: 0xA5A5,
        ..ControlBlock::default()
    }
}

#[derive(Debug)]
struct MockLine {
    control_block: ControlBlock,
    timeouts: Option<CommTimeouts>,
    buffers: Option<(u32, u32)>,
    input: VecDeque<u8>,
    wire: VecDeque<Vec<u8>>,
    write_log: Vec<Vec<u8>>,
    purge_log: Vec<PurgeFlags>,
    control_block_writes: usize,
    holder: Option<u64>,
    acquisitions: usize,
    releases: usize,
    read_generation: u64,
    /// Readers blocked in `await_completion`.
    waiting: usize,
    disconnected: bool,
}

impl MockLine {
    fn new() -> Self {
        Self {
            control_block: factory_control_block(),
            timeouts: None,
            buffers: None,
            input: VecDeque::new(),
            wire: VecDeque::new(),
            write_log: Vec::new(),
            purge_log: Vec::new(),
            control_block_writes: 0,
            holder: None,
            acquisitions: 0,
            releases: 0,
            read_generation: 0,
            waiting: 0,
            disconnected: false,
        }
    }

    fn drain_into(&mut self, buffer: &mut [u8]) -> usize {
        let n = buffer.len().min(self.input.len());
        for (slot, byte) in buffer.iter_mut().zip(self.input.drain(..n)) {
            *slot = byte;
        }
        n
    }
}

#[derive(Debug, Default)]
struct MockState {
    lines: HashMap<String, MockLine>,
    /// Handle id -> line name.
    handles: HashMap<u64, String>,
    /// Pending read token -> (line name, read generation at issue time).
    pending_reads: HashMap<u64, (String, u64)>,
    failures: HashSet<FailPoint>,
    next_id: u64,
    stray_closes: usize,
    loopback: bool,
}

impl MockState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn take_failure(&mut self, point: FailPoint) -> Result<(), DeviceError> {
        if self.failures.remove(&point) {
            Err(DeviceError::rejected(format!("injected {point:?} failure")))
        } else {
            Ok(())
        }
    }

    fn line_for(&mut self, handle: &Handle) -> Result<(&str, &mut MockLine), DeviceError> {
        let name = self
            .handles
            .get(&handle.raw())
            .ok_or(DeviceError::InvalidHandle(handle.raw()))?;
        let line = self
            .lines
            .get_mut(name)
            .ok_or(DeviceError::InvalidHandle(handle.raw()))?;
        if line.disconnected {
            return Err(DeviceError::Disconnected);
        }
        Ok((name.as_str(), line))
    }
}

/// Mock device access layer.
///
/// Cheap to clone; clones share the same simulated lines.
///
/// # Example
/// ```
/// use serial_line::line::{AccessMode, DeviceAccess, MockDevice};
///
/// let device = MockDevice::new().with_line("LINE0");
/// let handle = device.open_exclusive("LINE0", AccessMode::READ_WRITE_OVERLAPPED).unwrap();
/// assert!(device.open_exclusive("LINE0", AccessMode::READ_WRITE_OVERLAPPED).is_err());
/// device.close(handle);
/// assert_eq!(device.releases("LINE0"), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
    data_ready: Arc<Condvar>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a line named `identifier`.
    pub fn with_line(self, identifier: impl Into<String>) -> Self {
        self.add_line(identifier);
        self
    }

    /// Echo every write back onto the wire of the same line.
    pub fn with_loopback(self) -> Self {
        self.state.lock().loopback = true;
        self
    }

    pub fn add_line(&self, identifier: impl Into<String>) {
        self.state
            .lock()
            .lines
            .insert(identifier.into(), MockLine::new());
    }

    /// Replace the control block a line reports.
    pub fn set_snapshot(&self, identifier: &str, block: ControlBlock) {
        if let Some(line) = self.state.lock().lines.get_mut(identifier) {
            line.control_block = block;
        }
    }

    /// Make the next call of the given kind fail with `DeviceError::Rejected`.
    pub fn fail_next(&self, point: FailPoint) {
        self.state.lock().failures.insert(point);
    }

    /// Mark a line as gone; every call through its handle reports `Disconnected`.
    pub fn disconnect(&self, identifier: &str) {
        if let Some(line) = self.state.lock().lines.get_mut(identifier) {
            line.disconnected = true;
        }
        self.data_ready.notify_all();
    }

    /// Put bytes into the input buffer now and wake a waiting reader.
    pub fn inject(&self, identifier: &str, data: &[u8]) {
        if let Some(line) = self.state.lock().lines.get_mut(identifier) {
            line.input.extend(data);
        }
        self.data_ready.notify_all();
    }

    /// Queue a chunk that arrives when the next read is issued.
    pub fn transmit(&self, identifier: &str, data: &[u8]) {
        if let Some(line) = self.state.lock().lines.get_mut(identifier) {
            line.wire.push_back(data.to_vec());
        }
    }

    pub fn is_held(&self, identifier: &str) -> bool {
        self.inspect(identifier, |l| l.holder.is_some())
            .unwrap_or(false)
    }

    pub fn acquisitions(&self, identifier: &str) -> usize {
        self.inspect(identifier, |l| l.acquisitions).unwrap_or(0)
    }

    pub fn releases(&self, identifier: &str) -> usize {
        self.inspect(identifier, |l| l.releases).unwrap_or(0)
    }

    /// Number of `close` calls with a handle that was not held.
    pub fn stray_closes(&self) -> usize {
        self.state.lock().stray_closes
    }

    /// The line's current control block.
    pub fn control_block(&self, identifier: &str) -> Option<ControlBlock> {
        self.inspect(identifier, |l| l.control_block)
    }

    pub fn control_block_writes(&self, identifier: &str) -> usize {
        self.inspect(identifier, |l| l.control_block_writes)
            .unwrap_or(0)
    }

    pub fn timeouts(&self, identifier: &str) -> Option<CommTimeouts> {
        self.inspect(identifier, |l| l.timeouts).flatten()
    }

    /// Read and write buffer sizes last requested for the line.
    pub fn buffers(&self, identifier: &str) -> Option<(u32, u32)> {
        self.inspect(identifier, |l| l.buffers).flatten()
    }

    pub fn purge_log(&self, identifier: &str) -> Vec<PurgeFlags> {
        self.inspect(identifier, |l| l.purge_log.clone())
            .unwrap_or_default()
    }

    pub fn write_log(&self, identifier: &str) -> Vec<Vec<u8>> {
        self.inspect(identifier, |l| l.write_log.clone())
            .unwrap_or_default()
    }

    /// Readers currently blocked waiting for input on the line.
    pub fn waiting_readers(&self, identifier: &str) -> usize {
        self.inspect(identifier, |l| l.waiting).unwrap_or(0)
    }

    /// Bytes sitting in the input buffer.
    pub fn pending_input(&self, identifier: &str) -> usize {
        self.inspect(identifier, |l| l.input.len()).unwrap_or(0)
    }

    fn inspect<T>(&self, identifier: &str, f: impl FnOnce(&MockLine) -> T) -> Option<T> {
        self.state.lock().lines.get(identifier).map(f)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock()
    }
}

impl DeviceAccess for MockDevice {
    fn open_exclusive(&self, identifier: &str, access: AccessMode) -> Result<Handle, DeviceError> {
        let mut state = self.lock();
        state.take_failure(FailPoint::Open)?;
        if !(access.read && access.write) {
            return Err(DeviceError::rejected("mock lines require read/write access"));
        }
        let id = state.next_id();
        let line = state
            .lines
            .get_mut(identifier)
            .ok_or_else(|| DeviceError::NotFound(identifier.to_string()))?;
        if line.holder.is_some() {
            return Err(DeviceError::Busy(identifier.to_string()));
        }
        line.holder = Some(id);
        line.acquisitions += 1;
        line.disconnected = false;
        state.handles.insert(id, identifier.to_string());
        Ok(Handle::from_raw(id))
    }

    fn close(&self, handle: Handle) {
        let mut state = self.lock();
        let Some(name) = state.handles.remove(&handle.raw()) else {
            state.stray_closes += 1;
            return;
        };
        if let Some(line) = state.lines.get_mut(&name) {
            line.holder = None;
            line.releases += 1;
            // Anything still pending on this handle is aborted.
            line.read_generation += 1;
        }
        drop(state);
        self.data_ready.notify_all();
    }

    fn get_control_block(&self, handle: &Handle) -> Result<ControlBlock, DeviceError> {
        let mut state = self.lock();
        state.take_failure(FailPoint::GetControlBlock)?;
        let (_, line) = state.line_for(handle)?;
        Ok(line.control_block)
    }

    fn set_control_block(&self, handle: &Handle, block: &ControlBlock) -> Result<(), DeviceError> {
        let mut state = self.lock();
        state.take_failure(FailPoint::SetControlBlock)?;
        let (_, line) = state.line_for(handle)?;
        line.control_block = *block;
        line.control_block_writes += 1;
        Ok(())
    }

    fn set_timeouts(&self, handle: &Handle, timeouts: &CommTimeouts) -> Result<(), DeviceError> {
        let mut state = self.lock();
        state.take_failure(FailPoint::SetTimeouts)?;
        let (_, line) = state.line_for(handle)?;
        line.timeouts = Some(*timeouts);
        Ok(())
    }

    fn setup_buffers(
        &self,
        handle: &Handle,
        read_size: u32,
        write_size: u32,
    ) -> Result<(), DeviceError> {
        let mut state = self.lock();
        state.take_failure(FailPoint::SetupBuffers)?;
        let (_, line) = state.line_for(handle)?;
        line.buffers = Some((read_size, write_size));
        Ok(())
    }

    fn purge(&self, handle: &Handle, flags: PurgeFlags) -> Result<(), DeviceError> {
        let mut state = self.lock();
        state.take_failure(FailPoint::Purge)?;
        let (_, line) = state.line_for(handle)?;
        line.purge_log.push(flags);
        if flags.contains(PurgeFlags::CLEAR_INPUT) {
            line.input.clear();
        }
        if flags.contains(PurgeFlags::CANCEL_READ) {
            line.read_generation += 1;
        }
        drop(state);
        if flags.contains(PurgeFlags::CANCEL_READ) {
            self.data_ready.notify_all();
        }
        Ok(())
    }

    fn write_async(&self, handle: &Handle, data: &[u8]) -> Result<IoStatus, DeviceError> {
        let mut state = self.lock();
        state.take_failure(FailPoint::Write)?;
        let loopback = state.loopback;
        let (_, line) = state.line_for(handle)?;
        line.write_log.push(data.to_vec());
        if loopback {
            line.wire.push_back(data.to_vec());
        }
        let token = state.next_id();
        Ok(IoStatus::Pending(OperationToken::from_raw(token)))
    }

    fn read_async(&self, handle: &Handle, buffer: &mut [u8]) -> Result<IoStatus, DeviceError> {
        let mut state = self.lock();
        state.take_failure(FailPoint::Read)?;
        let (name, line) = state.line_for(handle)?;
        if let Some(chunk) = line.wire.pop_front() {
            line.input.extend(chunk);
        }
        if !line.input.is_empty() {
            return Ok(IoStatus::Complete(line.drain_into(buffer)));
        }
        let pending = (name.to_string(), line.read_generation);
        let token = state.next_id();
        state.pending_reads.insert(token, pending);
        Ok(IoStatus::Pending(OperationToken::from_raw(token)))
    }

    fn await_completion(
        &self,
        handle: &Handle,
        token: OperationToken,
        buffer: &mut [u8],
    ) -> Result<usize, DeviceError> {
        let mut state = self.lock();
        state.take_failure(FailPoint::Await)?;
        let Some((name, generation)) = state.pending_reads.remove(&token.raw()) else {
            // Writes complete as soon as they are issued.
            return Ok(0);
        };
        let timeout = state
            .line_for(handle)?
            .1
            .timeouts
            .map(|t| Duration::from_millis(t.read_total_timeout_constant.into()));
        let deadline = timeout.map(|t| Instant::now() + t);

        if let Some(line) = state.lines.get_mut(&name) {
            line.waiting += 1;
        }
        let result = self.wait_for_input(&mut state, &name, generation, deadline, buffer);
        if let Some(line) = state.lines.get_mut(&name) {
            line.waiting -= 1;
        }
        result
    }
}

impl MockDevice {
    fn wait_for_input(
        &self,
        state: &mut MutexGuard<'_, MockState>,
        name: &str,
        generation: u64,
        deadline: Option<Instant>,
        buffer: &mut [u8],
    ) -> Result<usize, DeviceError> {
        loop {
            let line = state
                .lines
                .get_mut(name)
                .ok_or(DeviceError::Disconnected)?;
            if line.disconnected {
                return Err(DeviceError::Disconnected);
            }
            if line.read_generation != generation {
                return Err(DeviceError::Aborted);
            }
            if !line.input.is_empty() {
                return Ok(line.drain_into(buffer));
            }
            match deadline {
                Some(deadline) => {
                    if self.data_ready.wait_until(state, deadline).timed_out() {
                        let line = state
                            .lines
                            .get_mut(name)
                            .ok_or(DeviceError::Disconnected)?;
                        return Ok(line.drain_into(buffer));
                    }
                }
                None => self.data_ready.wait(state),
            }
        }
    }
}
