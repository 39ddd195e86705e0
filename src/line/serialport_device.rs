//! Device access layer backed by the `serialport` crate.
//!
//! `serialport` exposes settings rather than a raw control block, so the
//! block is synthesised on read and decomposed on write. Bits the crate has
//! no setting for are remembered per handle and reported back unchanged,
//! which keeps the read-modify-write contract of the translator intact.
//!
//! Each handle keeps two clones of the port so a reader blocked in
//! [`await_completion`](DeviceAccess::await_completion) never holds up a writer.
//! A pending read blocks in short slices and checks a per-handle read
//! generation between them, so a `CANCEL_READ` purge or a close aborts it.

use super::control::{flags, ControlBlock};
use super::device::{AccessMode, DeviceAccess, Handle, IoStatus, OperationToken, PurgeFlags};
use super::error::DeviceError;
use super::timeouts::CommTimeouts;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Baud rate used to open a port before its control block is applied.
const INITIAL_BAUD_RATE: u32 = 9600;

/// Longest single blocking read while waiting for a pending read.
const READ_SLICE: Duration = Duration::from_millis(20);

struct PortEntry {
    name: String,
    reader: Mutex<Box<dyn serialport::SerialPort>>,
    writer: Mutex<Box<dyn serialport::SerialPort>>,
    /// Last block written, for the fields `serialport` cannot report.
    last_block: Mutex<Option<ControlBlock>>,
    /// Total read timeout from the applied descriptor.
    read_timeout: Mutex<Duration>,
    /// Bumped by a read cancel or a close; a pending read issued under an
    /// older value is aborted.
    read_generation: AtomicU64,
    /// Pending read token -> read generation at issue time.
    pending_reads: Mutex<HashMap<u64, u64>>,
}

/// `serialport`-backed [`DeviceAccess`].
#[derive(Default)]
pub struct SerialportDevice {
    ports: Mutex<HashMap<u64, Arc<PortEntry>>>,
    next_id: AtomicU64,
}

impl SerialportDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the serial lines present on this system.
    pub fn available_lines() -> Result<Vec<String>, DeviceError> {
        Ok(serialport::available_ports()?
            .into_iter()
            .map(|p| p.port_name)
            .collect())
    }

    fn entry(&self, handle: &Handle) -> Result<Arc<PortEntry>, DeviceError> {
        self.ports
            .lock()
            .get(&handle.raw())
            .cloned()
            .ok_or(DeviceError::InvalidHandle(handle.raw()))
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn data_bits_code(bits: serialport::DataBits) -> u8 {
    match bits {
        serialport::DataBits::Five => 5,
        serialport::DataBits::Six => 6,
        serialport::DataBits::Seven => 7,
        serialport::DataBits::Eight => 8,
    }
}

fn data_bits_from_code(code: u8) -> Result<serialport::DataBits, DeviceError> {
    match code {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(DeviceError::rejected(format!("unsupported byte size {other}"))),
    }
}

fn parity_code(parity: serialport::Parity) -> u8 {
    match parity {
        serialport::Parity::None => 0,
        serialport::Parity::Odd => 1,
        serialport::Parity::Even => 2,
    }
}

fn parity_from_code(code: u8) -> Result<serialport::Parity, DeviceError> {
    match code {
        0 => Ok(serialport::Parity::None),
        1 => Ok(serialport::Parity::Odd),
        2 => Ok(serialport::Parity::Even),
        other => Err(DeviceError::rejected(format!(
            "parity code {other} is not supported by this backend"
        ))),
    }
}

fn stop_bits_code(bits: serialport::StopBits) -> u8 {
    match bits {
        serialport::StopBits::One => 0,
        serialport::StopBits::Two => 2,
    }
}

fn stop_bits_from_code(code: u8) -> Result<serialport::StopBits, DeviceError> {
    match code {
        0 => Ok(serialport::StopBits::One),
        2 => Ok(serialport::StopBits::Two),
        other => Err(DeviceError::rejected(format!(
            "stop bits code {other} is not supported by this backend"
        ))),
    }
}

fn flow_control_flags(flow: serialport::FlowControl) -> u32 {
    match flow {
        serialport::FlowControl::None => 0,
        serialport::FlowControl::Software => flags::OUT_X | flags::IN_X,
        serialport::FlowControl::Hardware => {
            flags::OUTX_CTS_FLOW | (flags::CONTROL_HANDSHAKE << flags::RTS_CONTROL_SHIFT)
        }
    }
}

/// Hardware flow wins over XON/XOFF when both are requested.
fn flow_control_from_flags(word: u32) -> serialport::FlowControl {
    let rts = (word & flags::RTS_CONTROL_MASK) >> flags::RTS_CONTROL_SHIFT;
    if word & flags::OUTX_CTS_FLOW != 0 || rts == flags::CONTROL_HANDSHAKE {
        serialport::FlowControl::Hardware
    } else if word & (flags::OUT_X | flags::IN_X) != 0 {
        serialport::FlowControl::Software
    } else {
        serialport::FlowControl::None
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

/// Repeat `read_slice` until it yields bytes, `deadline` passes, or the read
/// generation moves away from `issued`.
fn read_until(
    deadline: Instant,
    generation: &AtomicU64,
    issued: u64,
    mut read_slice: impl FnMut() -> std::io::Result<usize>,
) -> Result<usize, DeviceError> {
    loop {
        if generation.load(Ordering::Acquire) != issued {
            return Err(DeviceError::Aborted);
        }
        match read_slice() {
            Ok(n) if n > 0 => return Ok(n),
            Ok(_) => {}
            Err(e) if is_timeout(&e) => {}
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                return Err(DeviceError::Disconnected)
            }
            Err(e) => return Err(DeviceError::Io(e)),
        }
        if Instant::now() >= deadline {
            return Ok(0);
        }
    }
}

impl DeviceAccess for SerialportDevice {
    fn open_exclusive(&self, identifier: &str, access: AccessMode) -> Result<Handle, DeviceError> {
        if !(access.read && access.write) {
            return Err(DeviceError::rejected("read/write access is required"));
        }
        let writer = serialport::new(identifier, INITIAL_BAUD_RATE)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => DeviceError::NotFound(identifier.to_string()),
                serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                    DeviceError::NotFound(identifier.to_string())
                }
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    DeviceError::Busy(identifier.to_string())
                }
                _ => DeviceError::Serial(e),
            })?;
        let reader = writer.try_clone()?;

        let id = self.next_id();
        self.ports.lock().insert(
            id,
            Arc::new(PortEntry {
                name: identifier.to_string(),
                reader: Mutex::new(reader),
                writer: Mutex::new(writer),
                last_block: Mutex::new(None),
                read_timeout: Mutex::new(Duration::ZERO),
                read_generation: AtomicU64::new(0),
                pending_reads: Mutex::new(HashMap::new()),
            }),
        );
        debug!(line = identifier, handle = id, "serial port opened");
        Ok(Handle::from_raw(id))
    }

    fn close(&self, handle: Handle) {
        if let Some(entry) = self.ports.lock().remove(&handle.raw()) {
            entry.read_generation.fetch_add(1, Ordering::AcqRel);
            debug!(line = %entry.name, handle = handle.raw(), "serial port closed");
        }
    }

    fn get_control_block(&self, handle: &Handle) -> Result<ControlBlock, DeviceError> {
        let entry = self.entry(handle)?;
        let port = entry.writer.lock();
        let mut block = (*entry.last_block.lock()).unwrap_or_default();

        block.baud_rate = port.baud_rate()?;
        block.byte_size = data_bits_code(port.data_bits()?);
        block.parity = parity_code(port.parity()?);
        block.stop_bits = stop_bits_code(port.stop_bits()?);
        if block.parity != 0 {
            block.flags |= flags::PARITY;
        }
        block.flags |= flags::BINARY | flow_control_flags(port.flow_control()?);
        Ok(block)
    }

    fn set_control_block(&self, handle: &Handle, block: &ControlBlock) -> Result<(), DeviceError> {
        let entry = self.entry(handle)?;
        let mut port = entry.writer.lock();

        port.set_baud_rate(block.baud_rate)?;
        port.set_data_bits(data_bits_from_code(block.byte_size)?)?;
        port.set_parity(parity_from_code(block.parity)?)?;
        port.set_stop_bits(stop_bits_from_code(block.stop_bits)?)?;
        port.set_flow_control(flow_control_from_flags(block.flags))?;

        *entry.last_block.lock() = Some(*block);
        Ok(())
    }

    fn set_timeouts(&self, handle: &Handle, timeouts: &CommTimeouts) -> Result<(), DeviceError> {
        let entry = self.entry(handle)?;
        let read = Duration::from_millis(timeouts.read_total_timeout_constant.into());
        let write = Duration::from_millis(timeouts.write_total_timeout_constant.into());
        entry.reader.lock().set_timeout(read.min(READ_SLICE))?;
        entry.writer.lock().set_timeout(write)?;
        *entry.read_timeout.lock() = read;
        Ok(())
    }

    fn setup_buffers(&self, handle: &Handle, read_size: u32, write_size: u32)
        -> Result<(), DeviceError> {
        // Driver queue sizes are not configurable through serialport.
        self.entry(handle)?;
        trace!(read_size, write_size, "buffer sizing accepted");
        Ok(())
    }

    fn purge(&self, handle: &Handle, purge: PurgeFlags) -> Result<(), DeviceError> {
        let entry = self.entry(handle)?;
        if purge.contains(PurgeFlags::CANCEL_READ) {
            entry.read_generation.fetch_add(1, Ordering::AcqRel);
        }
        let input = purge.intersects(PurgeFlags::READ_DIRECTION);
        let output = purge.intersects(PurgeFlags::WRITE_DIRECTION);
        let which = match (input, output) {
            (true, true) => serialport::ClearBuffer::All,
            (true, false) => serialport::ClearBuffer::Input,
            (false, true) => serialport::ClearBuffer::Output,
            (false, false) => return Ok(()),
        };
        entry.writer.lock().clear(which)?;
        Ok(())
    }

    fn write_async(&self, handle: &Handle, data: &[u8]) -> Result<IoStatus, DeviceError> {
        let entry = self.entry(handle)?;
        entry.writer.lock().write_all(data)?;
        Ok(IoStatus::Complete(data.len()))
    }

    fn read_async(&self, handle: &Handle, buffer: &mut [u8]) -> Result<IoStatus, DeviceError> {
        let entry = self.entry(handle)?;
        let mut port = entry.reader.lock();
        if port.bytes_to_read()? == 0 {
            let token = self.next_id();
            let issued = entry.read_generation.load(Ordering::Acquire);
            entry.pending_reads.lock().insert(token, issued);
            return Ok(IoStatus::Pending(OperationToken::from_raw(token)));
        }
        Ok(IoStatus::Complete(port.read(buffer)?))
    }

    fn await_completion(
        &self,
        handle: &Handle,
        token: OperationToken,
        buffer: &mut [u8],
    ) -> Result<usize, DeviceError> {
        let entry = self.entry(handle)?;
        let Some(issued) = entry.pending_reads.lock().remove(&token.raw()) else {
            // Writes complete as soon as they are issued.
            return Ok(0);
        };
        let timeout = *entry.read_timeout.lock();
        let mut port = entry.reader.lock();
        trace!(?token, ?timeout, "waiting for pending read");
        read_until(
            Instant::now() + timeout,
            &entry.read_generation,
            issued,
            || port.read(buffer),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_not_found_error() {
        let device = SerialportDevice::new();
        let result =
            device.open_exclusive("/dev/nonexistent_line_12345", AccessMode::READ_WRITE_OVERLAPPED);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_handle() {
        let device = SerialportDevice::new();
        let result = device.purge(&Handle::from_raw(42), PurgeFlags::ALL);
        assert!(matches!(result, Err(DeviceError::InvalidHandle(42))));
    }

    #[test]
    fn test_code_mappings() {
        assert_eq!(data_bits_code(data_bits_from_code(7).unwrap()), 7);
        assert_eq!(parity_code(parity_from_code(1).unwrap()), 1);
        assert_eq!(stop_bits_code(stop_bits_from_code(2).unwrap()), 2);
        assert!(parity_from_code(3).is_err());
        assert!(stop_bits_from_code(1).is_err());
        assert!(data_bits_from_code(9).is_err());
    }

    #[test]
    fn test_pending_read_returns_first_bytes() {
        let generation = AtomicU64::new(3);
        let mut calls = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        let result = read_until(deadline, &generation, 3, || {
            calls += 1;
            if calls < 3 {
                Err(std::io::ErrorKind::TimedOut.into())
            } else {
                Ok(4)
            }
        });
        assert_eq!(result.unwrap(), 4);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_pending_read_times_out_with_zero() {
        let generation = AtomicU64::new(0);
        let deadline = Instant::now() + Duration::from_millis(30);
        let result = read_until(deadline, &generation, 0, || {
            std::thread::sleep(Duration::from_millis(5));
            Err(std::io::ErrorKind::TimedOut.into())
        });
        assert_eq!(result.unwrap(), 0);
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn test_cancel_aborts_pending_read() {
        let generation = AtomicU64::new(0);
        let deadline = Instant::now() + Duration::from_secs(5);
        let started = Instant::now();
        let result = read_until(deadline, &generation, 0, || {
            // A cancel lands while this slice is blocked.
            generation.fetch_add(1, Ordering::AcqRel);
            Err(std::io::ErrorKind::TimedOut.into())
        });
        assert!(matches!(result, Err(DeviceError::Aborted)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_stale_read_aborted_before_blocking() {
        let generation = AtomicU64::new(2);
        let deadline = Instant::now() + Duration::from_secs(5);
        let result = read_until(deadline, &generation, 1, || panic!("read issued after cancel"));
        assert!(matches!(result, Err(DeviceError::Aborted)));
    }

    #[test]
    fn test_broken_pipe_is_disconnect() {
        let generation = AtomicU64::new(0);
        let deadline = Instant::now() + Duration::from_secs(5);
        let result = read_until(deadline, &generation, 0, || {
            Err(std::io::ErrorKind::BrokenPipe.into())
        });
        assert!(matches!(result, Err(DeviceError::Disconnected)));
    }

    #[test]
    fn test_flow_control_mapping() {
        let handshake = flags::OUTX_CTS_FLOW | (0x02 << flags::RTS_CONTROL_SHIFT);
        assert_eq!(
            flow_control_from_flags(handshake | flags::OUT_X),
            serialport::FlowControl::Hardware
        );
        assert_eq!(
            flow_control_from_flags(flags::IN_X),
            serialport::FlowControl::Software
        );
        assert_eq!(flow_control_from_flags(0), serialport::FlowControl::None);
        assert_eq!(
            flow_control_from_flags(flow_control_flags(serialport::FlowControl::Hardware)),
            serialport::FlowControl::Hardware
        );
    }
}
