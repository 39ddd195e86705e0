//! Call-order tests against a strict device backend.
//!
//! The backend is a mockall mock, so every device call the session makes has
//! to be expected, in order, with the expected arguments.

mod common;

use common::{scenario_config, LINE};
use mockall::{mock, Sequence};
use serial_line::line::{
    AccessMode, CommTimeouts, ControlBlock, DeviceAccess, DeviceError, Handle, IoStatus,
    LineError, OperationToken, PortSession, PurgeFlags, ReadOutcome,
};
use std::sync::Arc;

mock! {
    pub Backend {}

    impl DeviceAccess for Backend {
        fn open_exclusive(&self, identifier: &str, access: AccessMode) -> Result<Handle, DeviceError>;
        fn close(&self, handle: Handle);
        fn get_control_block(&self, handle: &Handle) -> Result<ControlBlock, DeviceError>;
        fn set_control_block(&self, handle: &Handle, block: &ControlBlock) -> Result<(), DeviceError>;
        fn set_timeouts(&self, handle: &Handle, timeouts: &CommTimeouts) -> Result<(), DeviceError>;
        fn setup_buffers(&self, handle: &Handle, read_size: u32, write_size: u32) -> Result<(), DeviceError>;
        fn purge(&self, handle: &Handle, flags: PurgeFlags) -> Result<(), DeviceError>;
        fn write_async(&self, handle: &Handle, data: &[u8]) -> Result<IoStatus, DeviceError>;
        fn read_async(&self, handle: &Handle, buffer: &mut [u8]) -> Result<IoStatus, DeviceError>;
        fn await_completion(
            &self,
            handle: &Handle,
            token: OperationToken,
            buffer: &mut [u8],
        ) -> Result<usize, DeviceError>;
    }
}

const RAW: u64 = 7;

/// Expect the full, successful open sequence on `backend`.
fn expect_open(backend: &mut MockBackend, seq: &mut Sequence) {
    backend
        .expect_open_exclusive()
        .withf(|name, access| name == LINE && *access == AccessMode::READ_WRITE_OVERLAPPED)
        .times(1)
        .in_sequence(seq)
        .returning(|_, _| Ok(Handle::from_raw(RAW)));
    backend
        .expect_setup_buffers()
        .withf(|handle, read, write| handle.raw() == RAW && *read == 4096 && *write == 4096)
        .times(1)
        .in_sequence(seq)
        .returning(|_, _, _| Ok(()));
    backend
        .expect_get_control_block()
        .times(1)
        .in_sequence(seq)
        .returning(|_| Ok(ControlBlock::default()));
    backend
        .expect_set_control_block()
        .withf(|_, block| block.baud_rate == 9600 && block.byte_size == 8 && block.is_binary())
        .times(1)
        .in_sequence(seq)
        .returning(|_, _| Ok(()));
    backend
        .expect_set_timeouts()
        .withf(|_, timeouts| *timeouts == CommTimeouts::new(500, 500))
        .times(1)
        .in_sequence(seq)
        .returning(|_, _| Ok(()));
    backend
        .expect_purge()
        .withf(|_, flags| *flags == PurgeFlags::ALL)
        .times(1)
        .in_sequence(seq)
        .returning(|_, _| Ok(()));
}

#[test]
fn test_open_runs_setup_in_order_then_close_releases() {
    let mut seq = Sequence::new();
    let mut backend = MockBackend::new();
    expect_open(&mut backend, &mut seq);
    backend
        .expect_close()
        .withf(|handle| handle.raw() == RAW)
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());

    let session = PortSession::new(Arc::new(backend));
    session.open(LINE, scenario_config()).unwrap();
    session.close();
    drop(session);
}

#[test]
fn test_timeout_failure_releases_without_purging() {
    let mut seq = Sequence::new();
    let mut backend = MockBackend::new();
    backend
        .expect_open_exclusive()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(Handle::from_raw(RAW)));
    backend
        .expect_setup_buffers()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _| Ok(()));
    backend
        .expect_get_control_block()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(ControlBlock::default()));
    backend
        .expect_set_control_block()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    backend
        .expect_set_timeouts()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(DeviceError::rejected("timeouts refused")));
    backend
        .expect_close()
        .withf(|handle| handle.raw() == RAW)
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    backend.expect_purge().never();

    let session = PortSession::new(Arc::new(backend));
    let err = session.open(LINE, scenario_config()).unwrap_err();
    assert!(matches!(err, LineError::DeviceConfig(DeviceError::Rejected(_))));
    assert!(!session.is_open());
}

#[test]
fn test_acquisition_failure_makes_no_further_calls() {
    let mut backend = MockBackend::new();
    backend
        .expect_open_exclusive()
        .times(1)
        .returning(|name, _| Err(DeviceError::Busy(name.to_string())));
    backend.expect_setup_buffers().never();
    backend.expect_close().never();

    let session = PortSession::new(Arc::new(backend));
    let err = session.open(LINE, scenario_config()).unwrap_err();
    assert!(matches!(
        err,
        LineError::Acquisition { source: DeviceError::Busy(_), .. }
    ));
}

#[test]
fn test_write_purges_then_issues_without_waiting() {
    let mut seq = Sequence::new();
    let mut backend = MockBackend::new();
    expect_open(&mut backend, &mut seq);
    backend
        .expect_purge()
        .withf(|_, flags| *flags == PurgeFlags::WRITE_DIRECTION)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    backend
        .expect_write_async()
        .withf(|_, data| data == b"ping".as_slice())
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(IoStatus::Pending(OperationToken::from_raw(1))));
    backend.expect_await_completion().never();
    backend.expect_close().times(1).return_const(());

    let session = PortSession::new(Arc::new(backend));
    session.open(LINE, scenario_config()).unwrap();
    session.write(b"ping").unwrap();
}

#[test]
fn test_immediate_read_completion_skips_wait() {
    let mut seq = Sequence::new();
    let mut backend = MockBackend::new();
    expect_open(&mut backend, &mut seq);
    backend
        .expect_purge()
        .withf(|_, flags| *flags == PurgeFlags::READ_DIRECTION)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    backend
        .expect_read_async()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, buffer| {
            buffer[..3].copy_from_slice(b"abc");
            Ok(IoStatus::Complete(3))
        });
    backend.expect_await_completion().never();
    backend.expect_close().times(1).return_const(());

    let session = PortSession::new(Arc::new(backend));
    session.open(LINE, scenario_config()).unwrap();

    let mut buffer = [0u8; 8];
    assert_eq!(session.read(&mut buffer).unwrap(), ReadOutcome::Received(3));
    assert_eq!(&buffer[..3], b"abc");
}

#[test]
fn test_pending_read_waits_on_its_token() {
    let mut seq = Sequence::new();
    let mut backend = MockBackend::new();
    expect_open(&mut backend, &mut seq);
    backend
        .expect_purge()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    backend
        .expect_read_async()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(IoStatus::Pending(OperationToken::from_raw(42))));
    backend
        .expect_await_completion()
        .withf(|handle, token, _| handle.raw() == RAW && token.raw() == 42)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _| Ok(0));
    backend.expect_close().times(1).return_const(());

    let session = PortSession::new(Arc::new(backend));
    session.open(LINE, scenario_config()).unwrap();

    let mut buffer = [0u8; 8];
    assert_eq!(session.read(&mut buffer).unwrap(), ReadOutcome::TimeoutNoData);
}
