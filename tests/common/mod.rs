//! Shared test utilities for serial line tests.

#![allow(dead_code)]

use serial_line::line::{LineConfig, MockDevice, Parity, PortSession, StopBits};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const LINE: &str = "LINE0";

/// 9600 8N1, 4 KiB buffers, 500 ms timeouts.
pub fn scenario_config() -> LineConfig {
    LineConfig::builder()
        .baud_rate(9600)
        .byte_size(8)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .max_read_buffer(4096)
        .max_write_buffer(4096)
        .read_timeout_ms(500)
        .write_timeout_ms(500)
        .build()
        .expect("scenario config is valid")
}

/// Config with a short read timeout for tests that expect to time out.
pub fn quick_config(read_timeout_ms: u32) -> LineConfig {
    LineConfig::builder()
        .read_timeout_ms(read_timeout_ms)
        .build()
        .expect("quick config is valid")
}

/// A mock device with `LINE` registered and a Closed session on it.
pub fn mock_session() -> (Arc<MockDevice>, PortSession) {
    let device = Arc::new(MockDevice::new().with_line(LINE));
    let session = PortSession::new(device.clone());
    (device, session)
}

/// A mock device with an Open session on `LINE`.
pub fn open_mock_session(config: LineConfig) -> (Arc<MockDevice>, Arc<PortSession>) {
    let (device, session) = mock_session();
    session.open(LINE, config).expect("mock line opens");
    (device, Arc::new(session))
}

/// Block until a reader is parked in the device's completion wait on `LINE`.
pub fn wait_for_blocked_reader(device: &MockDevice) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while device.waiting_readers(LINE) == 0 {
        assert!(Instant::now() < deadline, "no reader blocked on {LINE}");
        thread::sleep(Duration::from_millis(1));
    }
}
