//! Tests against a real serial line.
//!
//! Built only with the `hardware-tests` feature and skipped unless a line is
//! named in the environment.
//!
//! ```bash
//! export SERIAL_LINE_TEST_PORT=COM3        # or /dev/ttyUSB0
//! export SERIAL_LINE_TEST_LOOPBACK=1       # if TX and RX are bridged
//! cargo test --features hardware-tests --test hardware
//! ```

#![cfg(feature = "hardware-tests")]

use serial_line::line::{LineConfig, LineError, PortSession, ReadOutcome, SerialportDevice};
use serial_test::serial;
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn test_port() -> Option<String> {
    let port = env::var("SERIAL_LINE_TEST_PORT").ok();
    if port.is_none() {
        println!("Skipping hardware test: SERIAL_LINE_TEST_PORT not set");
    }
    port
}

fn loopback_enabled() -> bool {
    env::var("SERIAL_LINE_TEST_LOOPBACK").ok().as_deref() == Some("1")
}

fn config(read_timeout_ms: u32) -> LineConfig {
    LineConfig::builder()
        .read_timeout_ms(read_timeout_ms)
        .build()
        .unwrap()
}

#[test]
#[serial]
fn test_listed_lines() {
    let lines = SerialportDevice::available_lines().unwrap();
    println!("Found {} line(s): {lines:?}", lines.len());
}

#[test]
#[serial]
fn test_open_close_reopen() {
    let Some(port) = test_port() else { return };
    let session = PortSession::new(Arc::new(SerialportDevice::new()));

    session.open(&port, config(100)).unwrap();
    assert!(session.is_open());
    session.close();
    assert!(!session.is_open());

    session.open(&port, config(100)).unwrap();
    session.close();
}

#[test]
#[serial]
fn test_second_session_is_refused() {
    let Some(port) = test_port() else { return };
    let device = Arc::new(SerialportDevice::new());
    let first = PortSession::open_with(device.clone(), &port, config(100)).unwrap();

    let second = PortSession::new(Arc::new(SerialportDevice::new()));
    let result = second.open(&port, config(100));
    // Exclusivity is enforced by the OS; some platforms allow shared opens.
    if let Err(err) = result {
        assert!(matches!(err, LineError::Acquisition { .. }));
    }
    first.close();
}

#[test]
#[serial]
fn test_silent_line_times_out() {
    let Some(port) = test_port() else { return };
    if loopback_enabled() {
        return;
    }
    let session = PortSession::open_with(Arc::new(SerialportDevice::new()), &port, config(200))
        .unwrap();

    let mut buffer = [0u8; 64];
    let started = Instant::now();
    let outcome = session.read(&mut buffer).unwrap();
    if outcome.is_timeout() {
        assert!(started.elapsed() >= Duration::from_millis(150));
    }
}

#[test]
#[serial]
fn test_loopback_echo() {
    let Some(port) = test_port() else { return };
    if !loopback_enabled() {
        println!("Skipping loopback test: SERIAL_LINE_TEST_LOOPBACK not set");
        return;
    }
    let session = Arc::new(
        PortSession::open_with(Arc::new(SerialportDevice::new()), &port, config(1000)).unwrap(),
    );

    // Reads purge their input first, so the reader must be waiting before the write.
    let reader = {
        let session = Arc::clone(&session);
        std::thread::spawn(move || {
            let mut buffer = [0u8; 64];
            session.read(&mut buffer).map(|outcome| (outcome, buffer))
        })
    };
    std::thread::sleep(Duration::from_millis(100));
    session.write(b"AT\r\n").unwrap();

    match reader.join().unwrap().unwrap() {
        (ReadOutcome::Received(n), buffer) => assert!(b"AT\r\n".starts_with(&buffer[..n])),
        (ReadOutcome::TimeoutNoData, _) => panic!("loopback returned nothing"),
    }
}
