//! Serial Line Library
//!
//! Exclusive, overlapped access to a single serial line: a validated line
//! configuration is translated into the device control block and timeout
//! descriptor, and a session performs purge-before-operate reads and writes.
//!
//! # Modules
//!
//! - `line`: configuration, control-block and timeout translation, the
//!   device access layer trait with its mock and `serialport` backends, and
//!   the line session
//! - `config`: TOML application configuration with environment overrides

pub mod config;
pub mod line;

pub use line::{LineConfig, LineError, PortSession, ReadOutcome};
