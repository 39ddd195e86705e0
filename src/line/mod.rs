//! Serial line access.
//!
//! Translates a [`LineConfig`] into the native control block and timeout
//! descriptor, and drives one exclusive [`PortSession`] over a pluggable
//! [`DeviceAccess`] layer.

pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod mock;
pub mod serialport_device;
pub mod session;
pub mod timeouts;

pub use config::{LineConfig, LineConfigBuilder, Parity, StopBits};
pub use control::ControlBlock;
pub use device::{AccessMode, DeviceAccess, Handle, IoStatus, OperationToken, PurgeFlags};
pub use error::{DeviceError, LineError};
pub use mock::{FailPoint, MockDevice};
pub use serialport_device::SerialportDevice;
pub use session::{PortSession, ReadOutcome};
pub use timeouts::CommTimeouts;
