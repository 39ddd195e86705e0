//! Line-specific error types.
//!
//! `DeviceError` is what a device access layer reports for a single raw call.
//! `LineError` is what the session and the translators surface to callers; it
//! records which step of the line lifecycle failed.

use thiserror::Error;

/// Errors reported by a [`DeviceAccess`](super::DeviceAccess) implementation.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No line with this identifier exists.
    #[error("Serial line not found: {0}")]
    NotFound(String),

    /// The line exists but another handle holds it exclusively.
    #[error("Serial line is held by another handle: {0}")]
    Busy(String),

    /// The handle is unknown to the device layer (already released).
    #[error("Unknown or released handle #{0}")]
    InvalidHandle(u64),

    /// The device refused the request.
    #[error("Device rejected the request: {0}")]
    Rejected(String),

    /// A pending operation was cancelled by a purge.
    #[error("Operation aborted by purge")]
    Aborted,

    /// The device went away while the handle was held.
    #[error("Device disconnected")]
    Disconnected,

    /// An I/O error occurred in the device layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl DeviceError {
    /// Create a Rejected error from a message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Whether the error means the line can no longer be used through this handle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

/// Errors that can occur while configuring or operating a serial line.
#[derive(Debug, Error)]
pub enum LineError {
    /// The line configuration is malformed.
    #[error("Invalid line configuration for '{field}': {message}")]
    InvalidConfig { field: &'static str, message: String },

    /// A handle for the line could not be obtained.
    #[error("Could not acquire line '{line}': {source}")]
    Acquisition {
        line: String,
        #[source]
        source: DeviceError,
    },

    /// Sizing the device buffers failed.
    #[error("Buffer setup failed: {0}")]
    Setup(#[source] DeviceError),

    /// Applying the control block or the timeouts failed.
    #[error("Device configuration failed: {0}")]
    DeviceConfig(#[source] DeviceError),

    /// A purge, read, write or completion wait failed.
    #[error("Line I/O failed: {0}")]
    Io(#[source] DeviceError),

    /// Attempted to use a line that is not open.
    #[error("Line is not open")]
    NotOpen,

    /// Attempted to open a session that already holds a line.
    #[error("Line is already open")]
    AlreadyOpen,
}

impl LineError {
    /// Create an InvalidConfig error for a field.
    pub fn invalid_config(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            message: message.into(),
        }
    }

    /// Create an Acquisition error for a line identifier.
    pub fn acquisition(line: impl Into<String>, source: DeviceError) -> Self {
        Self::Acquisition {
            line: line.into(),
            source,
        }
    }

    /// The underlying device error, if this error came from the device layer.
    pub fn device_error(&self) -> Option<&DeviceError> {
        match self {
            Self::Acquisition { source, .. } => Some(source),
            Self::Setup(e) | Self::DeviceConfig(e) | Self::Io(e) => Some(e),
            Self::InvalidConfig { .. } | Self::NotOpen | Self::AlreadyOpen => None,
        }
    }
}
