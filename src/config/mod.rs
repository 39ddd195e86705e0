//! Configuration module for serial-line.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_LINE_CONFIG` environment variable (explicit path)
//! 2. `./serial-line.toml` (current directory)
//! 3. `serial-line.toml` in the platform config directory
//!    (`~/.config/serial-line/` on Linux, `%APPDATA%\serial-line\config\` on Windows)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `SERIAL_LINE_<SECTION>_<KEY>`
//!
//! Examples:
//! - `SERIAL_LINE_LINE_IDENTIFIER=COM4`
//! - `SERIAL_LINE_LINE_BAUD_RATE=115200`
//! - `SERIAL_LINE_LINE_READ_TIMEOUT_MS=50`
//! - `SERIAL_LINE_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_line::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let line = loader.line_config()?;
//! println!("{} at {} baud", loader.config().line.identifier, line.baud_rate());
//! # Ok::<(), serial_line::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LineSection, LogFormat, LoggingConfig};
