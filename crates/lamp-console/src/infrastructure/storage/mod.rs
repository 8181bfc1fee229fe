//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the optional TOML file that supplies the
//! default serial port, baud rate and log level.  A missing file is not an
//! error: the built-in defaults apply.  The console never writes the file.

pub mod config;
