//! Infrastructure layer for the console application.
//!
//! Contains OS-facing adapters: the serial device link, configuration file
//! loading, and the terminal control surface.
//!
//! **Dependency rule**: this layer may depend on `application` and `lamp_core`,
//! but MUST NOT be imported by the `application` layer or by `lamp_core`.
//!
//! # Sub-modules
//!
//! - **`device_link`** – Owns the serial connection lifecycle (open, close),
//!   the single-writer write path, and the background read loop that extracts
//!   temperature readings.  A `MockPortOpener` is provided for tests and for
//!   `--dry-run`.
//!
//! - **`storage`** – Reads the optional TOML configuration file.
//!
//! - **`console`** – Parses terminal commands into panel gestures and renders
//!   the panel status.

pub mod console;
pub mod device_link;
pub mod storage;
