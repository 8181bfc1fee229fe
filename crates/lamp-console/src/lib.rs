//! lamp-console library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does lamp-console do? (for beginners)
//!
//! The console is the host-side control panel for an RGB lamp whose LED is
//! driven by a microcontroller on a serial port.  It:
//!
//! 1. Opens the serial port on request and starts one background task that
//!    reads whatever the board prints.
//! 2. Picks `TEMP:<number>` readings out of that output and keeps the latest
//!    one for display.
//! 3. Turns panel gestures typed at the terminal (mode, effect, color) into
//!    the text commands the firmware understands and writes them to the port.
//!
//! There is no acknowledgement from the device: what the panel shows is what
//! was sent.

/// Application layer: use cases for the console.
pub mod application;

/// Infrastructure layer: serial device link, configuration, terminal surface.
pub mod infrastructure;
