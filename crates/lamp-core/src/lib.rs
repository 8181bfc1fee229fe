//! # lamp-core
//!
//! Shared library for the RGB lamp console containing the lamp domain model
//! and the serial line protocol spoken with the lamp's microcontroller.
//!
//! It has zero dependencies on serial ports, terminals, or async runtimes.
//!
//! # Architecture overview (for beginners)
//!
//! The lamp is an RGB LED driven by a small microcontroller.  The board
//! listens on a serial port for short text commands (`AUTO`, `MANUAL`,
//! `RGB:255,0,0`, `EFFECT:BREATH`) and periodically prints a temperature
//! reading (`TEMP:23.5`).  A control panel on the host lets the user switch
//! between automatic and manual mode, pick a color, and pick an effect.
//!
//! This crate is the shared foundation.  It defines:
//!
//! - **`domain`** – The lamp state (mode, color, effect), the last known
//!   temperature, and the rules that turn a user gesture on the panel into
//!   the commands that must be sent.
//!
//! - **`protocol`** – How commands become bytes on the wire, and how the
//!   temperature tag is found in whatever chunks of text the device sends
//!   back.

pub mod domain;
pub mod protocol;

pub use domain::panel::{ControlPanel, PanelGesture};
pub use domain::state::{
    ColorParseError, Effect, EffectParseError, LampState, Mode, Rgb, TemperatureReading,
};
pub use protocol::commands::{CommandParseError, LampCommand};
pub use protocol::telemetry::{ScanOutcome, TagScanner};
