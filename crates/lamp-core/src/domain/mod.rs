//! Domain entities for the RGB lamp console.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What lives here? (for beginners)
//!
//! - **`state`** – Value types: the operating [`state::Mode`], the
//!   [`state::Rgb`] color triple, the canonical [`state::Effect`] enum, the
//!   aggregate [`state::LampState`], and the [`state::TemperatureReading`]
//!   reported by the device.
//!
//! - **`panel`** – The [`panel::ControlPanel`], which owns a `LampState` and
//!   decides, for each user gesture, how the state changes and which
//!   commands must go out on the wire.
//!
//! Nothing in here knows that a serial port exists.  The console crate feeds
//! gestures in and ships the resulting commands out.

pub mod panel;
pub mod state;
