//! Application layer use cases for the console.
//!
//! # What use cases does the console have?
//!
//! - **`control_lamp`** – Applies a panel gesture to the lamp state and sends
//!   the resulting command lines, in order, through a [`control_lamp::CommandSink`].
//!   The sink is the device link in production and a mock in tests.

pub mod control_lamp;
