//! Serial line protocol: outbound commands and the inbound temperature tag.
//!
//! Wire format: ASCII, one command per line, `\n` terminated, no checksums,
//! no acknowledgements, no versioning.

pub mod commands;
pub mod telemetry;

pub use commands::{CommandParseError, LampCommand};
pub use telemetry::{ScanOutcome, TagScanner, TEMPERATURE_TAG};

/// Terminator appended to every outbound command.
pub const LINE_TERMINATOR: char = '\n';

/// Baud rate the lamp firmware listens at.
pub const DEFAULT_BAUD_RATE: u32 = 9600;
