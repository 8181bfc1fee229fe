//! Lamp state value types.
//!
//! [`LampState`] mirrors what the panel has *sent* to the device, not what the
//! device has confirmed: the protocol carries no acknowledgements.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a color string cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorParseError {
    /// Not a `#RRGGBB` hex color.
    #[error("invalid hex color '{0}': expected #RRGGBB")]
    InvalidHex(String),
    /// Not a `r,g,b` triple of decimal values in 0–255.
    #[error("invalid color triple '{0}': expected r,g,b with each channel 0-255")]
    InvalidTriple(String),
}

/// Error returned when an effect name is not recognised.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown effect '{0}': expected static, breathing, heartbeat or strobe")]
pub struct EffectParseError(pub String);

// ── Mode ──────────────────────────────────────────────────────────────────────

/// Lamp operating mode.
///
/// In `Auto` the firmware drives the LED on its own; color and effect
/// gestures are ignored by the panel.  In `Manual` the panel's color and
/// effect are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Auto,
    Manual,
}

impl Mode {
    /// Lowercase display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Auto => "auto",
            Mode::Manual => "manual",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Effect ────────────────────────────────────────────────────────────────────

/// Lighting effect applied in manual mode.
///
/// This is the single source of truth for effect names.  [`Effect::wire_name`]
/// is the only spelling ever written to the device; [`FromStr`] accepts both
/// the short wire names and the long words so that either spelling typed by a
/// user (or echoed by older firmware) maps to the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    #[default]
    Static,
    Breathing,
    Heartbeat,
    Strobe,
}

impl Effect {
    /// Every effect, in panel order.
    pub const ALL: [Effect; 4] = [
        Effect::Static,
        Effect::Breathing,
        Effect::Heartbeat,
        Effect::Strobe,
    ];

    /// Name used in `EFFECT:<NAME>` commands.
    pub fn wire_name(self) -> &'static str {
        match self {
            Effect::Static => "STATIC",
            Effect::Breathing => "BREATH",
            Effect::Heartbeat => "HEART",
            Effect::Strobe => "STROBE",
        }
    }

    /// Lowercase canonical name shown to the user.
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::Static => "static",
            Effect::Breathing => "breathing",
            Effect::Heartbeat => "heartbeat",
            Effect::Strobe => "strobe",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Effect {
    type Err = EffectParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STATIC" => Ok(Effect::Static),
            "BREATH" | "BREATHING" => Ok(Effect::Breathing),
            "HEART" | "HEARTBEAT" => Ok(Effect::Heartbeat),
            "STROBE" => Ok(Effect::Strobe),
            _ => Err(EffectParseError(s.trim().to_string())),
        }
    }
}

// ── Color ─────────────────────────────────────────────────────────────────────

/// An 8-bit-per-channel RGB color.
///
/// Channels are `u8`, so the 0–255 range of the `RGB:r,g,b` command is
/// enforced by the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const RED: Rgb = Rgb::new(0xFF, 0x00, 0x00);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses a `#RRGGBB` (or `RRGGBB`) hex color, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`ColorParseError::InvalidHex`] if the string is not exactly six
    /// hex digits after the optional `#`.
    pub fn from_hex(s: &str) -> Result<Self, ColorParseError> {
        let digits = s.trim().trim_start_matches('#');
        let invalid = || ColorParseError::InvalidHex(s.trim().to_string());
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Formats the color as uppercase `#RRGGBB`.
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Rgb::RED
    }
}

/// Formats as the decimal `r,g,b` triple used on the wire.
impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.r, self.g, self.b)
    }
}

/// Accepts either `#RRGGBB` or a decimal `r,g,b` triple.
impl FromStr for Rgb {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.contains(',') {
            return Rgb::from_hex(s);
        }

        let invalid = || ColorParseError::InvalidTriple(s.to_string());
        let channels: Vec<u8> = s
            .split(',')
            .map(|part| part.trim().parse::<u8>().map_err(|_| invalid()))
            .collect::<Result<_, _>>()?;
        match channels.as_slice() {
            [r, g, b] => Ok(Rgb::new(*r, *g, *b)),
            _ => Err(invalid()),
        }
    }
}

// ── Aggregate state ───────────────────────────────────────────────────────────

/// The panel's view of the lamp: what was last sent, not what was confirmed.
///
/// `color` and `effect` are only meaningful (and only ever sent) while
/// `mode == Mode::Manual`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LampState {
    pub mode: Mode,
    pub color: Rgb,
    pub effect: Effect,
}

// ── Temperature ───────────────────────────────────────────────────────────────

/// The last temperature the device reported.
///
/// Holds the numeric text exactly as received (e.g. `"23.5"`), in whatever
/// unit the firmware is configured for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TemperatureReading {
    /// No well-formed reading has arrived yet.
    #[default]
    Unknown,
    /// The most recent well-formed reading.
    Value(String),
}

impl TemperatureReading {
    /// Placeholder rendered before the first reading.
    pub const UNKNOWN_TEXT: &'static str = "--";

    /// Returns the numeric text, or `None` before the first reading.
    pub fn value(&self) -> Option<&str> {
        match self {
            TemperatureReading::Unknown => None,
            TemperatureReading::Value(v) => Some(v),
        }
    }
}

impl fmt::Display for TemperatureReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value().unwrap_or(Self::UNKNOWN_TEXT))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
