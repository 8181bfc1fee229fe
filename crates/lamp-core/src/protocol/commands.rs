//! Outbound command vocabulary.
//!
//! ```text
//! AUTO                 switch device to automatic mode
//! MANUAL               switch device to manual mode
//! RGB:r,g,b            set manual color, each channel 0-255 decimal
//! EFFECT:<NAME>        set active effect, NAME in STATIC|BREATH|HEART|STROBE
//! ```
//!
//! [`LampCommand::to_line`] is the only place a command is turned into text,
//! so every call site emits the same spelling.  Parsing is lenient about effect
//! names (`EFFECT:BREATHING` and `EFFECT:BREATH` both decode to
//! [`Effect::Breathing`]) so logs and captured traffic from either spelling can
//! be read back.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::domain::state::{ColorParseError, Effect, EffectParseError, Mode, Rgb};
use crate::protocol::LINE_TERMINATOR;

const RGB_PREFIX: &str = "RGB:";
const EFFECT_PREFIX: &str = "EFFECT:";

/// Errors returned when a line cannot be decoded into a [`LampCommand`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("empty command line")]
    Empty,

    #[error("unknown command: '{0}'")]
    Unknown(String),

    #[error("bad RGB payload: {0}")]
    Color(#[from] ColorParseError),

    #[error("bad EFFECT payload: {0}")]
    Effect(#[from] EffectParseError),
}

/// One command sent from the panel to the lamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LampCommand {
    SetMode(Mode),
    SetColor(Rgb),
    SetEffect(Effect),
}

impl LampCommand {
    /// Returns the command as a newline-terminated wire line.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lamp_core::{Effect, LampCommand, Rgb};
    ///
    /// assert_eq!(LampCommand::SetColor(Rgb::new(255, 0, 16)).to_line(), "RGB:255,0,16\n");
    /// assert_eq!(LampCommand::SetEffect(Effect::Heartbeat).to_line(), "EFFECT:HEART\n");
    /// ```
    pub fn to_line(&self) -> String {
        let mut line = self.to_string();
        line.push(LINE_TERMINATOR);
        line
    }
}

/// Formats the command without its line terminator.
impl fmt::Display for LampCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LampCommand::SetMode(Mode::Auto) => f.write_str("AUTO"),
            LampCommand::SetMode(Mode::Manual) => f.write_str("MANUAL"),
            LampCommand::SetColor(rgb) => write!(f, "{RGB_PREFIX}{rgb}"),
            LampCommand::SetEffect(effect) => write!(f, "{EFFECT_PREFIX}{}", effect.wire_name()),
        }
    }
}

/// Decodes one line; a trailing `\r\n` or `\n` is ignored.
impl FromStr for LampCommand {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim_end_matches(&['\r', '\n'][..]).trim();
        if line.is_empty() {
            return Err(CommandParseError::Empty);
        }

        if let Some(payload) = line.strip_prefix(RGB_PREFIX) {
            if !payload.contains(',') {
                return Err(ColorParseError::InvalidTriple(payload.to_string()).into());
            }
            return Ok(LampCommand::SetColor(payload.parse()?));
        }
        if let Some(payload) = line.strip_prefix(EFFECT_PREFIX) {
            return Ok(LampCommand::SetEffect(payload.parse()?));
        }

        match line {
            "AUTO" => Ok(LampCommand::SetMode(Mode::Auto)),
            "MANUAL" => Ok(LampCommand::SetMode(Mode::Manual)),
            other => Err(CommandParseError::Unknown(other.to_string())),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
