//! Terminal control surface.
//!
//! Each stdin line is one command.  Lamp commands become [`PanelGesture`]s for
//! the control use case; the rest drive the link or the display.
//!
//! ```text
//! connect [PORT]        open the serial port (PORT overrides the config)
//! disconnect            close it
//! auto | manual         select the mode
//! effect NAME           static, breathing, heartbeat, strobe
//! color #RRGGBB | r,g,b
//! status [--json]
//! ports
//! help
//! quit
//! ```

use lamp_core::{
    ColorParseError, EffectParseError, LampState, Mode, PanelGesture, TemperatureReading,
};
use serde::Serialize;
use thiserror::Error;

use crate::infrastructure::device_link::LinkState;

/// Shown by `help` and after an unknown command.
pub const HELP_TEXT: &str = "\
commands:
  connect [PORT]          open the serial port
  disconnect              close the serial port
  auto | manual           select the lamp mode
  effect NAME             static, breathing, heartbeat or strobe (manual only)
  color #RRGGBB | r,g,b   set the LED color (manual only)
  status [--json]         show temperature, link and lamp state
  ports                   list serial ports
  help                    show this text
  quit                    close the port and exit";

/// Errors from parsing a console line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("unknown command '{0}' (type 'help')")]
    UnknownCommand(String),
    #[error("'{command}' needs an argument: {usage}")]
    MissingArgument {
        command: &'static str,
        usage: &'static str,
    },
    #[error("'{command}' takes no argument '{argument}'")]
    UnexpectedArgument {
        command: &'static str,
        argument: String,
    },
    #[error(transparent)]
    Color(#[from] ColorParseError),
    #[error(transparent)]
    Effect(#[from] EffectParseError),
}

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Connect { port: Option<String> },
    Disconnect,
    Gesture(PanelGesture),
    Status { json: bool },
    Ports,
    Help,
    Quit,
}

/// Parses one line.  Blank lines yield `Ok(None)`.
///
/// Command words are case-insensitive; the rest of the line is the argument,
/// so `color 10, 20, 30` works as well as `color 10,20,30`.
///
/// # Errors
///
/// Returns a [`ConsoleError`] describing what was wrong with the line.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let argument = (!rest.is_empty()).then_some(rest);

    let command = match word.to_ascii_lowercase().as_str() {
        "connect" => ConsoleCommand::Connect {
            port: argument.map(str::to_string),
        },
        "disconnect" => no_argument("disconnect", argument, ConsoleCommand::Disconnect)?,
        "auto" => no_argument(
            "auto",
            argument,
            ConsoleCommand::Gesture(PanelGesture::SelectMode(Mode::Auto)),
        )?,
        "manual" => no_argument(
            "manual",
            argument,
            ConsoleCommand::Gesture(PanelGesture::SelectMode(Mode::Manual)),
        )?,
        "effect" => {
            let name = argument.ok_or(ConsoleError::MissingArgument {
                command: "effect",
                usage: "effect static|breathing|heartbeat|strobe",
            })?;
            ConsoleCommand::Gesture(PanelGesture::SelectEffect(name.parse()?))
        }
        "color" | "colour" => {
            let value = argument.ok_or(ConsoleError::MissingArgument {
                command: "color",
                usage: "color #RRGGBB or color r,g,b",
            })?;
            ConsoleCommand::Gesture(PanelGesture::PickColor(value.parse()?))
        }
        "status" => match argument {
            None => ConsoleCommand::Status { json: false },
            Some("--json") => ConsoleCommand::Status { json: true },
            Some(other) => {
                return Err(ConsoleError::UnexpectedArgument {
                    command: "status",
                    argument: other.to_string(),
                })
            }
        },
        "ports" => no_argument("ports", argument, ConsoleCommand::Ports)?,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => no_argument("quit", argument, ConsoleCommand::Quit)?,
        _ => return Err(ConsoleError::UnknownCommand(word.to_string())),
    };
    Ok(Some(command))
}

fn no_argument(
    command: &'static str,
    argument: Option<&str>,
    parsed: ConsoleCommand,
) -> Result<ConsoleCommand, ConsoleError> {
    match argument {
        None => Ok(parsed),
        Some(argument) => Err(ConsoleError::UnexpectedArgument {
            command,
            argument: argument.to_string(),
        }),
    }
}

/// Everything the status display shows, in one serializable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelSnapshot {
    pub link: LinkState,
    pub mode: Mode,
    /// `#RRGGBB`.
    pub color: String,
    pub effect: String,
    /// `None` until the first reading arrives.
    pub temperature: Option<String>,
}

impl PanelSnapshot {
    pub fn new(link: LinkState, lamp: LampState, temperature: &TemperatureReading) -> Self {
        Self {
            link,
            mode: lamp.mode,
            color: lamp.color.to_hex(),
            effect: lamp.effect.as_str().to_string(),
            temperature: temperature.value().map(str::to_string),
        }
    }

    /// Multi-line human-readable status.
    ///
    /// Color and effect are only listed in manual mode, where they apply.
    pub fn render(&self) -> String {
        let temperature = self
            .temperature
            .as_deref()
            .unwrap_or(TemperatureReading::UNKNOWN_TEXT);
        let mut out = format!(
            "Temperature: {temperature}°C\nLink: {}\nMode: {}",
            link_label(self.link),
            self.mode
        );
        if self.mode == Mode::Manual {
            out.push_str(&format!("\nColor: {}\nEffect: {}", self.color, self.effect));
        }
        out
    }

    /// The snapshot as a single JSON object.
    ///
    /// # Errors
    ///
    /// Propagates the `serde_json` error (not expected for this type).
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn link_label(state: LinkState) -> &'static str {
    match state {
        LinkState::Disconnected => "disconnected",
        LinkState::Connecting => "connecting",
        LinkState::Connected => "connected",
        LinkState::Closing => "closing",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
