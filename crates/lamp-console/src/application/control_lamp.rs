//! ControlLampUseCase: sends the commands produced by panel gestures.
//!
//! This use case sits at the application layer and delegates the actual
//! write to a [`CommandSink`] trait object.  The serial implementation lives
//! in the infrastructure layer.

use std::io;
use std::sync::Arc;

use lamp_core::{ControlPanel, LampCommand, LampState, PanelGesture};
use thiserror::Error;
use tracing::{debug, warn};

/// Error type for gesture dispatch.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Writing a command line failed.  Lines after it in the same burst were
    /// not sent.
    #[error("failed to send '{command}': {source}")]
    Send {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Destination for outbound command lines.
#[cfg_attr(test, mockall::automock)]
pub trait CommandSink: Send + Sync {
    /// Writes one newline-terminated line.
    ///
    /// Implementations that are not connected return `Ok(())` without
    /// writing anything.
    fn send_line(&self, line: &str) -> io::Result<()>;
}

/// The Control Lamp use case.
///
/// Owns the [`ControlPanel`] (and therefore the mode, color and effect) and
/// ships whatever it decides to the sink.
pub struct ControlLampUseCase {
    sink: Arc<dyn CommandSink>,
    panel: ControlPanel,
}

impl ControlLampUseCase {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self {
            sink,
            panel: ControlPanel::new(),
        }
    }

    /// Current lamp state as last sent.
    pub fn state(&self) -> LampState {
        self.panel.state()
    }

    /// Applies `gesture` and sends its commands in order.
    ///
    /// Returns the commands that were sent; empty when the gesture is ignored
    /// in the current mode.  The state change is kept even when a write fails.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Send`] for the first line the sink rejects.
    pub fn handle(&mut self, gesture: PanelGesture) -> Result<Vec<LampCommand>, ControlError> {
        let commands = self.panel.apply(gesture);
        if commands.is_empty() {
            debug!(?gesture, mode = %self.panel.state().mode, "gesture ignored");
            return Ok(commands);
        }

        for command in &commands {
            if let Err(source) = self.sink.send_line(&command.to_line()) {
                warn!("could not send {command}: {source}");
                return Err(ControlError::Send {
                    command: command.to_string(),
                    source,
                });
            }
            debug!("sent {command}");
        }
        Ok(commands)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
