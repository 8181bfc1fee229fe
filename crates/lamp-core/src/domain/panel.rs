//! ControlPanel: turns user gestures into lamp state changes and commands.
//!
//! # Gesture rules
//!
//! | Gesture        | State change               | Commands                         |
//! |----------------|----------------------------|----------------------------------|
//! | select mode M  | `mode = M`                 | `AUTO` / `MANUAL`, always        |
//! | select effect  | manual only: `effect = E`  | `EFFECT:<E>`                     |
//! | pick color     | manual only: `color = C`   | `RGB:r,g,b`, then `EFFECT:<cur>` |
//!
//! Selecting the mode that is already active re-sends the mode command, which
//! lets the user nudge a device that missed the first one.  Color and effect
//! gestures while in `Auto` change nothing and send nothing.

use crate::domain::state::{Effect, LampState, Mode, Rgb};
use crate::protocol::commands::LampCommand;

/// A single user interaction with the control panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelGesture {
    /// One of the AUTO / MANUAL buttons.
    SelectMode(Mode),
    /// One of the effect buttons.
    SelectEffect(Effect),
    /// A new value from the color picker.
    PickColor(Rgb),
}

/// Owns the [`LampState`] and applies gestures to it.
///
/// The panel is the only writer of the intent fields (mode, color, effect).
#[derive(Debug, Clone, Default)]
pub struct ControlPanel {
    state: LampState,
}

impl ControlPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LampState {
        self.state
    }

    /// Whether color and effect gestures are currently accepted.
    pub fn accepts_color_and_effect(&self) -> bool {
        self.state.mode == Mode::Manual
    }

    /// Applies `gesture` and returns the commands to send, in order.
    ///
    /// An empty vector means the gesture was ignored in the current mode.
    pub fn apply(&mut self, gesture: PanelGesture) -> Vec<LampCommand> {
        match gesture {
            PanelGesture::SelectMode(mode) => {
                self.state.mode = mode;
                vec![LampCommand::SetMode(mode)]
            }
            PanelGesture::SelectEffect(effect) => {
                if !self.accepts_color_and_effect() {
                    return Vec::new();
                }
                self.state.effect = effect;
                vec![LampCommand::SetEffect(effect)]
            }
            PanelGesture::PickColor(color) => {
                if !self.accepts_color_and_effect() {
                    return Vec::new();
                }
                self.state.color = color;
                // Every color is followed by the current effect.
                vec![
                    LampCommand::SetColor(color),
                    LampCommand::SetEffect(self.state.effect),
                ]
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_panel() -> ControlPanel {
        let mut panel = ControlPanel::new();
        panel.apply(PanelGesture::SelectMode(Mode::Manual));
        panel
    }

    #[test]
    fn test_select_auto_while_auto_resends_and_keeps_mode() {
        // Arrange
        let mut panel = ControlPanel::new();

        // Act
        let cmds = panel.apply(PanelGesture::SelectMode(Mode::Auto));

        // Assert
        assert_eq!(cmds, vec![LampCommand::SetMode(Mode::Auto)]);
        assert_eq!(panel.state().mode, Mode::Auto);
    }

    #[test]
    fn test_select_manual_switches_mode() {
        let mut panel = ControlPanel::new();
        let cmds = panel.apply(PanelGesture::SelectMode(Mode::Manual));
        assert_eq!(cmds, vec![LampCommand::SetMode(Mode::Manual)]);
        assert!(panel.accepts_color_and_effect());
    }

    #[test]
    fn test_effect_gesture_in_auto_is_ignored() {
        // Arrange
        let mut panel = ControlPanel::new();

        // Act
        let cmds = panel.apply(PanelGesture::SelectEffect(Effect::Strobe));

        // Assert
        assert!(cmds.is_empty());
        assert_eq!(panel.state().effect, Effect::Static);
    }

    #[test]
    fn test_color_gesture_in_auto_is_ignored() {
        let mut panel = ControlPanel::new();
        let cmds = panel.apply(PanelGesture::PickColor(Rgb::new(0, 0, 255)));
        assert!(cmds.is_empty());
        assert_eq!(panel.state().color, Rgb::RED);
    }

    #[test]
    fn test_effect_gesture_in_manual_updates_effect_and_sends_one_command() {
        let mut panel = manual_panel();
        let cmds = panel.apply(PanelGesture::SelectEffect(Effect::Heartbeat));
        assert_eq!(cmds, vec![LampCommand::SetEffect(Effect::Heartbeat)]);
        assert_eq!(panel.state().effect, Effect::Heartbeat);
    }

    #[test]
    fn test_color_gesture_sends_color_then_current_effect() {
        // Arrange
        let mut panel = manual_panel();
        panel.apply(PanelGesture::SelectEffect(Effect::Breathing));

        // Act
        let cmds = panel.apply(PanelGesture::PickColor(Rgb::new(1, 2, 3)));

        // Assert
        assert_eq!(
            cmds,
            vec![
                LampCommand::SetColor(Rgb::new(1, 2, 3)),
                LampCommand::SetEffect(Effect::Breathing),
            ]
        );
        assert_eq!(panel.state().color, Rgb::new(1, 2, 3));
    }

    #[test]
    fn test_switching_back_to_auto_keeps_manual_choices() {
        let mut panel = manual_panel();
        panel.apply(PanelGesture::SelectEffect(Effect::Strobe));
        panel.apply(PanelGesture::PickColor(Rgb::new(9, 9, 9)));

        panel.apply(PanelGesture::SelectMode(Mode::Auto));

        let state = panel.state();
        assert_eq!(state.mode, Mode::Auto);
        assert_eq!(state.effect, Effect::Strobe);
        assert_eq!(state.color, Rgb::new(9, 9, 9));
    }
}
