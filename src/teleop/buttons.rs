use serde::{Deserialize, Serialize};

use crate::protocol::{Arg, Command};

/// One-shot action bound to a device button.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum ButtonAction {
    #[default]
    None,
    ToggleTool,
    RunPose(String),
    CycleMode,
    Raw(String),
    Home,
    ClearError,
    /// `EnableRobot()`, for when the link came back without the arm enabled
    Enable,
}

/// End effector driven by [`ButtonAction::ToggleTool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EndEffector {
    #[default]
    Sucker,
    FlexGripper,
    ServoGripper,
}

impl EndEffector {
    pub fn command(self, engaged: bool) -> Command {
        match self {
            EndEffector::Sucker => {
                Command::new("SetSucker", vec![Arg::Int(i64::from(engaged))])
            }
            EndEffector::FlexGripper => Command::new(
                "FlexGripperSetState",
                vec![Arg::Int(if engaged { 1 } else { -1 })],
            ),
            EndEffector::ServoGripper => Command::new(
                "ServoGripperSetState",
                vec![Arg::Int(i64::from(engaged))],
            ),
        }
    }
}

/// Rising-edge detector for one button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonChannel {
    pub pressed: bool,
    /// The current press already fired
    pub debounced: bool,
}

impl ButtonChannel {
    /// Returns true exactly once per press.
    pub fn update(&mut self, pressed: bool) -> bool {
        self.pressed = pressed;
        if !pressed {
            self.debounced = false;
            return false;
        }
        if self.debounced {
            return false;
        }
        self.debounced = true;
        true
    }
}

#[derive(Debug, Clone)]
pub struct ButtonDispatcher {
    channels: [ButtonChannel; 2],
    actions: [ButtonAction; 2],
}

impl ButtonDispatcher {
    pub fn new(actions: [ButtonAction; 2]) -> Self {
        Self {
            channels: [ButtonChannel::default(); 2],
            actions,
        }
    }

    /// Actions whose button went down this tick, in button order.
    pub fn evaluate(&mut self, buttons: &[bool; 2]) -> Vec<ButtonAction> {
        self.channels
            .iter_mut()
            .zip(buttons)
            .zip(&self.actions)
            .filter_map(|((channel, pressed), action)| {
                (channel.update(*pressed) && *action != ButtonAction::None).then(|| action.clone())
            })
            .collect()
    }
}
