use serde::{Deserialize, Serialize};
use std::fmt;

use crate::protocol::Reply;

/// Coordinate mode the teleop loop jogs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Mode {
    Simulation,
    Joint,
    #[default]
    User,
    Tool,
    Custom,
}

impl Mode {
    /// `Joint -> User -> Tool -> Custom -> Joint`, detouring through
    /// `Simulation` after `Custom` unless it is skipped.
    pub fn next(self, skip_simulation: bool) -> Mode {
        match self {
            Mode::Joint => Mode::User,
            Mode::User => Mode::Tool,
            Mode::Tool => Mode::Custom,
            Mode::Custom if skip_simulation => Mode::Joint,
            Mode::Custom => Mode::Simulation,
            Mode::Simulation => Mode::Joint,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Simulation => "Simulation",
            Mode::Joint => "Joint",
            Mode::User => "User",
            Mode::Tool => "Tool",
            Mode::Custom => "Custom",
        };
        write!(f, "{}", name)
    }
}

/// Status reported by `RobotMode()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobotMode {
    Init,
    BrakeOpen,
    PowerOff,
    Disabled,
    Enabled,
    Backdrive,
    Running,
    SingleMove,
    Error,
    Pause,
    Collision,
    Unknown(i32),
}

impl From<i32> for RobotMode {
    fn from(value: i32) -> Self {
        match value {
            1 => RobotMode::Init,
            2 => RobotMode::BrakeOpen,
            3 => RobotMode::PowerOff,
            4 => RobotMode::Disabled,
            5 => RobotMode::Enabled,
            6 => RobotMode::Backdrive,
            7 => RobotMode::Running,
            8 => RobotMode::SingleMove,
            9 => RobotMode::Error,
            10 => RobotMode::Pause,
            11 => RobotMode::Collision,
            other => RobotMode::Unknown(other),
        }
    }
}

impl RobotMode {
    pub fn from_reply(reply: &Reply) -> Option<RobotMode> {
        let value = reply.values.first()?.parse::<f64>().ok()?;
        Some(RobotMode::from(value as i32))
    }

    pub fn is_alarm(self) -> bool {
        self == RobotMode::Error
    }
}

/// Cartesian tool pose from `GetPose()`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

impl From<[f64; 6]> for Pose {
    fn from([x, y, z, rx, ry, rz]: [f64; 6]) -> Self {
        Self { x, y, z, rx, ry, rz }
    }
}

/// Shared operator session state. Only changed by [`SessionEffect`]s of
/// successfully dispatched commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub enabled: bool,
    pub mode: Mode,
    pub translation_locked: bool,
    pub rotation_locked: bool,
    /// Set when the last status poll reported the error mode
    pub alarm: bool,
}

impl SessionState {
    pub fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

/// State change riding on a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEffect {
    Enabled(bool),
    Mode(Mode),
    TranslationLock(bool),
    RotationLock(bool),
    /// `ClearError()` succeeded
    ClearAlarm,
    /// Read the alarm flag out of a `RobotMode()` reply
    AlarmFromStatus,
}

impl SessionEffect {
    pub fn apply(self, state: &mut SessionState, reply: &Reply) {
        match self {
            SessionEffect::Enabled(enabled) => state.enabled = enabled,
            SessionEffect::Mode(mode) => state.mode = mode,
            SessionEffect::TranslationLock(locked) => state.translation_locked = locked,
            SessionEffect::RotationLock(locked) => state.rotation_locked = locked,
            SessionEffect::ClearAlarm => state.alarm = false,
            SessionEffect::AlarmFromStatus => {
                if let Some(mode) = RobotMode::from_reply(reply) {
                    state.alarm = mode.is_alarm();
                    if mode == RobotMode::Disabled {
                        state.enabled = false;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_cycle_skips_simulation_by_default() {
        let mut mode = Mode::Joint;
        let mut seen = Vec::new();
        for _ in 0..5 {
            mode = mode.next(true);
            seen.push(mode);
        }
        assert_eq!(
            seen,
            vec![Mode::User, Mode::Tool, Mode::Custom, Mode::Joint, Mode::User]
        );
        assert_eq!(Mode::Custom.next(false), Mode::Simulation);
        assert_eq!(Mode::Simulation.next(false), Mode::Joint);
    }

    #[test]
    fn status_reply_sets_and_clears_alarm() {
        let mut state = SessionState {
            enabled: true,
            ..SessionState::default()
        };
        let error = Reply::parse("0,{9},RobotMode();").unwrap();
        SessionEffect::AlarmFromStatus.apply(&mut state, &error);
        assert!(state.alarm);

        SessionEffect::ClearAlarm.apply(&mut state, &Reply::parse("0,{},ClearError();").unwrap());
        assert!(!state.alarm);

        let disabled = Reply::parse("0,{4},RobotMode();").unwrap();
        SessionEffect::AlarmFromStatus.apply(&mut state, &disabled);
        assert!(!state.alarm);
        assert!(!state.enabled);
    }

    #[test]
    fn unknown_robot_modes_are_kept() {
        assert_eq!(RobotMode::from(42), RobotMode::Unknown(42));
        assert_eq!(RobotMode::from(5), RobotMode::Enabled);
    }
}
