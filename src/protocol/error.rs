use std::time::Duration;

/// Typed outcome for everything that can go wrong between a caller and the
/// robot controller.
///
/// Expected conditions (link down, wrong control mode, controller side error
/// codes) are variants here rather than panics. The type is `Clone` so the
/// same outcome can be handed to the caller and broadcast to observers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RobotError {
    /// Dial failure or dial timeout
    #[error("Connection error: {0}")]
    Connection(String),

    /// Socket failure while a command was in flight
    #[error("Command error: {0}")]
    Command(String),

    /// The controller only accepts commands over TCP in its TCP control mode
    #[error("Controller rejected the command: control mode is not TCP")]
    ControlMode,

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Not connected to the robot controller")]
    NotConnected,

    /// Non-zero error id in the reply line
    #[error("Controller reported error {code}: {reply}")]
    Controller { code: i32, reply: String },

    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// Enable was refused locally because the last status poll saw an alarm
    #[error("Robot alarm is active, ClearError is required before enabling")]
    AlarmActive,

    #[error("Command dispatcher is not running")]
    DispatcherClosed,
}

impl RobotError {
    /// True for failures that took the link down.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            RobotError::Connection(_) | RobotError::Command(_) | RobotError::Timeout(_)
        )
    }
}
