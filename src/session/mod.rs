//! Operator session and control surface
//!
//! [`RobotSession`] bundles the transport, the dispatcher handle and the
//! session state receiver. Everything that changes [`SessionState`] travels
//! as a [`SessionEffect`] on a dispatched command, so the state only ever
//! reflects what the controller accepted.

mod state;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::dispatcher::CommandDispatcher;
use crate::protocol::{Command, JogOptions, Reply, RobotError};
use crate::transport::{ConnectionState, Transport};

pub use state::{Mode, Pose, RobotMode, SessionEffect, SessionState};

pub struct RobotSession {
    transport: Arc<Transport>,
    dispatcher: CommandDispatcher,
    address: String,
    skip_simulation: bool,
}

impl RobotSession {
    pub fn new(dispatcher: CommandDispatcher, address: impl Into<String>, skip_simulation: bool) -> Self {
        Self {
            transport: dispatcher.transport().clone(),
            dispatcher,
            address: address.into(),
            skip_simulation,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn state(&self) -> SessionState {
        *self.dispatcher.session().borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.dispatcher.session()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub async fn connect(&self) -> Result<(), RobotError> {
        self.transport.connect(&self.address).await
    }

    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
    }

    /// Sends `EnableRobot()` every time the link comes up, including links
    /// restored by the reconnect supervisor. A control mode rejection is
    /// reported once and not retried until the next connection.
    pub fn spawn_auto_enable(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let session = Arc::clone(self);
        let mut state_rx = self.transport.subscribe();
        tokio::spawn(async move {
            let mut was_connected = false;
            loop {
                let connected = *state_rx.borrow_and_update() == ConnectionState::Connected;
                if connected && !was_connected {
                    match session.enable().await {
                        Ok(_) => {}
                        Err(RobotError::ControlMode) => error!(
                            "Robot refused EnableRobot: switch the controller to TCP control mode"
                        ),
                        Err(e) => warn!("Failed to enable robot after connecting: {}", e),
                    }
                }
                was_connected = connected;

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Enables the arm. Refused locally while an alarm is latched.
    ///
    /// A controller outside TCP control mode answers with
    /// [`RobotError::ControlMode`]; the enabled flag stays as it was.
    pub async fn enable(&self) -> Result<Reply, RobotError> {
        if self.state().alarm {
            warn!("Enable refused, alarm is active");
            return Err(RobotError::AlarmActive);
        }
        let reply = self
            .dispatcher
            .submit(Command::enable_robot(), Some(SessionEffect::Enabled(true)))
            .await?;
        info!("Robot enabled");
        Ok(reply)
    }

    pub async fn disable(&self) -> Result<Reply, RobotError> {
        let reply = self
            .dispatcher
            .submit(Command::disable_robot(), Some(SessionEffect::Enabled(false)))
            .await?;
        info!("Robot disabled");
        Ok(reply)
    }

    pub async fn clear_error(&self) -> Result<Reply, RobotError> {
        self.dispatcher
            .submit(Command::clear_error(), Some(SessionEffect::ClearAlarm))
            .await
    }

    pub async fn home(&self) -> Result<Reply, RobotError> {
        self.dispatcher.submit(Command::home(), None).await
    }

    pub async fn move_joint_absolute(&self, joints: [f64; 6]) -> Result<Reply, RobotError> {
        self.dispatcher
            .submit(Command::move_joint_absolute(joints), None)
            .await
    }

    pub async fn move_jog(&self, options: &JogOptions) -> Result<Reply, RobotError> {
        self.dispatcher.submit(Command::move_jog(options), None).await
    }

    pub async fn stop_jog(&self) -> Result<Reply, RobotError> {
        self.dispatcher.submit(Command::stop_jog(), None).await
    }

    pub async fn send_raw_command(&self, text: &str) -> Result<Reply, RobotError> {
        self.dispatcher.submit(Command::raw(text), None).await
    }

    pub async fn get_pose(&self) -> Result<Pose, RobotError> {
        let reply = self.dispatcher.submit(Command::get_pose(), None).await?;
        Ok(Pose::from(six_values(&reply)?))
    }

    pub async fn get_joint_angles(&self) -> Result<[f64; 6], RobotError> {
        let reply = self.dispatcher.submit(Command::get_angle(), None).await?;
        six_values(&reply)
    }

    /// Polls `RobotMode()` and latches the alarm flag from it.
    pub async fn get_mode(&self) -> Result<RobotMode, RobotError> {
        let reply = self
            .dispatcher
            .submit(Command::robot_mode(), Some(SessionEffect::AlarmFromStatus))
            .await?;
        RobotMode::from_reply(&reply).ok_or(RobotError::MalformedReply(reply.raw))
    }

    /// Switches the jog mode. The stop that carries the change halts any
    /// jog still running in the old mode.
    pub async fn set_mode(&self, mode: Mode) -> Result<Reply, RobotError> {
        let reply = self
            .dispatcher
            .submit(Command::stop_jog(), Some(SessionEffect::Mode(mode)))
            .await?;
        info!("Mode set to {}", mode);
        Ok(reply)
    }

    pub async fn cycle_mode(&self) -> Result<Mode, RobotError> {
        let next = self.state().mode.next(self.skip_simulation);
        self.set_mode(next).await?;
        Ok(next)
    }

    pub async fn set_translation_lock(&self, locked: bool) -> Result<Reply, RobotError> {
        self.dispatcher
            .submit(Command::stop_jog(), Some(SessionEffect::TranslationLock(locked)))
            .await
    }

    pub async fn set_rotation_lock(&self, locked: bool) -> Result<Reply, RobotError> {
        self.dispatcher
            .submit(Command::stop_jog(), Some(SessionEffect::RotationLock(locked)))
            .await
    }
}

fn six_values(reply: &Reply) -> Result<[f64; 6], RobotError> {
    let values = reply.floats()?;
    <[f64; 6]>::try_from(values).map_err(|_| RobotError::MalformedReply(reply.raw.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_values_rejects_short_groups() {
        let reply = Reply::parse("0,{1,2,3},GetAngle();").unwrap();
        assert!(matches!(
            six_values(&reply),
            Err(RobotError::MalformedReply(_))
        ));

        let reply = Reply::parse("0,{1,2,3,4,5,6},GetAngle();").unwrap();
        assert_eq!(six_values(&reply).unwrap(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
