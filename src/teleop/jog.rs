use tracing::debug;

use super::mapping::{AxisMappingTable, Channel, Direction, JogTarget};
use crate::protocol::{Command, JogOptions};
use crate::session::{Mode, SessionState};

/// Activation state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Never activated since the last reset
    #[default]
    Inactive,
    Active(Direction),
    /// Back inside the dead band after an activation
    Zero,
}

/// What one channel produced on a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JogCommand {
    Start { channel: Channel, target: JogTarget },
    Stop { channel: Channel },
}

impl JogCommand {
    pub fn to_command(&self) -> Command {
        match self {
            JogCommand::Start { target, .. } => {
                Command::move_jog(&JogOptions::jog(target.token.clone(), target.coord_type))
            }
            JogCommand::Stop { .. } => Command::stop_jog(),
        }
    }
}

/// Per-channel hysteresis over the sampled axes.
///
/// A channel starts a jog only when it leaves the dead band and emits exactly
/// one stop when it returns. Values that stay outside the band, even with a
/// changed sign, emit nothing.
#[derive(Debug, Clone)]
pub struct JogStateMachine {
    threshold: f32,
    channels: [ChannelState; 6],
    mode: Option<Mode>,
}

impl JogStateMachine {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            channels: [ChannelState::Inactive; 6],
            mode: None,
        }
    }

    pub fn channel_state(&self, channel: Channel) -> ChannelState {
        self.channels[channel.index()]
    }

    pub fn reset(&mut self) {
        self.channels = [ChannelState::Inactive; 6];
    }

    pub fn evaluate(
        &mut self,
        axes: &[f32; 6],
        session: &SessionState,
        table: &AxisMappingTable,
    ) -> Vec<JogCommand> {
        if self.mode != Some(session.mode) {
            if let Some(previous) = self.mode {
                debug!("Mode {} -> {}, resetting channels", previous, session.mode);
            }
            self.reset();
            self.mode = Some(session.mode);
        }

        let mut commands = Vec::new();
        for channel in Channel::ALL {
            let locked = if channel.is_translation() {
                session.translation_locked
            } else {
                session.rotation_locked
            };
            if locked {
                // The stop carrying the lock already halted this channel.
                self.channels[channel.index()] = ChannelState::Inactive;
                continue;
            }
            if let Some(command) = self.step(channel, axes[channel.index()], session.mode, table) {
                commands.push(command);
            }
        }
        commands
    }

    fn step(
        &mut self,
        channel: Channel,
        value: f32,
        mode: Mode,
        table: &AxisMappingTable,
    ) -> Option<JogCommand> {
        let outside = value.abs() > self.threshold;
        let state = &mut self.channels[channel.index()];

        match (*state, outside) {
            (ChannelState::Active(_), true) => None,
            (ChannelState::Active(direction), false) => {
                debug!("{:?} released from {:?}", channel, direction);
                *state = ChannelState::Zero;
                Some(JogCommand::Stop { channel })
            }
            (ChannelState::Inactive | ChannelState::Zero, true) => {
                let direction = Direction::of(value);
                let target = table.target(mode, channel, direction)?;
                debug!("{:?} {:?} -> {}", channel, direction, target.token);
                *state = ChannelState::Active(direction);
                Some(JogCommand::Start { channel, target })
            }
            (ChannelState::Inactive | ChannelState::Zero, false) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teleop::mapping::{AxisAssignment, JogAxis};

    fn joint_session() -> SessionState {
        SessionState {
            enabled: true,
            ..SessionState::with_mode(Mode::Joint)
        }
    }

    fn x(value: f32) -> [f32; 6] {
        [value, 0.0, 0.0, 0.0, 0.0, 0.0]
    }

    fn rendered(commands: &[JogCommand]) -> Vec<String> {
        commands.iter().map(|c| c.to_command().to_string()).collect()
    }

    #[test]
    fn joint_jog_stop_and_restart() {
        let table = AxisMappingTable::default();
        let session = joint_session();
        let mut jog = JogStateMachine::new(0.5);

        let start = jog.evaluate(&x(0.6), &session, &table);
        assert_eq!(
            start,
            vec![JogCommand::Start {
                channel: Channel::X,
                target: JogTarget {
                    token: "J1-".to_string(),
                    coord_type: 0,
                },
            }]
        );
        assert_eq!(rendered(&start), vec!["MoveJog(J1-,coordtype=0)"]);

        let stop = jog.evaluate(&x(0.2), &session, &table);
        assert_eq!(rendered(&stop), vec!["MoveJog()"]);
        assert_eq!(jog.channel_state(Channel::X), ChannelState::Zero);

        let again = jog.evaluate(&x(0.6), &session, &table);
        assert_eq!(rendered(&again), vec!["MoveJog(J1-,coordtype=0)"]);
    }

    #[test]
    fn dead_band_never_emits_and_stop_fires_once() {
        let table = AxisMappingTable::default();
        let session = joint_session();
        let mut jog = JogStateMachine::new(0.5);

        for value in [0.0, 0.3, -0.5, 0.5, 0.49] {
            assert!(jog.evaluate(&x(value), &session, &table).is_empty());
        }
        assert_eq!(jog.channel_state(Channel::X), ChannelState::Inactive);

        assert_eq!(jog.evaluate(&x(0.9), &session, &table).len(), 1);
        for _ in 0..10 {
            assert!(jog.evaluate(&x(0.9), &session, &table).is_empty());
        }
        let mut stops = 0;
        for _ in 0..10 {
            stops += jog.evaluate(&x(0.1), &session, &table).len();
        }
        assert_eq!(stops, 1);
    }

    #[test]
    fn sign_flip_outside_dead_band_does_not_retrigger() {
        let table = AxisMappingTable::default();
        let session = joint_session();
        let mut jog = JogStateMachine::new(0.5);

        assert_eq!(jog.evaluate(&x(0.8), &session, &table).len(), 1);
        assert!(jog.evaluate(&x(-0.8), &session, &table).is_empty());
        assert_eq!(
            jog.channel_state(Channel::X),
            ChannelState::Active(Direction::Positive)
        );
    }

    #[test]
    fn custom_inverse_assignment() {
        let mut table = AxisMappingTable::default();
        table.custom.coord_type = 1;
        table.custom.channels[Channel::Y.index()] = AxisAssignment::inverted(JogAxis::X);
        let session = SessionState::with_mode(Mode::Custom);
        let mut jog = JogStateMachine::new(0.5);

        let positive = jog.evaluate(&[0.0, 0.7, 0.0, 0.0, 0.0, 0.0], &session, &table);
        assert_eq!(rendered(&positive), vec!["MoveJog(X-,coordtype=1)"]);

        jog.evaluate(&[0.0; 6], &session, &table);
        let negative = jog.evaluate(&[0.0, -0.7, 0.0, 0.0, 0.0, 0.0], &session, &table);
        assert_eq!(rendered(&negative), vec!["MoveJog(X+,coordtype=1)"]);
    }

    #[test]
    fn locks_skip_whole_channel_groups() {
        let table = AxisMappingTable::default();
        let session = SessionState {
            translation_locked: true,
            ..SessionState::with_mode(Mode::User)
        };
        let mut jog = JogStateMachine::new(0.5);

        let commands = jog.evaluate(&[0.9, 0.9, 0.9, 0.0, 0.0, -0.9], &session, &table);
        assert_eq!(rendered(&commands), vec!["MoveJog(Rz-,coordtype=1)"]);

        let session = SessionState {
            translation_locked: false,
            rotation_locked: true,
            ..session
        };
        // Yaw is skipped while locked, so its release emits nothing.
        let commands = jog.evaluate(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0], &session, &table);
        assert!(commands.is_empty());
        assert_eq!(jog.channel_state(Channel::Yaw), ChannelState::Inactive);
    }

    #[test]
    fn unlocked_channel_jogs_again_without_passing_the_dead_band() {
        let table = AxisMappingTable::default();
        let free = SessionState::with_mode(Mode::User);
        let locked = SessionState {
            rotation_locked: true,
            ..free
        };
        let mut jog = JogStateMachine::new(0.5);
        let yaw = [0.0, 0.0, 0.0, 0.0, 0.0, -0.9];

        assert_eq!(
            rendered(&jog.evaluate(&yaw, &free, &table)),
            vec!["MoveJog(Rz-,coordtype=1)"]
        );
        assert!(jog.evaluate(&yaw, &locked, &table).is_empty());
        assert!(jog.evaluate(&[0.0; 6], &locked, &table).is_empty());
        assert_eq!(
            rendered(&jog.evaluate(&yaw, &free, &table)),
            vec!["MoveJog(Rz-,coordtype=1)"]
        );
    }

    #[test]
    fn lock_held_through_deflection_restarts_on_unlock() {
        let table = AxisMappingTable::default();
        let free = SessionState::with_mode(Mode::User);
        let locked = SessionState {
            translation_locked: true,
            ..free
        };
        let mut jog = JogStateMachine::new(0.5);

        assert_eq!(jog.evaluate(&[0.0, 0.0, 0.8, 0.0, 0.0, 0.0], &free, &table).len(), 1);
        assert!(jog.evaluate(&[0.0, 0.0, 0.8, 0.0, 0.0, 0.0], &locked, &table).is_empty());
        assert_eq!(
            rendered(&jog.evaluate(&[0.0, 0.0, 0.8, 0.0, 0.0, 0.0], &free, &table)),
            vec!["MoveJog(Z+,coordtype=1)"]
        );
    }

    #[test]
    fn mode_change_resets_channels() {
        let table = AxisMappingTable::default();
        let mut jog = JogStateMachine::new(0.5);
        let joint = joint_session();

        jog.evaluate(&x(0.9), &joint, &table);
        let user = SessionState {
            mode: Mode::User,
            ..joint
        };
        let commands = jog.evaluate(&x(0.9), &user, &table);
        assert_eq!(rendered(&commands), vec!["MoveJog(X+,coordtype=1)"]);
    }

    #[test]
    fn simulation_emits_nothing() {
        let table = AxisMappingTable::default();
        let session = SessionState::with_mode(Mode::Simulation);
        let mut jog = JogStateMachine::new(0.5);

        assert!(jog.evaluate(&[1.0; 6], &session, &table).is_empty());
        assert!(jog.evaluate(&[0.0; 6], &session, &table).is_empty());
    }
}
