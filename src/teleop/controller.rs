use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::buttons::{ButtonAction, ButtonDispatcher, EndEffector};
use super::jog::JogStateMachine;
use super::mapping::AxisMappingTable;
use super::poses::PoseLibrary;
use crate::dispatcher::CommandSink;
use crate::input::InputSnapshot;
use crate::protocol::Command;
use crate::session::{SessionEffect, SessionState};

#[derive(Debug, Clone)]
pub struct TeleopSettings {
    pub tick_interval: Duration,
    pub threshold: f32,
    pub skip_simulation: bool,
    pub end_effector: EndEffector,
    pub buttons: [ButtonAction; 2],
    pub mapping: AxisMappingTable,
    pub poses: PoseLibrary,
}

impl Default for TeleopSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            threshold: 0.5,
            skip_simulation: true,
            end_effector: EndEffector::Sucker,
            buttons: [ButtonAction::ToggleTool, ButtonAction::Home],
            mapping: AxisMappingTable::default(),
            poses: PoseLibrary::default(),
        }
    }
}

/// Fixed-period control loop: six channels then two buttons per tick, every
/// produced command handed to the sink.
pub struct TeleopController<S: CommandSink> {
    sink: S,
    snapshot_rx: watch::Receiver<InputSnapshot>,
    session_rx: watch::Receiver<SessionState>,
    jog: JogStateMachine,
    buttons: ButtonDispatcher,
    settings: TeleopSettings,
    tool_engaged: bool,
}

impl<S: CommandSink + 'static> TeleopController<S> {
    pub fn new(
        sink: S,
        snapshot_rx: watch::Receiver<InputSnapshot>,
        session_rx: watch::Receiver<SessionState>,
        settings: TeleopSettings,
    ) -> Self {
        Self {
            sink,
            snapshot_rx,
            session_rx,
            jog: JogStateMachine::new(settings.threshold),
            buttons: ButtonDispatcher::new(settings.buttons.clone()),
            settings,
            tool_engaged: false,
        }
    }

    pub fn spawn(mut self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(&mut self, cancel: CancellationToken) {
        info!(
            "Starting teleop loop with {:?} interval, threshold {}",
            self.settings.tick_interval, self.settings.threshold
        );
        let mut ticker = interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut ticks: u64 = 0;
        let mut commands: u64 = 0;
        let mut last_log_time = Instant::now();
        let log_interval = Duration::from_secs(10);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    commands += self.tick() as u64;
                    ticks += 1;
                }
            }

            if last_log_time.elapsed() >= log_interval {
                info!(
                    "Teleop stats: {} ticks, {} commands in last {} seconds",
                    ticks,
                    commands,
                    log_interval.as_secs()
                );
                ticks = 0;
                commands = 0;
                last_log_time = Instant::now();
            }
        }

        info!("Teleop loop stopped");
    }

    /// Runs one evaluation and returns how many commands it produced.
    pub fn tick(&mut self) -> usize {
        let snapshot = *self.snapshot_rx.borrow();
        let session = *self.session_rx.borrow();
        let mut produced = 0;

        if session.enabled {
            for jog in self
                .jog
                .evaluate(&snapshot.axes, &session, &self.settings.mapping)
            {
                self.sink.enqueue(jog.to_command());
                produced += 1;
            }
        } else {
            // Disabling halts motion on the controller side, nothing to stop.
            self.jog.reset();
        }

        for action in self.buttons.evaluate(&snapshot.buttons) {
            produced += self.handle_action(action, &session);
        }

        produced
    }

    fn handle_action(&mut self, action: ButtonAction, session: &SessionState) -> usize {
        debug!("Button action {:?}", action);
        match action {
            ButtonAction::None => 0,
            ButtonAction::ToggleTool => {
                self.tool_engaged = !self.tool_engaged;
                info!(
                    "{:?} {}",
                    self.settings.end_effector,
                    if self.tool_engaged { "engaged" } else { "released" }
                );
                self.sink
                    .enqueue(self.settings.end_effector.command(self.tool_engaged));
                1
            }
            ButtonAction::RunPose(name) => match self.settings.poses.commands(&name) {
                Some(steps) => {
                    info!("Running pose sequence '{}' ({} steps)", name, steps.len());
                    let count = steps.len();
                    for step in steps {
                        self.sink.enqueue(step);
                    }
                    count
                }
                None => {
                    warn!("Unknown pose '{}'", name);
                    0
                }
            },
            ButtonAction::CycleMode => {
                let next = session.mode.next(self.settings.skip_simulation);
                info!("Switching mode {} -> {}", session.mode, next);
                self.sink
                    .enqueue_with(Command::stop_jog(), Some(SessionEffect::Mode(next)));
                1
            }
            ButtonAction::Raw(text) => {
                self.sink.enqueue(Command::raw(&text));
                1
            }
            ButtonAction::Home => {
                self.sink.enqueue(Command::home());
                1
            }
            ButtonAction::ClearError => {
                self.sink
                    .enqueue_with(Command::clear_error(), Some(SessionEffect::ClearAlarm));
                1
            }
            ButtonAction::Enable => {
                if session.alarm {
                    warn!("Enable ignored, clear the alarm first");
                    return 0;
                }
                self.sink
                    .enqueue_with(Command::enable_robot(), Some(SessionEffect::Enabled(true)));
                1
            }
        }
    }
}
