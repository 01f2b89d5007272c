use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{CommandResult, CommandSubmitted, ConnectionStateChanged, Topics};
use super::{mqtt_options, RelayError};
use crate::config::RelayConfig;
use crate::dispatcher::{CommandSink, PendingBuffer};
use crate::protocol::{Command, Reply};
use crate::session::{SessionEffect, SessionState};
use crate::transport::Backoff;

const AWAITING_LIMIT: usize = 16;

/// Traffic coming back from the relay server.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Result(CommandResult),
    State(ConnectionStateChanged),
}

/// Operator side for processes that cannot hold the robot socket.
///
/// Commands are published to `command-submitted`. While the broker is out
/// of reach only the most recent command is kept and sent on reconnect.
/// Session effects are applied once the matching `command-result` reports
/// success.
#[derive(Clone)]
pub struct RelayClient {
    client: AsyncClient,
    topics: Topics,
    buffer: Arc<PendingBuffer<String>>,
    awaiting: Arc<Mutex<VecDeque<(String, SessionEffect)>>>,
    connected_rx: watch::Receiver<bool>,
    session_rx: watch::Receiver<SessionState>,
    messages_tx: broadcast::Sender<RelayMessage>,
}

impl RelayClient {
    pub fn connect(
        config: &RelayConfig,
        initial: SessionState,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<Result<(), RelayError>>) {
        let (relay, task) = Self::build(config, initial);
        info!(
            "Relay client connecting to {}:{} under '{}'",
            config.broker_host, config.broker_port, config.topic_prefix
        );
        let handle = tokio::spawn(task.run(cancel));
        (relay, handle)
    }

    fn build(config: &RelayConfig, initial: SessionState) -> (Self, RelayClientTask) {
        let (client, eventloop) = AsyncClient::new(mqtt_options(config, "client"), 64);
        let (connected_tx, connected_rx) = watch::channel(false);
        let (session_tx, session_rx) = watch::channel(initial);
        let (messages_tx, _) = broadcast::channel(64);

        let relay = Self {
            client,
            topics: Topics::new(&config.topic_prefix),
            buffer: Arc::new(PendingBuffer::new()),
            awaiting: Arc::new(Mutex::new(VecDeque::new())),
            connected_rx,
            session_rx,
            messages_tx,
        };

        let task = RelayClientTask {
            relay: relay.clone(),
            eventloop,
            connected_tx,
            session_tx,
            backoff: Backoff::new(config.reconnect.clone()),
        };
        (relay, task)
    }

    pub fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayMessage> {
        self.messages_tx.subscribe()
    }

    pub fn session(&self) -> watch::Receiver<SessionState> {
        self.session_rx.clone()
    }

    pub fn pending_command(&self) -> Option<String> {
        self.buffer.peek()
    }

    /// Publishes `command`, or buffers it while the broker is unreachable.
    pub fn submit(&self, command: &str) -> Result<(), RelayError> {
        if !self.is_connected() {
            if let Some(dropped) = self.buffer.store(command.to_string()) {
                debug!("Discarding superseded relay command {}", dropped);
            }
            return Ok(());
        }
        self.publish_command(command)
    }

    fn publish_command(&self, command: &str) -> Result<(), RelayError> {
        let payload = serde_json::to_vec(&CommandSubmitted::now(command))
            .map_err(|e| RelayError::Payload(e.to_string()))?;
        self.client
            .try_publish(self.topics.submitted.as_str(), QoS::AtLeastOnce, false, payload)
            .map_err(|e| RelayError::Client(e.to_string()))
    }

    fn expect_result(&self, command: String, effect: SessionEffect) {
        let mut awaiting = self.awaiting.lock().unwrap_or_else(|p| p.into_inner());
        if awaiting.len() >= AWAITING_LIMIT {
            awaiting.pop_front();
        }
        awaiting.push_back((command, effect));
    }

    fn take_effect(&self, command: &str) -> Option<SessionEffect> {
        let mut awaiting = self.awaiting.lock().unwrap_or_else(|p| p.into_inner());
        let position = awaiting.iter().position(|(line, _)| line == command)?;
        awaiting.remove(position).map(|(_, effect)| effect)
    }
}

impl CommandSink for RelayClient {
    fn enqueue_with(&self, command: Command, effect: Option<SessionEffect>) {
        let line = command.to_string();
        if let Some(effect) = effect {
            self.expect_result(line.clone(), effect);
        }
        if let Err(e) = self.submit(&line) {
            warn!("Failed to relay {}: {}", line, e);
        }
    }
}

struct RelayClientTask {
    relay: RelayClient,
    eventloop: EventLoop,
    connected_tx: watch::Sender<bool>,
    session_tx: watch::Sender<SessionState>,
    backoff: Backoff,
}

impl RelayClientTask {
    async fn run(mut self, cancel: CancellationToken) -> Result<(), RelayError> {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => self.on_connected(),
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.on_publish(&publish.topic, &publish.payload)
                }
                Ok(_) => {}
                Err(e) => {
                    self.connected_tx.send_replace(false);
                    let Some(delay) = self.backoff.next_delay() else {
                        return Err(RelayError::BrokerUnreachable(e.to_string()));
                    };
                    warn!("Relay broker unreachable: {}, retrying in {:?}", e, delay);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        if let Err(e) = self.relay.client.try_disconnect() {
            debug!("Relay disconnect: {}", e);
        }
        info!("Relay client stopped");
        Ok(())
    }

    fn on_connected(&mut self) {
        info!("Relay client connected to broker");
        self.backoff.reset();
        self.connected_tx.send_replace(true);

        for topic in [&self.relay.topics.result, &self.relay.topics.state] {
            if let Err(e) = self.relay.client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                warn!("Failed to subscribe to {}: {}", topic, e);
            }
        }

        if let Some(command) = self.relay.buffer.take() {
            info!("Flushing buffered relay command {}", command);
            if let Err(e) = self.relay.publish_command(&command) {
                warn!("Failed to flush {}: {}", command, e);
            }
        }
    }

    fn on_publish(&mut self, topic: &str, payload: &[u8]) {
        let message = if topic == self.relay.topics.result {
            match serde_json::from_slice::<CommandResult>(payload) {
                Ok(result) => {
                    self.apply_result(&result);
                    RelayMessage::Result(result)
                }
                Err(e) => {
                    warn!("Ignoring malformed command result: {}", e);
                    return;
                }
            }
        } else if topic == self.relay.topics.state {
            match serde_json::from_slice::<ConnectionStateChanged>(payload) {
                Ok(state) => {
                    info!("Robot link is {:?}", state.state);
                    RelayMessage::State(state)
                }
                Err(e) => {
                    warn!("Ignoring malformed state change: {}", e);
                    return;
                }
            }
        } else {
            return;
        };
        let _ = self.relay.messages_tx.send(message);
    }

    fn apply_result(&self, result: &CommandResult) {
        let Some(effect) = self.relay.take_effect(&result.command) else {
            return;
        };
        if !result.is_ok() {
            debug!("{} failed remotely, skipping {:?}", result.command, effect);
            return;
        }
        let Some(reply) = result
            .response
            .as_deref()
            .and_then(|raw| Reply::parse(raw).ok())
        else {
            return;
        };
        self.session_tx
            .send_modify(|state| effect.apply(state, &reply));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RobotError;
    use crate::session::Mode;

    fn config() -> RelayConfig {
        RelayConfig {
            topic_prefix: "test".to_string(),
            ..RelayConfig::default()
        }
    }

    #[tokio::test]
    async fn buffers_latest_command_while_broker_is_down() {
        let (relay, _task) = RelayClient::build(&config(), SessionState::default());
        relay.submit("A()").unwrap();
        relay.submit("B()").unwrap();
        assert!(!relay.is_connected());
        assert_eq!(relay.pending_command(), Some("B()".to_string()));
    }

    #[tokio::test]
    async fn successful_result_applies_session_effect() {
        let (relay, mut task) =
            RelayClient::build(&config(), SessionState::with_mode(Mode::User));
        relay.enqueue_with(Command::stop_jog(), Some(SessionEffect::Mode(Mode::Tool)));
        relay.enqueue_with(Command::enable_robot(), Some(SessionEffect::Enabled(true)));

        let failed = CommandResult::from_outcome("EnableRobot()", &Err(RobotError::ControlMode));
        task.on_publish("test/command-result", &serde_json::to_vec(&failed).unwrap());
        assert!(!relay.session().borrow().enabled);

        let ok = CommandResult::from_outcome("MoveJog()", &Ok("0,{},MoveJog();".to_string()));
        task.on_publish("test/command-result", &serde_json::to_vec(&ok).unwrap());
        assert_eq!(relay.session().borrow().mode, Mode::Tool);
    }
}
