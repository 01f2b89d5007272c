use rumqttc::{AsyncClient, Event, Packet, QoS};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{CommandResult, CommandSubmitted, ConnectionStateChanged, Topics};
use super::{mqtt_options, RelayError};
use crate::config::RelayConfig;
use crate::dispatcher::{CommandDispatcher, CommandSink, DispatchEvent};
use crate::protocol::Command;
use crate::transport::{Backoff, ConnectionState};

/// Broker side of the process that holds the robot socket.
///
/// Commands arriving on `command-submitted` go through the dispatcher like
/// any local producer. Results and link state changes are published back.
pub struct RelayServer {
    config: RelayConfig,
    topics: Topics,
    dispatcher: CommandDispatcher,
}

impl RelayServer {
    pub fn new(config: RelayConfig, dispatcher: CommandDispatcher) -> Self {
        let topics = Topics::new(&config.topic_prefix);
        Self {
            config,
            topics,
            dispatcher,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<(), RelayError>> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<(), RelayError> {
        let (client, mut eventloop) = AsyncClient::new(mqtt_options(&self.config, "server"), 64);
        let mut events_rx = self.dispatcher.subscribe_events();
        let mut state_rx = self.dispatcher.transport().subscribe();
        let mut backoff = Backoff::new(self.config.reconnect.clone());

        info!(
            "Relay server connecting to {}:{} under '{}'",
            self.config.broker_host, self.config.broker_port, self.config.topic_prefix
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Relay server connected to broker");
                        backoff.reset();
                        if let Err(e) = client.try_subscribe(self.topics.submitted.as_str(), QoS::AtLeastOnce) {
                            warn!("Failed to subscribe to {}: {}", self.topics.submitted, e);
                        }
                        let state = *state_rx.borrow();
                        self.publish(&client, &self.topics.state, &ConnectionStateChanged::now(state));
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if publish.topic == self.topics.submitted {
                            self.handle_submission(&publish.payload);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => match backoff.next_delay() {
                        Some(delay) => {
                            warn!("Broker connection failed: {}, retrying in {:?}", e, delay);
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        None => return Err(RelayError::BrokerUnreachable(e.to_string())),
                    },
                },

                event = events_rx.recv() => match event {
                    Ok(event) => {
                        if let Some(result) = result_for(&event) {
                            self.publish(&client, &self.topics.result, &result);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => warn!("Relay missed {} dispatch events", skipped),
                    Err(RecvError::Closed) => break,
                },

                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state: ConnectionState = *state_rx.borrow_and_update();
                    self.publish(&client, &self.topics.state, &ConnectionStateChanged::now(state));
                }
            }
        }

        if let Err(e) = client.try_disconnect() {
            debug!("Relay disconnect: {}", e);
        }
        info!("Relay server stopped");
        Ok(())
    }

    fn handle_submission(&self, payload: &[u8]) {
        match serde_json::from_slice::<CommandSubmitted>(payload) {
            Ok(submitted) => {
                debug!("Relayed command {}", submitted.command);
                self.dispatcher.enqueue(Command::raw(&submitted.command));
            }
            Err(e) => warn!("Ignoring malformed submission: {}", e),
        }
    }

    fn publish<T: Serialize>(&self, client: &AsyncClient, topic: &str, payload: &T) {
        match serde_json::to_vec(payload) {
            Ok(bytes) => {
                if let Err(e) = client.try_publish(topic, QoS::AtLeastOnce, false, bytes) {
                    warn!("Failed to publish to {}: {}", topic, e);
                }
            }
            Err(e) => warn!("Failed to encode payload for {}: {}", topic, e),
        }
    }
}

/// Only results go back out; submissions are never echoed.
fn result_for(event: &DispatchEvent) -> Option<CommandResult> {
    match event {
        DispatchEvent::Result { command, outcome } => {
            Some(CommandResult::from_outcome(command.clone(), outcome))
        }
        DispatchEvent::Submitted { .. } => None,
    }
}
