//! Command dispatcher
//!
//! Single-consumer queue in front of the transport:
//!
//! ```text
//!   teleop tick ──┐
//!   buttons ──────┼─► enqueue ──► connected? ──yes──► mpsc queue ──► DispatchWorker ──► Transport
//!   relay ────────┤                       │no                          │      ▲
//!   RobotSession ─┘ (submit)              ▼                            │      │ flush first
//!                                   PendingBuffer (1) ─────────────────┼──────┘ on reconnect
//!                                                                      ▼
//!                                          SessionEffect ─► watch<SessionState>
//!                                          DispatchEvent ─► broadcast
//! ```

mod pending;
mod rate_limiter;
mod worker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::protocol::{Command, Reply, RobotError};
use crate::session::{SessionEffect, SessionState};
use crate::transport::Transport;

pub use pending::PendingBuffer;
pub use rate_limiter::RateLimiter;

use worker::DispatchWorker;

/// Fire-and-forget entry point shared by every command producer.
pub trait CommandSink: Send + Sync {
    fn enqueue_with(&self, command: Command, effect: Option<SessionEffect>);

    fn enqueue(&self, command: Command) {
        self.enqueue_with(command, None);
    }
}

impl<T: CommandSink + ?Sized> CommandSink for Arc<T> {
    fn enqueue_with(&self, command: Command, effect: Option<SessionEffect>) {
        (**self).enqueue_with(command, effect);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DispatcherSettings {
    pub min_interval: Duration,
    pub queue_capacity: usize,
    pub event_capacity: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(20),
            queue_capacity: 256,
            event_capacity: 64,
        }
    }
}

/// Observations published by the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// About to be written to the link
    Submitted { command: String },
    /// Outcome of a send, raw reply on success
    Result {
        command: String,
        outcome: Result<String, RobotError>,
    },
}

/// Command held back while the link was down.
#[derive(Debug, Clone)]
pub(crate) struct Buffered {
    seq: u64,
    command: Command,
    effect: Option<SessionEffect>,
}

pub(crate) struct DispatchRequest {
    seq: u64,
    command: Command,
    effect: Option<SessionEffect>,
    responder: Option<oneshot::Sender<Result<Reply, RobotError>>>,
}

/// Cloneable handle to the dispatcher worker.
#[derive(Clone)]
pub struct CommandDispatcher {
    transport: Arc<Transport>,
    request_tx: mpsc::Sender<DispatchRequest>,
    pending: Arc<PendingBuffer<Buffered>>,
    sequence: Arc<AtomicU64>,
    events_tx: broadcast::Sender<DispatchEvent>,
    session_rx: watch::Receiver<SessionState>,
}

impl CommandDispatcher {
    pub fn spawn(
        transport: Arc<Transport>,
        settings: DispatcherSettings,
        initial: SessionState,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (request_tx, request_rx) = mpsc::channel(settings.queue_capacity.max(1));
        let (events_tx, _) = broadcast::channel(settings.event_capacity.max(1));
        let (session_tx, session_rx) = watch::channel(initial);
        let pending = Arc::new(PendingBuffer::new());

        let worker = DispatchWorker {
            transport: transport.clone(),
            request_rx,
            pending: pending.clone(),
            events_tx: events_tx.clone(),
            session_tx,
            limiter: RateLimiter::new(settings.min_interval),
        };
        let handle = tokio::spawn(worker.run(cancel));

        let dispatcher = Self {
            transport,
            request_tx,
            pending,
            sequence: Arc::new(AtomicU64::new(0)),
            events_tx,
            session_rx,
        };
        (dispatcher, handle)
    }

    /// Request/reply send for the control surface. Does not buffer: fails
    /// with [`RobotError::NotConnected`] while the link is down.
    pub async fn submit(
        &self,
        command: Command,
        effect: Option<SessionEffect>,
    ) -> Result<Reply, RobotError> {
        if !self.transport.is_connected() {
            return Err(RobotError::NotConnected);
        }
        let (responder, reply_rx) = oneshot::channel();
        let request = DispatchRequest {
            seq: self.next_seq(),
            command,
            effect,
            responder: Some(responder),
        };
        self.request_tx
            .send(request)
            .await
            .map_err(|_| RobotError::DispatcherClosed)?;
        reply_rx.await.map_err(|_| RobotError::DispatcherClosed)?
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events_tx.subscribe()
    }

    pub fn session(&self) -> watch::Receiver<SessionState> {
        self.session_rx.clone()
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Command waiting for the next reconnect, if any.
    pub fn pending_command(&self) -> Option<Command> {
        self.pending.peek().map(|buffered| buffered.command)
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

impl CommandDispatcher {
    /// Replaces the pending command. A link that came up after the caller
    /// checked may already have been flushed, so the slot is drained into
    /// the queue in that case.
    fn buffer(&self, buffered: Buffered) {
        if let Some(dropped) = self.pending.store(buffered) {
            debug!("Discarding superseded pending command {}", dropped.command);
        }
        if !self.transport.is_connected() {
            return;
        }
        if let Some(buffered) = self.pending.take() {
            self.queue(DispatchRequest {
                seq: buffered.seq,
                command: buffered.command,
                effect: buffered.effect,
                responder: None,
            });
        }
    }

    fn queue(&self, request: DispatchRequest) {
        match self.request_tx.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                warn!("Dispatch queue full, dropping {}", request.command);
            }
            Err(TrySendError::Closed(request)) => {
                error!("Dispatcher stopped, dropping {}", request.command);
            }
        }
    }
}

impl CommandSink for CommandDispatcher {
    /// Queues when connected, otherwise replaces the pending command.
    fn enqueue_with(&self, command: Command, effect: Option<SessionEffect>) {
        let seq = self.next_seq();

        if !self.transport.is_connected() {
            self.buffer(Buffered {
                seq,
                command,
                effect,
            });
            return;
        }

        self.queue(DispatchRequest {
            seq,
            command,
            effect,
            responder: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportSettings;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn enqueue_while_disconnected_keeps_latest() {
        let transport = Arc::new(Transport::new(TransportSettings::default()));
        let cancel = CancellationToken::new();
        let (dispatcher, handle) = CommandDispatcher::spawn(
            transport,
            DispatcherSettings::default(),
            SessionState::default(),
            cancel.clone(),
        );

        dispatcher.enqueue(Command::raw("A()"));
        dispatcher.enqueue(Command::raw("B()"));
        dispatcher.enqueue(Command::raw("C()"));
        assert_eq!(dispatcher.pending_command(), Some(Command::raw("C()")));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn submit_fails_fast_when_disconnected() {
        let transport = Arc::new(Transport::new(TransportSettings::default()));
        let cancel = CancellationToken::new();
        let (dispatcher, _handle) = CommandDispatcher::spawn(
            transport,
            DispatcherSettings::default(),
            SessionState::default(),
            cancel.clone(),
        );

        let err = dispatcher
            .submit(Command::home(), None)
            .await
            .unwrap_err();
        assert_eq!(err, RobotError::NotConnected);
        assert!(dispatcher.pending_command().is_none());
        cancel.cancel();
    }

    #[tokio::test]
    async fn command_buffered_as_the_link_comes_up_still_goes_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let controller = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            writer
                .write_all(format!("0,{{}},{};\n", line).as_bytes())
                .await
                .unwrap();
            line
        });

        let transport = Arc::new(Transport::new(TransportSettings {
            settle_delay: Duration::ZERO,
            ..TransportSettings::default()
        }));
        let cancel = CancellationToken::new();
        let (dispatcher, handle) = CommandDispatcher::spawn(
            transport.clone(),
            DispatcherSettings::default(),
            SessionState::default(),
            cancel.clone(),
        );
        transport.connect(&address).await.unwrap();
        // Let the worker run its flush on the still empty slot.
        tokio::task::yield_now().await;

        dispatcher.buffer(Buffered {
            seq: dispatcher.next_seq(),
            command: Command::home(),
            effect: None,
        });
        assert!(dispatcher.pending_command().is_none());
        assert_eq!(controller.await.unwrap(), "Home()");

        cancel.cancel();
        handle.await.unwrap();
    }
}
