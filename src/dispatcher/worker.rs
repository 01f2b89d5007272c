use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::rate_limiter::RateLimiter;
use super::{Buffered, DispatchEvent, DispatchRequest, PendingBuffer};
use crate::protocol::RobotError;
use crate::session::SessionState;
use crate::transport::{ConnectionState, Transport};

/// Sole consumer of the request queue and sole caller of
/// [`Transport::send_command`].
pub(super) struct DispatchWorker {
    pub(super) transport: Arc<Transport>,
    pub(super) request_rx: mpsc::Receiver<DispatchRequest>,
    pub(super) pending: Arc<PendingBuffer<Buffered>>,
    pub(super) events_tx: broadcast::Sender<DispatchEvent>,
    pub(super) session_tx: watch::Sender<SessionState>,
    pub(super) limiter: RateLimiter,
}

impl DispatchWorker {
    pub(super) async fn run(mut self, cancel: CancellationToken) {
        info!("Command dispatcher started");
        let mut state_rx = self.transport.subscribe();
        let mut was_connected = *state_rx.borrow_and_update() == ConnectionState::Connected;
        let mut dispatched: u64 = 0;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let connected = *state_rx.borrow_and_update() == ConnectionState::Connected;
                    if connected && !was_connected {
                        dispatched += self.flush_pending().await;
                    }
                    was_connected = connected;
                }

                request = self.request_rx.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    // A reconnect the select has not observed yet still gets the
                    // buffered command out first.
                    if self.transport.is_connected() {
                        dispatched += self.flush_pending().await;
                    }
                    self.dispatch(request).await;
                    dispatched += 1;
                }
            }
        }

        info!("Command dispatcher stopped after {} command(s)", dispatched);
    }

    async fn flush_pending(&mut self) -> u64 {
        let Some(buffered) = self.pending.take() else {
            return 0;
        };
        info!("Flushing buffered command {}", buffered.command);
        self.dispatch(DispatchRequest {
            seq: buffered.seq,
            command: buffered.command,
            effect: buffered.effect,
            responder: None,
        })
        .await;
        1
    }

    async fn dispatch(&mut self, request: DispatchRequest) {
        let DispatchRequest {
            seq,
            command,
            effect,
            responder,
        } = request;

        self.limiter.ready().await;
        let line = command.to_string();
        let _ = self.events_tx.send(DispatchEvent::Submitted {
            command: line.clone(),
        });

        let result = self.transport.send_command(&line).await;
        self.limiter.mark();

        match &result {
            Ok(reply) => {
                debug!("{} -> {}", line, reply.raw);
                if let Some(effect) = effect {
                    self.session_tx
                        .send_modify(|state| effect.apply(state, reply));
                }
            }
            Err(RobotError::NotConnected) if responder.is_none() => {
                // Anything enqueued after this request was issued wins.
                let stored = self
                    .pending
                    .store_unless(Buffered { seq, command, effect }, |current| current.seq > seq);
                if stored {
                    debug!("Link gone before {} went out, buffering it", line);
                } else {
                    debug!("Link gone before {} went out, newer command already buffered", line);
                }
            }
            // The transport already logged the broken link.
            Err(e) if e.is_link_failure() => debug!("Command {} lost with the link: {}", line, e),
            Err(e) => warn!("Command {} failed: {}", line, e),
        }

        let _ = self.events_tx.send(DispatchEvent::Result {
            command: line,
            outcome: result.clone().map(|reply| reply.raw),
        });

        if let Some(responder) = responder {
            let _ = responder.send(result);
        }
    }
}
