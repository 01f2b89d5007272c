//! Reconnect supervision with exponential backoff
//!
//! ```text
//!   state_rx ──► Disconnected + target set?
//!                      │ yes
//!                      ▼
//!       ┌──── Reconnecting: sleep(backoff) ◄────┐
//!       │              │                        │ dial failed
//!       │              ▼                        │
//!       │          dial(target) ────────────────┘
//!       │              │ ok
//!       │              ▼
//!       │          Connected
//!       │
//!       └─ attempts exhausted: clear target, stay Disconnected
//! ```

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ConnectionState, Transport};

/// Backoff parameters shared by the robot link and the relay's broker link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// `None` retries forever. Written as `0` in configuration files.
    #[serde(
        serialize_with = "serialize_attempts",
        deserialize_with = "deserialize_attempts"
    )]
    pub max_attempts: Option<u32>,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Relative spread applied to every delay, in `[0, 1]`
    pub jitter_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            base_delay_ms: 1000,
            max_delay_ms: 3000,
            jitter_factor: 0.1,
        }
    }
}

impl ReconnectPolicy {
    pub fn unbounded(self) -> Self {
        Self {
            max_attempts: None,
            ..self
        }
    }

    /// Delay before attempt `attempt` (1-based) without jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exp = 2u64.saturating_pow(attempt.saturating_sub(1));
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(exp)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    fn jittered(&self, nominal: Duration) -> Duration {
        let jitter = self.jitter_factor.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return nominal;
        }
        let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
        nominal.mul_f64(factor)
    }
}

fn serialize_attempts<S: Serializer>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u32(value.unwrap_or(0))
}

fn deserialize_attempts<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let attempts = u32::deserialize(deserializer)?;
    Ok((attempts > 0).then_some(attempts))
}

/// Attempt counter over a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next attempt, `None` once the policy is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempt += 1;
        let nominal = self.policy.nominal_delay(self.attempt);
        Some(self.policy.jittered(nominal))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.policy.max_attempts, Some(max) if self.attempt >= max)
    }
}

/// Background task that redials the transport's target after an unintended
/// drop.
pub struct ReconnectSupervisor {
    transport: Arc<Transport>,
    policy: ReconnectPolicy,
}

impl ReconnectSupervisor {
    pub fn spawn(
        transport: Arc<Transport>,
        policy: ReconnectPolicy,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let supervisor = Self { transport, policy };
        tokio::spawn(async move { supervisor.run(cancel).await })
    }

    async fn run(self, cancel: CancellationToken) {
        info!(
            "Reconnect supervisor started (max attempts: {:?})",
            self.policy.max_attempts
        );
        let mut state_rx = self.transport.subscribe();

        loop {
            let state = *state_rx.borrow_and_update();
            if state == ConnectionState::Disconnected && self.transport.target().is_some() {
                self.recover(&cancel).await;
                if cancel.is_cancelled() {
                    break;
                }
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Reconnect supervisor stopped");
    }

    async fn recover(&self, cancel: &CancellationToken) {
        let mut backoff = Backoff::new(self.policy.clone());

        while let Some(delay) = backoff.next_delay() {
            self.transport.set_state(ConnectionState::Reconnecting);
            warn!(
                "Robot link down, attempt {} in {:?}",
                backoff.attempt(),
                delay
            );

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let Some(target) = self.transport.target() else {
                debug!("Reconnect abandoned, disconnect was requested");
                self.transport.set_state(ConnectionState::Disconnected);
                return;
            };

            match self.transport.dial(&target, ConnectionState::Reconnecting).await {
                Ok(()) => {
                    info!(
                        "Reconnected to {} after {} attempt(s)",
                        target,
                        backoff.attempt()
                    );
                    return;
                }
                Err(e) => warn!("Reconnect attempt {} failed: {}", backoff.attempt(), e),
            }
        }

        error!(
            "Giving up on the robot link after {} attempt(s)",
            backoff.attempt()
        );
        self.transport.abandon_target();
    }
}
