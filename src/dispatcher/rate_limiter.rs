use std::time::Duration;
use tokio::time::Instant;

/// Enforces a minimum gap between consecutive sends.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_send: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_send: None,
        }
    }

    /// Waits until `min_interval` has passed since the last [`mark`](Self::mark).
    pub async fn ready(&self) {
        if let Some(last) = self.last_send {
            tokio::time::sleep_until(last + self.min_interval).await;
        }
    }

    pub fn mark(&mut self) {
        self.last_send = Some(Instant::now());
    }
}
