use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::ConnectionState;
use crate::protocol::{Reply, RobotError};

/// Timing knobs for the robot link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportSettings {
    pub dial_timeout: Duration,
    /// Pause after dialing before the first command; the controller drops
    /// commands sent right after accept.
    pub settle_delay: Duration,
    pub reply_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_millis(3000),
            settle_delay: Duration::from_millis(2000),
            reply_timeout: Duration::from_millis(5000),
        }
    }
}

struct Link {
    peer: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Link {
    async fn exchange(&mut self, line: &str) -> io::Result<String> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        let mut reply = String::new();
        let read = self.reader.read_line(&mut reply).await?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "controller closed the connection",
            ));
        }
        Ok(reply.trim().to_string())
    }
}

/// The single TCP link to the robot controller.
///
/// The `link` mutex is the exclusive-access gate: it is held for the whole
/// write/read exchange, so at most one request is ever in flight.
pub struct Transport {
    link: Mutex<Option<Link>>,
    state_tx: watch::Sender<ConnectionState>,
    target_tx: watch::Sender<Option<String>>,
    dial_attempts: AtomicU32,
    settings: TransportSettings,
}

impl Transport {
    pub fn new(settings: TransportSettings) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (target_tx, _) = watch::channel(None);
        Self {
            link: Mutex::new(None),
            state_tx,
            target_tx,
            dial_attempts: AtomicU32::new(0),
            settings,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Address the supervisor keeps the link pointed at, if any.
    pub fn target(&self) -> Option<String> {
        self.target_tx.borrow().clone()
    }

    /// Dials made so far, explicit and supervised.
    pub fn dial_attempts(&self) -> u32 {
        self.dial_attempts.load(Ordering::Relaxed)
    }

    /// Dials `address` and makes it the reconnect target.
    ///
    /// A failed dial still leaves the target set, so a running supervisor
    /// picks up the retries.
    pub async fn connect(&self, address: &str) -> Result<(), RobotError> {
        self.target_tx.send_replace(Some(address.to_string()));
        self.dial(address, ConnectionState::Connecting).await
    }

    pub(crate) async fn dial(
        &self,
        address: &str,
        during: ConnectionState,
    ) -> Result<(), RobotError> {
        let mut link = self.link.lock().await;
        if let Some(existing) = link.as_ref() {
            debug!("Already connected to {}", existing.peer);
            return Ok(());
        }

        self.set_state(during);
        let attempt = self.dial_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Dialing {} (attempt {})", address, attempt);

        let stream = match tokio::time::timeout(
            self.settings.dial_timeout,
            TcpStream::connect(address),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(RobotError::Connection(format!("{}: {}", address, e)));
            }
            Err(_) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(RobotError::Connection(format!(
                    "{}: dial timed out after {:?}",
                    address, self.settings.dial_timeout
                )));
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        tokio::time::sleep(self.settings.settle_delay).await;

        let (reader, writer) = stream.into_split();
        *link = Some(Link {
            peer: address.to_string(),
            reader: BufReader::new(reader),
            writer,
        });
        self.set_state(ConnectionState::Connected);
        info!("Connected to robot controller at {}", address);
        Ok(())
    }

    /// Sends one command line and waits for its reply.
    ///
    /// Socket failures, EOF and reply timeouts drop the link. A reply that
    /// arrives after its timeout would otherwise be read as the answer to the
    /// next request.
    pub async fn send_command(&self, line: &str) -> Result<Reply, RobotError> {
        let mut guard = self.link.lock().await;
        let link = guard.as_mut().ok_or(RobotError::NotConnected)?;

        debug!("-> {}", line);
        let outcome = tokio::time::timeout(self.settings.reply_timeout, link.exchange(line)).await;

        match outcome {
            Ok(Ok(reply)) => {
                debug!("<- {}", reply);
                Reply::parse(&reply)
            }
            Ok(Err(e)) => {
                warn!("Link failed during {}: {}", line, e);
                guard.take();
                self.set_state(ConnectionState::Disconnected);
                Err(RobotError::Command(e.to_string()))
            }
            Err(_) => {
                warn!(
                    "No reply to {} within {:?}, dropping link",
                    line, self.settings.reply_timeout
                );
                guard.take();
                self.set_state(ConnectionState::Disconnected);
                Err(RobotError::Timeout(self.settings.reply_timeout))
            }
        }
    }

    /// Closes the link and clears the reconnect target. Idempotent.
    pub async fn disconnect(&self) {
        self.target_tx.send_replace(None);
        let mut guard = self.link.lock().await;
        if let Some(mut link) = guard.take() {
            if let Err(e) = link.writer.shutdown().await {
                debug!("Shutdown of {} failed: {}", link.peer, e);
            }
            info!("Disconnected from {}", link.peer);
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Called by the supervisor once its policy is exhausted.
    pub(crate) fn abandon_target(&self) {
        self.target_tx.send_replace(None);
        self.set_state(ConnectionState::Disconnected);
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!("Connection state {:?} -> {:?}", current, state);
            *current = state;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_without_link_is_not_connected() {
        let transport = Transport::new(TransportSettings::default());
        assert_eq!(
            transport.send_command("Home()").await.unwrap_err(),
            RobotError::NotConnected
        );
        assert_eq!(transport.dial_attempts(), 0);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let transport = Transport::new(TransportSettings::default());
        transport.disconnect().await;
        transport.disconnect().await;
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert!(transport.target().is_none());
    }
}
