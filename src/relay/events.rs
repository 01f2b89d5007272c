use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::protocol::RobotError;
use crate::transport::ConnectionState;

/// `<prefix>/command-submitted`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSubmitted {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Local>>,
}

impl CommandSubmitted {
    pub fn now(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            sent_at: Some(Local::now()),
        }
    }
}

/// `<prefix>/command-result`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub response: Option<String>,
    pub error: Option<String>,
    pub at: DateTime<Local>,
}

impl CommandResult {
    pub fn from_outcome(command: impl Into<String>, outcome: &Result<String, RobotError>) -> Self {
        let (response, error) = match outcome {
            Ok(reply) => (Some(reply.clone()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            command: command.into(),
            response,
            error,
            at: Local::now(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// `<prefix>/connection-state-changed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStateChanged {
    pub state: ConnectionState,
    pub at: DateTime<Local>,
}

impl ConnectionStateChanged {
    pub fn now(state: ConnectionState) -> Self {
        Self {
            state,
            at: Local::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub submitted: String,
    pub result: String,
    pub state: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            submitted: format!("{}/command-submitted", prefix),
            result: format!("{}/command-result", prefix),
            state: format!("{}/connection-state-changed", prefix),
        }
    }
}
