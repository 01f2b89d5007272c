//! Application configuration
//!
//! One TOML file, `~/.config/dobot-teleop/config.toml` unless a path is
//! given on the command line. A missing file is created with defaults on
//! first start. Every section is optional; absent keys take their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::dispatcher::DispatcherSettings;
use crate::input::{DeviceKind, SamplerSettings};
use crate::relay::RelayRole;
use crate::session::Mode;
use crate::teleop::{AxisMappingTable, ButtonAction, EndEffector, PoseLibrary, TeleopSettings};
use crate::transport::{ReconnectPolicy, TransportSettings};

const CONFIG_DIR: &str = ".config/dobot-teleop";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    NoHomeDir,

    #[error("Config I/O failed for {path}: {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RobotConfig {
    pub host: String,
    pub port: u16,
    pub dial_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub reply_timeout_ms: u64,
    pub enable_on_connect: bool,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            host: "192.168.5.1".to_string(),
            port: 29999,
            dial_timeout_ms: 3000,
            settle_delay_ms: 2000,
            reply_timeout_ms: 5000,
            enable_on_connect: true,
        }
    }
}

impl RobotConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            dial_timeout: Duration::from_millis(self.dial_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            reply_timeout: Duration::from_millis(self.reply_timeout_ms),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DispatcherConfig {
    pub min_interval_ms: u64,
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 20,
            queue_capacity: 256,
        }
    }
}

impl DispatcherConfig {
    pub fn settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            min_interval: Duration::from_millis(self.min_interval_ms),
            queue_capacity: self.queue_capacity,
            ..DispatcherSettings::default()
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    pub device: DeviceKind,
    pub gamepad_index: usize,
    pub poll_interval_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            device: DeviceKind::SpaceMouse,
            gamepad_index: 0,
            poll_interval_ms: 5,
        }
    }
}

impl InputConfig {
    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            ..SamplerSettings::default()
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TeleopConfig {
    pub tick_ms: u64,
    pub threshold: f32,
    pub initial_mode: Mode,
    pub skip_simulation: bool,
    pub end_effector: EndEffector,
    pub buttons: [ButtonAction; 2],
    pub mapping: AxisMappingTable,
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            threshold: 0.5,
            initial_mode: Mode::User,
            skip_simulation: true,
            end_effector: EndEffector::Sucker,
            buttons: [ButtonAction::ToggleTool, ButtonAction::Home],
            mapping: AxisMappingTable::default(),
        }
    }
}

impl TeleopConfig {
    pub fn settings(&self, poses: PoseLibrary) -> TeleopSettings {
        TeleopSettings {
            tick_interval: Duration::from_millis(self.tick_ms),
            threshold: self.threshold,
            skip_simulation: self.skip_simulation,
            end_effector: self.end_effector,
            buttons: self.buttons.clone(),
            mapping: self.mapping.clone(),
            poses,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    pub role: RelayRole,
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub reconnect: ReconnectPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            role: RelayRole::Off,
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "dobot-teleop".to_string(),
            topic_prefix: "dobot".to_string(),
            keep_alive_secs: 5,
            user: None,
            password: None,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub robot: RobotConfig,
    pub reconnect: ReconnectPolicy,
    pub dispatcher: DispatcherConfig,
    pub input: InputConfig,
    pub teleop: TeleopConfig,
    pub relay: RelayConfig,
    pub poses: PoseLibrary,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            robot: RobotConfig::default(),
            reconnect: ReconnectPolicy::default(),
            dispatcher: DispatcherConfig::default(),
            input: InputConfig::default(),
            teleop: TeleopConfig::default(),
            relay: RelayConfig::default(),
            poses: PoseLibrary::default(),
        }
    }
}

impl AppConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Reads and validates `path`, writing the defaults there first if the
    /// file does not exist yet.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        ensure_default_config(path).await?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_error(path, e))?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        tokio::fs::write(path, self.to_toml()?)
            .await
            .map_err(|e| io_error(path, e))?;
        debug!("Configuration written to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.teleop.threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(invalid(format!(
                "teleop.threshold must be inside (0, 1), got {}",
                threshold
            )));
        }
        if self.teleop.tick_ms == 0 {
            return Err(invalid("teleop.tick_ms must be greater than zero"));
        }
        if self.input.poll_interval_ms == 0 {
            return Err(invalid("input.poll_interval_ms must be greater than zero"));
        }
        if self.dispatcher.queue_capacity == 0 {
            return Err(invalid("dispatcher.queue_capacity must be greater than zero"));
        }
        for (section, policy) in [
            ("reconnect", &self.reconnect),
            ("relay.reconnect", &self.relay.reconnect),
        ] {
            if !(0.0..=1.0).contains(&policy.jitter_factor) {
                return Err(invalid(format!(
                    "{}.jitter_factor must be inside [0, 1], got {}",
                    section, policy.jitter_factor
                )));
            }
            if policy.base_delay_ms > policy.max_delay_ms {
                return Err(invalid(format!(
                    "{}.base_delay_ms must not exceed max_delay_ms",
                    section
                )));
            }
        }
        for action in &self.teleop.buttons {
            if let ButtonAction::RunPose(name) = action {
                if !self.poses.contains(name) {
                    return Err(invalid(format!("button action names unknown pose '{}'", name)));
                }
            }
        }
        if self.relay.role != RelayRole::Off {
            if self.relay.broker_host.trim().is_empty() {
                return Err(invalid("relay.broker_host is required when the relay is on"));
            }
            if self.relay.topic_prefix.trim().is_empty() {
                return Err(invalid("relay.topic_prefix is required when the relay is on"));
            }
        }
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let mut path = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    Ok(path)
}

/// Writes the default configuration to `path` unless a file is already
/// there. Returns whether a file was created.
pub async fn ensure_default_config(path: &Path) -> Result<bool, ConfigError> {
    let exists = tokio::fs::try_exists(path)
        .await
        .map_err(|e| io_error(path, e))?;
    if exists {
        return Ok(false);
    }
    info!("No configuration at {}, writing defaults", path.display());
    AppConfig::default().save(path).await?;
    Ok(true)
}

fn io_error(path: &Path, e: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teleop::{AxisAssignment, Channel, JogAxis};

    #[tokio::test]
    async fn first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(ensure_default_config(&path).await.unwrap());
        assert!(!ensure_default_config(&path).await.unwrap());

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.robot.address(), "192.168.5.1:29999");
    }

    #[tokio::test]
    async fn saved_changes_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.teleop.initial_mode = Mode::Custom;
        config.teleop.mapping.custom.channels[Channel::Y.index()] =
            AxisAssignment::inverted(JogAxis::X);
        config.reconnect = ReconnectPolicy::default().unbounded();
        config.relay.role = RelayRole::Server;
        config.save(&path).await.unwrap();

        let reloaded = AppConfig::load(&path).await.unwrap();
        assert_eq!(reloaded, config);
        assert_eq!(reloaded.reconnect.max_attempts, None);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config = AppConfig::from_toml(
            r#"
            log_level = "debug"

            [robot]
            host = "10.0.0.7"

            [teleop]
            threshold = 0.3
            buttons = [{ action = "run_pose", value = "wave" }, { action = "clear_error" }]

            [teleop.mapping.custom]
            coord_type = 1
            channels = ["X", "X inverse", "Z", "None", "Ry", "Rz"]
            "#,
        )
        .unwrap();

        assert_eq!(config.robot.address(), "10.0.0.7:29999");
        assert_eq!(config.teleop.threshold, 0.3);
        assert_eq!(config.teleop.buttons[1], ButtonAction::ClearError);
        assert_eq!(
            config.teleop.mapping.custom.channels[3],
            AxisAssignment::UNMAPPED
        );
        assert_eq!(config.teleop.mapping.joint, AxisMappingTable::default().joint);
        assert_eq!(config.dispatcher, DispatcherConfig::default());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = AppConfig::default();
        config.teleop.threshold = 1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.teleop.tick_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.reconnect.jitter_factor = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.relay.role = RelayRole::Client;
        config.relay.broker_host = " ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unknown_pose_binding() {
        let mut config = AppConfig::default();
        config.teleop.buttons[0] = ButtonAction::RunPose("moonwalk".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("moonwalk"));
    }

    #[test]
    fn bad_axis_name_is_a_parse_error() {
        let err = AppConfig::from_toml(
            r#"
            [teleop.mapping.custom]
            coord_type = 1
            channels = ["X", "Q", "Z", "Rx", "Ry", "Rz"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
