use color_eyre::{eyre::eyre, Result};
use dobot_teleop::config::{default_config_path, AppConfig};
use dobot_teleop::dispatcher::{CommandDispatcher, CommandSink};
use dobot_teleop::input::{GilrsDevice, InputDevice, InputSnapshot, SamplerHandle};
use dobot_teleop::protocol::Command;
use dobot_teleop::relay::{RelayClient, RelayError, RelayMessage, RelayRole, RelayServer};
use dobot_teleop::session::{RobotSession, SessionEffect, SessionState};
use dobot_teleop::teleop::{TeleopController, TeleopSettings};
use dobot_teleop::transport::{ReconnectSupervisor, Transport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Time the relay event loop gets to flush the shutdown commands.
const RELAY_DRAIN: Duration = Duration::from_millis(300);

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => default_config_path()?,
    };
    let config = AppConfig::load(&config_path).await?;

    setup(&config.log_level)?;
    info!("Using configuration {}", config_path.display());

    let cancel = CancellationToken::new();

    let device = config.input.device;
    let gamepad_index = config.input.gamepad_index;
    let (mut sampler, snapshot_rx) = SamplerHandle::spawn(
        move || Box::new(GilrsDevice::new(device, gamepad_index)) as Box<dyn InputDevice>,
        config.input.sampler_settings(),
        cancel.clone(),
    )
    .await
    .map_err(|e| eyre!("Failed to start input sampler: {}", e))?;

    let initial = SessionState::with_mode(config.teleop.initial_mode);
    let teleop_settings = config.teleop.settings(config.poses.clone());

    let outcome = match config.relay.role {
        RelayRole::Client => {
            run_relay_client(&config, initial, snapshot_rx, teleop_settings, &cancel).await
        }
        RelayRole::Off | RelayRole::Server => {
            run_local(&config, initial, snapshot_rx, teleop_settings, &cancel).await
        }
    };

    cancel.cancel();
    sampler.shutdown();
    info!("Shutdown complete");
    outcome
}

fn setup(log_level: &str) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .or_else(|| log_level.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    setup_logging_env(level);
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

/// This process holds the robot socket, optionally serving the relay.
async fn run_local(
    config: &AppConfig,
    initial: SessionState,
    snapshot_rx: watch::Receiver<InputSnapshot>,
    teleop_settings: TeleopSettings,
    cancel: &CancellationToken,
) -> Result<()> {
    let transport = Arc::new(Transport::new(config.robot.transport_settings()));
    let supervisor =
        ReconnectSupervisor::spawn(transport.clone(), config.reconnect.clone(), cancel.clone());
    let (dispatcher, dispatch_handle) = CommandDispatcher::spawn(
        transport,
        config.dispatcher.settings(),
        initial,
        cancel.clone(),
    );
    let session = Arc::new(RobotSession::new(
        dispatcher,
        config.robot.address(),
        config.teleop.skip_simulation,
    ));

    let teleop_cancel = cancel.child_token();
    let teleop = TeleopController::new(
        session.dispatcher().clone(),
        snapshot_rx,
        session.subscribe(),
        teleop_settings,
    )
    .spawn(teleop_cancel.clone());

    if config.relay.role == RelayRole::Server {
        let relay = RelayServer::new(config.relay.clone(), session.dispatcher().clone())
            .spawn(cancel.clone());
        tokio::spawn(report_relay_exit(relay));
    }

    // Stopped before the shutdown disable so it cannot re-enable the arm.
    let enable_cancel = cancel.child_token();
    let auto_enable = config
        .robot
        .enable_on_connect
        .then(|| session.spawn_auto_enable(enable_cancel.clone()));

    if let Err(e) = session.connect().await {
        warn!(
            "Initial connection to {} failed: {}, retrying in the background",
            session.address(),
            e
        );
    }

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, stopping robot");

    teleop_cancel.cancel();
    if teleop.await.is_err() {
        error!("Teleop loop panicked");
    }
    enable_cancel.cancel();
    if let Some(handle) = auto_enable {
        if handle.await.is_err() {
            error!("Auto-enable task panicked");
        }
    }

    if let Err(e) = session.stop_jog().await {
        warn!("Failed to stop jog: {}", e);
    }
    if session.state().enabled {
        if let Err(e) = session.disable().await {
            warn!("Failed to disable robot: {}", e);
        }
    }
    session.disconnect().await;

    cancel.cancel();
    if dispatch_handle.await.is_err() {
        error!("Dispatcher panicked");
    }
    if supervisor.await.is_err() {
        error!("Reconnect supervisor panicked");
    }
    Ok(())
}

/// Every command goes through the broker to a relay server.
async fn run_relay_client(
    config: &AppConfig,
    initial: SessionState,
    snapshot_rx: watch::Receiver<InputSnapshot>,
    teleop_settings: TeleopSettings,
    cancel: &CancellationToken,
) -> Result<()> {
    let (relay, relay_handle) = RelayClient::connect(&config.relay, initial, cancel.clone());
    tokio::spawn(report_relay_exit(relay_handle));
    tokio::spawn(log_relay_messages(relay.subscribe()));

    let teleop_cancel = cancel.child_token();
    let teleop = TeleopController::new(
        relay.clone(),
        snapshot_rx,
        relay.session(),
        teleop_settings,
    )
    .spawn(teleop_cancel.clone());

    if config.robot.enable_on_connect {
        relay.enqueue_with(Command::enable_robot(), Some(SessionEffect::Enabled(true)));
    }

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, stopping robot");

    teleop_cancel.cancel();
    if teleop.await.is_err() {
        error!("Teleop loop panicked");
    }

    relay.enqueue(Command::stop_jog());
    relay.enqueue_with(Command::disable_robot(), Some(SessionEffect::Enabled(false)));
    tokio::time::sleep(RELAY_DRAIN).await;
    Ok(())
}

async fn report_relay_exit(handle: JoinHandle<Result<(), RelayError>>) {
    match handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Relay stopped: {}", e),
        Err(e) => error!("Relay task failed: {}", e),
    }
}

async fn log_relay_messages(mut messages: broadcast::Receiver<RelayMessage>) {
    loop {
        match messages.recv().await {
            Ok(RelayMessage::Result(result)) => {
                if let Some(error) = &result.error {
                    warn!("{} failed on the robot side: {}", result.command, error);
                }
            }
            Ok(RelayMessage::State(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Missed {} relay messages", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
