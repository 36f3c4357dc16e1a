use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use steam_input_bridge::bridge::{InputBridge, ManifestSource};
use steam_input_bridge::config::BridgeSettings;
use steam_input_bridge::native::gilrs_backend::GilrsInput;
use steam_input_bridge::runtime::BridgeHandle;
use steam_input_bridge::sink::{EngineEventKind, EngineInputEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings = match std::env::args().nth(1) {
        Some(path) => BridgeSettings::load(&PathBuf::from(path))?,
        None => BridgeSettings::load_or_default()?,
    };

    info!("Starting gilrs input backend");
    let native = GilrsInput::new(&settings.gilrs.bindings);
    let bridge = InputBridge::start(
        Box::new(native),
        ManifestSource::File(settings.manifest_path.clone()),
        &settings,
    )
    .map_err(|e| eyre!("Failed to start input bridge: {}", e))?;

    let (batch_tx, mut batch_rx) = mpsc::channel(64);
    let mut driver = BridgeHandle::spawn(bridge, &settings, batch_tx);

    info!("Input bridge running, press Ctrl-C to stop");
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;
                info!("Ctrl-C received");
                break;
            }
            batch = batch_rx.recv() => match batch {
                Some(batch) => log_batch(&batch),
                None => break,
            },
        }
    }

    driver.shutdown().await?;
    Ok(())
}

fn log_batch(batch: &[EngineInputEvent]) {
    for event in batch {
        match (&event.kind, &event.control) {
            (EngineEventKind::DeviceConnected { controller_type }, _) => {
                info!("Device {} connected ({})", event.device, controller_type)
            }
            (EngineEventKind::DeviceDisconnected, _) => {
                info!("Device {} disconnected", event.device)
            }
            (kind, Some(control)) => info!(
                "[{}] device {} {}: {:?}",
                event.dispatched_at.format("%H:%M:%S%.3f"),
                event.device,
                control,
                kind
            ),
            (kind, None) => debug!("Device {} {:?}", event.device, kind),
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
