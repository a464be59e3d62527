use anyhow::Result;
use log::{error, info, warn};

use epoc_pilot::config::ControllerConfig;
use epoc_pilot::controller::ControlSession;
use epoc_pilot::transport::{FrameSource, SimulatedHeadset};

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    // Set RUST_LOG=debug for per-frame output, e.g.:
    //   RUST_LOG=epoc_pilot=debug cargo run
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── Configuration ─────────────────────────────────────────────────────────
    // Defaults match the stock headset and drone; see `config` for overrides.
    let config = ControllerConfig::from_env()?;
    info!(
        "Drone {} via {}, threshold {}, tick {:?}, filter {:?}",
        config.actuator.remote_addr,
        config.actuator.local_addr,
        config.threshold,
        config.tick_interval,
        config.filter,
    );

    let source = frame_source(&config);

    // ── Ctrl-C → shutdown signal ──────────────────────────────────────────────
    // The session only checks the signal between ticks, so landing starts
    // within one tick of the interrupt.
    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received – landing."),
            Err(e) => warn!("Could not listen for Ctrl-C ({e}); landing."),
        }
        let _ = stop_tx.send(true);
    });

    // ── Fly ───────────────────────────────────────────────────────────────────
    let mut session = ControlSession::new(config, source);
    match session.run(stop_rx).await {
        Ok(summary) => {
            info!(
                "Landed after {} ticks ({} readings, {} commands).",
                summary.ticks, summary.readings, summary.commands
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to start: {e}");
            Err(e.into())
        }
    }
}

#[cfg(feature = "hid")]
fn frame_source(config: &ControllerConfig) -> Box<dyn FrameSource> {
    if config.simulate {
        info!("Using the simulated headset.");
        return Box::new(SimulatedHeadset::new(&config.cipher_key));
    }
    info!("Using headset {}", config.device.id_string());
    Box::new(epoc_pilot::transport::HidFrameSource::new(config.device))
}

#[cfg(not(feature = "hid"))]
fn frame_source(config: &ControllerConfig) -> Box<dyn FrameSource> {
    if !config.simulate {
        warn!("Built without the `hid` feature; using the simulated headset.");
    }
    Box::new(SimulatedHeadset::new(&config.cipher_key))
}
