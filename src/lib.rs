//! # epoc-pilot
//!
//! Fly a Tello-style drone with head movements picked up by a 14-channel
//! EEG headset.
//!
//! The headset streams 32-byte AES-128-ECB frames carrying 14 EEG channels
//! and a two-axis gyroscope.  Each control tick decodes one frame, turns the
//! gyro pair into a [`types::MovementIntent`], and sends the matching text
//! command to the drone over UDP.  Drone replies are logged by a background
//! task.  Whatever ends the flight (Ctrl-C, a dropped signal, a panic in the
//! loop), the drone is told to `land` exactly once.
//!
//! ## Quick start
//!
//! ```no_run
//! use epoc_pilot::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ControllerConfig::default();
//!     let source = SimulatedHeadset::new(&config.cipher_key);
//!     let mut session = ControlSession::new(config, source);
//!
//!     let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         stop_tx.send(true).ok();
//!     });
//!
//!     let summary = session.run(stop_rx).await?;
//!     println!("{} commands sent", summary.commands);
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the commonly needed types |
//! | [`protocol`] | Frame layout, cipher key, electrode names, drone commands |
//! | [`types`] | Readings, intents, flight states, counters |
//! | [`parse`] | Frame decryption and decoding |
//! | [`classifier`] | Threshold classifier and gyro filters |
//! | [`transport`] | Frame sources: simulator and USB HID |
//! | [`actuator`] | UDP command link and acknowledgement listener |
//! | [`controller`] | The control session state machine |
//! | [`config`] | Run configuration and environment overrides |
//! | [`error`] | Error types |

pub mod actuator;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub mod parse;
pub mod protocol;
pub mod transport;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    // ── Session ───────────────────────────────────────────────────────────────
    pub use crate::config::ControllerConfig;
    pub use crate::controller::ControlSession;

    // ── Components ────────────────────────────────────────────────────────────
    pub use crate::actuator::{ActuatorConfig, ActuatorLink, MoveDirection, TurnDirection};
    pub use crate::classifier::{classify, FilterKind, GyroFilter, MovementClassifier};
    pub use crate::parse::{CipherKey, PacketCodec};
    pub use crate::transport::{DeviceConfig, FrameSource, SimFrame, SimulatedHeadset};

    #[cfg(feature = "hid")]
    pub use crate::transport::HidFrameSource;

    // ── Data types ────────────────────────────────────────────────────────────
    pub use crate::error::{ControlError, DecodeError, LinkError, TransportError};
    pub use crate::protocol::{Command, EEG_CHANNEL_NAMES, FRAME_LEN};
    pub use crate::types::{FlightState, LinkStats, MovementIntent, RunSummary, SensorReading};
}
