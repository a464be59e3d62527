//! The sense → classify → actuate loop.
//!
//! A [`ControlSession`] owns one run from device open to landing:
//!
//! 1. **Disconnected → Connected** — open the frame source, bind the actuator
//!    link.  Either failure ends the run with
//!    [`ControlError::ConnectionFailure`] before any command is sent.
//! 2. **Connected → Flying** — `command`, settle, `takeoff`.
//! 3. **Flying** — every tick: one non-blocking read, decode, filter,
//!    classify, and at most one movement command.  Empty reads, read errors
//!    and bad frames all just skip the tick.
//! 4. **Flying → Landing** — the shutdown signal, its sender going away, or a
//!    panic inside a tick.
//! 5. **Landing → Terminated** — `land`, then close the link.
//!
//! `land` is sent exactly once for every run that reached `Flying`.  The
//! normal path lands explicitly; if the run future is dropped mid-flight a
//! guard sends `land` from its destructor instead.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::actuator::ActuatorLink;
use crate::classifier::{GyroFilter, MovementClassifier};
use crate::config::ControllerConfig;
use crate::error::ControlError;
use crate::parse::PacketCodec;
use crate::protocol::FRAME_LEN;
use crate::transport::FrameSource;
use crate::types::{FlightState, MovementIntent, RunSummary};

/// Read failures logged individually before switching to every Nth.
const READ_ERROR_LOG_BURST: u64 = 5;
const READ_ERROR_LOG_EVERY: u64 = 100;

// ── FlightGuard ───────────────────────────────────────────────────────────────

/// Issues `land` exactly once: explicitly via [`land`](Self::land), or from
/// `Drop` if the flight is abandoned without it.
struct FlightGuard<'a> {
    link: &'a ActuatorLink,
    armed: bool,
}

impl<'a> FlightGuard<'a> {
    fn arm(link: &'a ActuatorLink) -> Self {
        Self { link, armed: true }
    }

    /// Stays armed until the send completes, so cancelling this future
    /// mid-send still lands from `Drop`.
    async fn land(mut self) {
        self.link.land().await;
        self.armed = false;
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Flight abandoned without landing; sending land now");
            if let Err(e) = self.link.land_now() {
                error!("Emergency land failed: {e}");
            }
        }
    }
}

// ── ControlSession ────────────────────────────────────────────────────────────

/// One headset-to-drone control run.
///
/// Single use: after [`run`](Self::run) returns, the session is
/// `Terminated` (or still `Disconnected` if it never connected) and a new
/// flight needs a new session.
pub struct ControlSession<S: FrameSource> {
    config: ControllerConfig,
    source: S,
    codec: PacketCodec,
    classifier: MovementClassifier,
    filter: Box<dyn GyroFilter>,
    state: FlightState,
    attempted: bool,
}

impl<S: FrameSource> ControlSession<S> {
    pub fn new(config: ControllerConfig, source: S) -> Self {
        Self {
            codec: PacketCodec::new(&config.cipher_key),
            classifier: MovementClassifier::new(config.threshold),
            filter: config.filter.build(),
            source,
            config,
            state: FlightState::Disconnected,
            attempted: false,
        }
    }

    pub fn state(&self) -> FlightState {
        self.state
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn transition(&mut self, to: FlightState) {
        info!("Flight state: {} → {}", self.state, to);
        self.state = to;
    }

    /// Connect, take off, fly until `shutdown` turns `true`, then land.
    ///
    /// Only a connection failure is returned as an error; everything that
    /// happens after takeoff ends in a landing and an `Ok` summary.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary, ControlError> {
        if self.attempted {
            return Err(ControlError::SessionConsumed(self.state));
        }
        self.attempted = true;

        // ── Disconnected → Connected ─────────────────────────────────────────
        self.source.open()?;
        let link = match ActuatorLink::open(self.config.actuator.clone()).await {
            Ok(link) => link,
            Err(e) => {
                self.source.close();
                return Err(e.into());
            }
        };
        self.transition(FlightState::Connected);

        // ── Connected → Flying ───────────────────────────────────────────────
        let guard = FlightGuard::arm(&link);
        link.takeoff().await;
        self.transition(FlightState::Flying);
        info!("Real-time control started. Move head to control the drone.");

        let mut summary = RunSummary::default();
        let flight = AssertUnwindSafe(self.fly(&link, &mut shutdown, &mut summary))
            .catch_unwind()
            .await;
        if flight.is_err() {
            error!("Control loop panicked; landing");
        }

        // ── Flying → Landing → Terminated ────────────────────────────────────
        self.transition(FlightState::Landing);
        guard.land().await;
        summary.landed = true;
        link.close().await;
        self.source.close();
        self.transition(FlightState::Terminated);

        info!(
            "Run finished: ticks={} frames={} readings={} bad_frames={} commands={}",
            summary.ticks,
            summary.frames_read,
            summary.readings,
            summary.decode_failures,
            summary.commands
        );
        Ok(summary)
    }

    /// Tick at the configured cadence until cancelled.
    ///
    /// Cancellation is only observed between ticks, never inside one.
    async fn fly(
        &mut self,
        link: &ActuatorLink,
        shutdown: &mut watch::Receiver<bool>,
        summary: &mut RunSummary,
    ) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = [0u8; FRAME_LEN];
        let mut read_errors: u64 = 0;

        loop {
            if *shutdown.borrow_and_update() {
                info!("Stopping real-time control.");
                return;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown sender dropped; stopping real-time control.");
                        return;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            summary.ticks += 1;
            self.tick(link, &mut buf, &mut read_errors, summary).await;
        }
    }

    /// One read → decode → classify → dispatch pass.
    async fn tick(
        &mut self,
        link: &ActuatorLink,
        buf: &mut [u8; FRAME_LEN],
        read_errors: &mut u64,
        summary: &mut RunSummary,
    ) {
        let n = match self.source.read(buf) {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) => {
                *read_errors += 1;
                if *read_errors <= READ_ERROR_LOG_BURST
                    || *read_errors % READ_ERROR_LOG_EVERY == 0
                {
                    warn!("Headset read failed ({} so far): {e}", *read_errors);
                }
                return;
            }
        };
        summary.frames_read += 1;

        let reading = match self.codec.decode(&buf[..n]) {
            Ok(r) => r,
            Err(e) => {
                summary.decode_failures += 1;
                debug!("Skipping frame: {e}");
                return;
            }
        };
        summary.readings += 1;

        let (gyro_x, gyro_y) = self.filter.update(reading.gyro_x, reading.gyro_y);
        let intent = self.classifier.classify(gyro_x, gyro_y);
        debug!(
            "frame #{} gyro=({}, {}) filtered=({gyro_x}, {gyro_y}) → {intent}",
            reading.counter, reading.gyro_x, reading.gyro_y
        );

        if intent != MovementIntent::None && link.execute(intent).await {
            summary.commands += 1;
        }
    }
}
