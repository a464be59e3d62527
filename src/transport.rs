//! Sources of raw 32-byte headset frames.
//!
//! The control loop only needs three things from a transport: open it once,
//! poll it without blocking, and close it.  [`FrameSource`] captures exactly
//! that.  Two implementations ship with the crate:
//!
//! * [`SimulatedHeadset`] — synthetic, already-encrypted frames; no hardware.
//! * [`HidFrameSource`] — the USB receiver dongle via `hidapi`
//!   (cargo feature `hid`).

use std::collections::VecDeque;
use std::f64::consts::PI;

use log::info;

use crate::error::TransportError;
use crate::parse::{build_plain_frame, CipherKey, FrameCipher};
use crate::protocol::{EEG_CHANNEL_COUNT, FRAME_LEN, HEADSET_PRODUCT_ID, HEADSET_VENDOR_ID};

/// A non-blocking supplier of encrypted headset frames.
pub trait FrameSource: Send {
    /// Open the device.  Called exactly once, before the first [`read`](Self::read).
    fn open(&mut self) -> Result<(), TransportError>;

    /// Copy at most one frame into `buf` without blocking.
    ///
    /// Returns the number of bytes written; `0` means no frame is available yet.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Release the device.  The default does nothing.
    fn close(&mut self) {}
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read(buf)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// USB identifiers of the headset receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: HEADSET_VENDOR_ID,
            product_id: HEADSET_PRODUCT_ID,
        }
    }
}

impl DeviceConfig {
    /// Log-friendly `vvvv:pppp`.
    pub fn id_string(&self) -> String {
        format!("{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

// ── Simulator ─────────────────────────────────────────────────────────────────

/// One step of a scripted simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum SimFrame {
    /// The read returns nothing this time.
    Empty,
    /// A well-formed frame with the given bias-corrected gyro pair.
    Pose { gyro_x: i16, gyro_y: i16 },
    /// These exact bytes, unencrypted and unvalidated.
    Raw(Vec<u8>),
}

enum Pattern {
    /// Built-in head-motion loop, runs forever.
    Sweep { t: f64 },
    /// Fixed script, then empty reads.
    Script(VecDeque<SimFrame>),
}

/// Synthetic headset that produces correctly encrypted frames.
///
/// EEG channels carry a deterministic mix of alpha, beta and theta sinusoids.
/// Gyro motion either follows a built-in loop (rest → nod forward → rest →
/// turn right → rest → nod back → rest → turn left) or a caller-supplied
/// script of [`SimFrame`]s.
pub struct SimulatedHeadset {
    cipher: FrameCipher,
    pattern: Pattern,
    counter: u8,
    open: bool,
    fail_open: bool,
}

/// Frames per pose in the built-in sweep.
const SWEEP_HOLD: f64 = 10.0;

impl SimulatedHeadset {
    /// Endless built-in head-motion loop.
    pub fn new(key: &CipherKey) -> Self {
        Self::with_pattern(key, Pattern::Sweep { t: 0.0 })
    }

    /// Play `frames` in order, then report no data forever.
    pub fn scripted(key: &CipherKey, frames: impl IntoIterator<Item = SimFrame>) -> Self {
        Self::with_pattern(key, Pattern::Script(frames.into_iter().collect()))
    }

    /// A headset whose `open` always fails.
    pub fn unavailable(key: &CipherKey) -> Self {
        let mut s = Self::scripted(key, []);
        s.fail_open = true;
        s
    }

    fn with_pattern(key: &CipherKey, pattern: Pattern) -> Self {
        Self {
            cipher: FrameCipher::new(key),
            pattern,
            counter: 0,
            open: false,
            fail_open: false,
        }
    }

    fn encrypted_frame(&mut self, gyro_x: i16, gyro_y: i16) -> [u8; FRAME_LEN] {
        let t = self.counter as f64 / 128.0;
        let mut eeg = [0i16; EEG_CHANNEL_COUNT];
        for (ch, v) in eeg.iter_mut().enumerate() {
            *v = (sim_sample(t, ch) * 10.0).round() as i16;
        }
        let mut frame = build_plain_frame(self.counter, &eeg, gyro_x, gyro_y, true);
        self.counter = self.counter.wrapping_add(1);
        self.cipher.encrypt(&mut frame);
        frame
    }

    fn next_frame(&mut self) -> Option<Vec<u8>> {
        let step = match &mut self.pattern {
            Pattern::Sweep { t } => {
                let pose = sweep_pose(*t);
                *t += 1.0;
                SimFrame::Pose {
                    gyro_x: pose.0,
                    gyro_y: pose.1,
                }
            }
            Pattern::Script(frames) => frames.pop_front().unwrap_or(SimFrame::Empty),
        };
        match step {
            SimFrame::Empty => None,
            SimFrame::Pose { gyro_x, gyro_y } => Some(self.encrypted_frame(gyro_x, gyro_y).to_vec()),
            SimFrame::Raw(bytes) => Some(bytes),
        }
    }
}

impl FrameSource for SimulatedHeadset {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.fail_open {
            return Err(TransportError::Open {
                vendor_id: HEADSET_VENDOR_ID,
                product_id: HEADSET_PRODUCT_ID,
                reason: "simulated headset unavailable".into(),
            });
        }
        self.open = true;
        info!("Simulated headset ready");
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        match self.next_frame() {
            Some(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// Piecewise head pose for the built-in sweep: eight segments of
/// [`SWEEP_HOLD`] frames each, every movement well past the default threshold.
fn sweep_pose(t: f64) -> (i16, i16) {
    let segment = (t / SWEEP_HOLD) as u64 % 8;
    let wobble = (3.0 * (2.0 * PI * t / 17.0).sin()).round() as i16;
    match segment {
        1 => (wobble, 40),
        3 => (40, wobble),
        5 => (wobble, -40),
        7 => (-40, wobble),
        _ => (wobble, -wobble),
    }
}

/// One synthetic EEG value at time `t` (seconds) for channel `ch`.
///
/// Alpha (10 Hz, ±20), beta (22 Hz, ±6) and theta (6 Hz, ±10) with a
/// per-channel phase and a deterministic noise floor of about ±4.
fn sim_sample(t: f64, ch: usize) -> f64 {
    let phi = ch as f64 * PI / 2.5;
    let alpha = 20.0 * (2.0 * PI * 10.0 * t + phi).sin();
    let beta = 6.0 * (2.0 * PI * 22.0 * t + phi * 1.7).sin();
    let theta = 10.0 * (2.0 * PI * 6.0 * t + phi * 0.9).sin();
    let nx = t * 1000.7 + ch as f64 * 137.508;
    let noise = ((nx.sin() * 9973.1).fract() - 0.5) * 8.0;
    alpha + beta + theta + noise
}

// ── HID ───────────────────────────────────────────────────────────────────────

#[cfg(feature = "hid")]
pub use hid::HidFrameSource;

#[cfg(feature = "hid")]
mod hid {
    use hidapi::{HidApi, HidDevice};
    use log::info;

    use super::{DeviceConfig, FrameSource};
    use crate::error::TransportError;

    /// The headset's USB receiver, read in non-blocking mode.
    pub struct HidFrameSource {
        config: DeviceConfig,
        device: Option<HidDevice>,
    }

    impl HidFrameSource {
        pub fn new(config: DeviceConfig) -> Self {
            Self {
                config,
                device: None,
            }
        }
    }

    impl FrameSource for HidFrameSource {
        fn open(&mut self) -> Result<(), TransportError> {
            let DeviceConfig {
                vendor_id,
                product_id,
            } = self.config;
            let open_err = |reason: String| TransportError::Open {
                vendor_id,
                product_id,
                reason,
            };
            let api = HidApi::new().map_err(|e| open_err(e.to_string()))?;
            let device = api
                .open(vendor_id, product_id)
                .map_err(|e| open_err(e.to_string()))?;
            device
                .set_blocking_mode(false)
                .map_err(|e| open_err(e.to_string()))?;
            info!("Connected to headset {vendor_id:04x}:{product_id:04x}");
            self.device = Some(device);
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let device = self.device.as_ref().ok_or(TransportError::NotOpen)?;
            device
                .read(buf)
                .map_err(|e| TransportError::Read(e.to_string()))
        }

        fn close(&mut self) {
            self.device = None;
        }
    }
}
