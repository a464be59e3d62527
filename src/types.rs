use std::fmt;

use crate::protocol::{EEG_CHANNEL_COUNT, EEG_CHANNEL_NAMES};

/// One decoded headset frame.
///
/// Produced by [`crate::parse::PacketCodec::decode`] once per frame and handed
/// straight to the classifier.  Nothing in the control loop retains readings
/// across ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Wall-clock capture time in milliseconds since Unix epoch.
    pub timestamp: f64,
    /// Frame counter from byte 0.  Wraps freely; gaps and repeats are not errors.
    pub counter: u8,
    /// Horizontal head rotation, bias-corrected (`raw − 102`).
    pub gyro_x: i16,
    /// Vertical head rotation, bias-corrected (`raw − 204`).
    pub gyro_y: i16,
    /// Raw signed samples in [`EEG_CHANNEL_NAMES`] order.
    ///
    /// A fixed-size array: a reading with fewer than 14 channels cannot exist.
    pub eeg_channels: [i16; EEG_CHANNEL_COUNT],
    /// Battery indicator, either `0` or `100`.
    pub battery: u8,
}

impl SensorReading {
    /// Look up an EEG sample by electrode name (`"AF3"`, `"O1"`, …).
    pub fn channel(&self, name: &str) -> Option<i16> {
        EEG_CHANNEL_NAMES
            .iter()
            .position(|&n| n.eq_ignore_ascii_case(name))
            .map(|i| self.eeg_channels[i])
    }
}

/// Discrete head-movement decision derived from the two gyro axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovementIntent {
    Forward,
    Backward,
    Left,
    Right,
    /// Head is still (every axis inside the threshold band).
    None,
}

impl fmt::Display for MovementIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MovementIntent::Forward => "forward",
            MovementIntent::Backward => "backward",
            MovementIntent::Left => "left",
            MovementIntent::Right => "right",
            MovementIntent::None => "none",
        })
    }
}

/// Lifecycle of one [`crate::controller::ControlSession`].
///
/// ```text
/// Disconnected ──open ok──▶ Connected ──takeoff──▶ Flying ──cancel/exit/panic──▶ Landing ──▶ Terminated
///      │
///      └──open failed──▶ (run returns ConnectionFailure)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightState {
    Disconnected,
    Connected,
    Flying,
    Landing,
    Terminated,
}

impl fmt::Display for FlightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Counters collected over one control session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Cadence ticks executed while flying.
    pub ticks: u64,
    /// Non-empty reads from the frame source.
    pub frames_read: u64,
    /// Frames that decoded into a [`SensorReading`].
    pub readings: u64,
    /// Frames rejected by the codec.
    pub decode_failures: u64,
    /// Movement commands handed to the actuator link.
    pub commands: u64,
    /// `true` once the land command has been issued.
    pub landed: bool,
}

/// Snapshot of [`crate::actuator::ActuatorLink`] counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Datagrams handed to the socket successfully.
    pub sent: u64,
    /// Sends that failed and were swallowed.
    pub send_failures: u64,
    /// Acknowledgement datagrams received.
    pub acks: u64,
}
