//! Frame layout, cipher key, electrode labels, and the actuator's text command set.
//!
//! Two wire formats meet in this crate:
//!
//! * **Headset frames** — 32 bytes, AES-128 in ECB mode (two blocks), fixed key.
//! * **Actuator commands** — one UTF-8 text command per UDP datagram.

use std::fmt;

use crate::types::MovementIntent;

// ── Headset frame ─────────────────────────────────────────────────────────────

/// Length of one raw (and decrypted) headset frame in bytes.
pub const FRAME_LEN: usize = 32;

/// Number of EEG channels carried in every frame.
pub const EEG_CHANNEL_COUNT: usize = 14;

/// Default AES-128 key for the headset stream.
///
/// Hex `31 00 35 54 38 10 37 42 31 00 35 48 38 00 37 50`.
pub const DEFAULT_CIPHER_KEY: [u8; 16] = [
    0x31, 0x00, 0x35, 0x54, 0x38, 0x10, 0x37, 0x42, 0x31, 0x00, 0x35, 0x48, 0x38, 0x00, 0x37,
    0x50,
];

/// Decrypted byte offsets.
///
/// | Offset | Field |
/// |---|---|
/// | 0 | frame counter |
/// | 1–28 | 14 × i16 big-endian EEG samples |
/// | 29 | gyro X (raw, bias 102) |
/// | 30 | gyro Y (raw, bias 204) |
/// | 31 | bit 0 = battery indicator |
pub mod offset {
    pub const COUNTER: usize = 0;
    pub const EEG_START: usize = 1;
    pub const EEG_END: usize = 29;
    pub const GYRO_X: usize = 29;
    pub const GYRO_Y: usize = 30;
    pub const BATTERY: usize = 31;
}

/// Calibration bias subtracted from the raw gyro X byte.
pub const GYRO_X_BIAS: i16 = 102;

/// Calibration bias subtracted from the raw gyro Y byte.
pub const GYRO_Y_BIAS: i16 = 204;

/// Electrode names in frame order.
pub const EEG_CHANNEL_NAMES: [&str; EEG_CHANNEL_COUNT] = [
    "AF3", "F7", "F3", "FC5", "T7", "P7", "O1", "O2", "P8", "T8", "FC6", "F4", "F8", "AF4",
];

/// USB vendor id of the headset receiver dongle.
pub const HEADSET_VENDOR_ID: u16 = 0x1234;

/// USB product id of the headset receiver dongle.
pub const HEADSET_PRODUCT_ID: u16 = 0xed02;

// ── Actuator ──────────────────────────────────────────────────────────────────

/// Where the drone listens for commands.
pub const DEFAULT_ACTUATOR_ADDR: &str = "192.168.10.1:8889";

/// Local endpoint the link binds; the drone replies here.
pub const DEFAULT_LOCAL_ADDR: &str = "0.0.0.0:9000";

/// Default `forward` / `back` distance in centimetres.
pub const DEFAULT_MOVE_DISTANCE: u32 = 50;

/// Default `cw` / `ccw` rotation in degrees.
pub const DEFAULT_TURN_DEGREES: u32 = 30;

/// Largest acknowledgement datagram the receiver will read.
pub const ACK_BUFFER_LEN: usize = 1024;

/// A single actuator command.
///
/// `Display` renders the exact wire text:
///
/// ```
/// # use epoc_pilot::protocol::Command;
/// assert_eq!(Command::Enable.to_string(), "command");
/// assert_eq!(Command::Forward(50).to_string(), "forward 50");
/// assert_eq!(Command::Ccw(30).to_string(), "ccw 30");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Switch the drone into SDK mode; must precede `takeoff`.
    Enable,
    Takeoff,
    Land,
    /// Fly forward by N cm.
    Forward(u32),
    /// Fly backward by N cm.
    Back(u32),
    /// Rotate counter-clockwise by N degrees.
    Ccw(u32),
    /// Rotate clockwise by N degrees.
    Cw(u32),
}

impl Command {
    /// Translate a classified intent into a movement command.
    ///
    /// Returns `None` for [`MovementIntent::None`]; no command is sent and the
    /// drone keeps doing whatever it was doing.
    pub fn for_intent(intent: MovementIntent, distance: u32, degrees: u32) -> Option<Self> {
        match intent {
            MovementIntent::Forward => Some(Command::Forward(distance)),
            MovementIntent::Backward => Some(Command::Back(distance)),
            MovementIntent::Left => Some(Command::Ccw(degrees)),
            MovementIntent::Right => Some(Command::Cw(degrees)),
            MovementIntent::None => None,
        }
    }

    /// Bytes of one command datagram.
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Enable => f.write_str("command"),
            Command::Takeoff => f.write_str("takeoff"),
            Command::Land => f.write_str("land"),
            Command::Forward(n) => write!(f, "forward {n}"),
            Command::Back(n) => write!(f, "back {n}"),
            Command::Ccw(n) => write!(f, "ccw {n}"),
            Command::Cw(n) => write!(f, "cw {n}"),
        }
    }
}

/// Decode an acknowledgement datagram for logging.
///
/// Invalid UTF-8 is replaced rather than rejected, and trailing CR/LF is trimmed.
pub fn decode_ack(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\r', '\n'])
        .to_owned()
}
