//! Decrypt and decode 32-byte headset frames.
//!
//! Everything here is pure: no I/O, no shared state.  [`PacketCodec::decode`]
//! is safe to call from any task at any rate.
//!
//! # Pipeline
//!
//! ```text
//! raw[32] ──AES-128-ECB (2 blocks)──▶ plain[32] ──▶ SensorReading
//!                                       │
//!                                       ├─ [0]      counter
//!                                       ├─ [1..29]  14 × i16 BE EEG
//!                                       ├─ [29]     gyro_x + 102
//!                                       ├─ [30]     gyro_y + 204
//!                                       └─ [31]&1   battery
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::error::{ConfigError, DecodeError};
use crate::protocol::{
    offset, DEFAULT_CIPHER_KEY, EEG_CHANNEL_COUNT, FRAME_LEN, GYRO_X_BIAS, GYRO_Y_BIAS,
};
use crate::types::SensorReading;

const BLOCK_LEN: usize = 16;

// ── Timestamp helper ──────────────────────────────────────────────────────────

pub(crate) fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

// ── Key ───────────────────────────────────────────────────────────────────────

/// A 16-byte AES-128 key for the headset stream.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CipherKey([u8; 16]);

impl CipherKey {
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parse 32 hex digits (whitespace allowed between bytes).
    ///
    /// ```
    /// # use epoc_pilot::parse::CipherKey;
    /// let k = CipherKey::from_hex("31003554381037423100354838003750").unwrap();
    /// assert_eq!(k, CipherKey::default());
    /// ```
    pub fn from_hex(s: &str) -> Result<Self, ConfigError> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let invalid = |reason: String| ConfigError::Invalid {
            var: "cipher key",
            value: s.to_owned(),
            reason,
        };
        let bytes = hex::decode(&compact).map_err(|e| invalid(e.to_string()))?;
        let key: [u8; 16] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| invalid(format!("expected 16 bytes, got {}", v.len())))?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl Default for CipherKey {
    fn default() -> Self {
        Self(DEFAULT_CIPHER_KEY)
    }
}

// Keys stay out of logs.
impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

// ── Cipher ────────────────────────────────────────────────────────────────────

/// AES-128 in ECB mode over whole 32-byte frames.
#[derive(Clone)]
pub struct FrameCipher {
    aes: Aes128,
}

impl FrameCipher {
    pub fn new(key: &CipherKey) -> Self {
        Self {
            aes: Aes128::new(GenericArray::from_slice(key.as_bytes())),
        }
    }

    /// Decrypt a frame in place, one 16-byte block at a time.
    pub fn decrypt(&self, frame: &mut [u8; FRAME_LEN]) {
        for block in frame.chunks_exact_mut(BLOCK_LEN) {
            self.aes.decrypt_block(GenericArray::from_mut_slice(block));
        }
    }

    /// Inverse of [`decrypt`](Self::decrypt).  Used by the headset simulator.
    pub fn encrypt(&self, frame: &mut [u8; FRAME_LEN]) {
        for block in frame.chunks_exact_mut(BLOCK_LEN) {
            self.aes.encrypt_block(GenericArray::from_mut_slice(block));
        }
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Turns encrypted transport frames into [`SensorReading`]s.
#[derive(Clone)]
pub struct PacketCodec {
    cipher: FrameCipher,
}

impl PacketCodec {
    pub fn new(key: &CipherKey) -> Self {
        Self {
            cipher: FrameCipher::new(key),
        }
    }

    /// Decode one raw frame, stamping it with the current wall-clock time.
    pub fn decode(&self, raw: &[u8]) -> Result<SensorReading, DecodeError> {
        self.decode_at(raw, now_ms())
    }

    /// Decode one raw frame with a caller-supplied timestamp (ms since epoch).
    ///
    /// Any length other than [`FRAME_LEN`] is [`DecodeError::MalformedFrame`];
    /// short input never produces a short reading.
    pub fn decode_at(&self, raw: &[u8], timestamp: f64) -> Result<SensorReading, DecodeError> {
        let mut frame: [u8; FRAME_LEN] = raw
            .try_into()
            .map_err(|_| DecodeError::MalformedFrame { len: raw.len() })?;
        self.cipher.decrypt(&mut frame);
        Ok(parse_plain_frame(&frame, timestamp))
    }
}

/// Decode the 14 big-endian EEG samples from a decrypted frame.
pub fn decode_eeg_channels(plain: &[u8; FRAME_LEN]) -> [i16; EEG_CHANNEL_COUNT] {
    let mut eeg = [0i16; EEG_CHANNEL_COUNT];
    for (dst, pair) in eeg
        .iter_mut()
        .zip(plain[offset::EEG_START..offset::EEG_END].chunks_exact(2))
    {
        *dst = i16::from_be_bytes([pair[0], pair[1]]);
    }
    eeg
}

/// Parse an already-decrypted frame.
pub fn parse_plain_frame(plain: &[u8; FRAME_LEN], timestamp: f64) -> SensorReading {
    SensorReading {
        timestamp,
        counter: plain[offset::COUNTER],
        gyro_x: plain[offset::GYRO_X] as i16 - GYRO_X_BIAS,
        gyro_y: plain[offset::GYRO_Y] as i16 - GYRO_Y_BIAS,
        eeg_channels: decode_eeg_channels(plain),
        battery: (plain[offset::BATTERY] & 0x01) * 100,
    }
}

/// Build a decrypted frame from its fields.  The inverse of [`parse_plain_frame`].
///
/// Gyro values are clamped to what one biased byte can carry.
pub fn build_plain_frame(
    counter: u8,
    eeg: &[i16; EEG_CHANNEL_COUNT],
    gyro_x: i16,
    gyro_y: i16,
    battery: bool,
) -> [u8; FRAME_LEN] {
    let mut plain = [0u8; FRAME_LEN];
    plain[offset::COUNTER] = counter;
    for (dst, v) in plain[offset::EEG_START..offset::EEG_END]
        .chunks_exact_mut(2)
        .zip(eeg)
    {
        dst.copy_from_slice(&v.to_be_bytes());
    }
    plain[offset::GYRO_X] = gyro_x.saturating_add(GYRO_X_BIAS).clamp(0, 255) as u8;
    plain[offset::GYRO_Y] = gyro_y.saturating_add(GYRO_Y_BIAS).clamp(0, 255) as u8;
    plain[offset::BATTERY] = u8::from(battery);
    plain
}
