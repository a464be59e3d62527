//! Run configuration.
//!
//! Every knob has a default matching the stock headset and drone.  The binary
//! loads [`ControllerConfig::from_env`], which applies these overrides:
//!
//! | Variable | Field | Example |
//! |---|---|---|
//! | `EPOC_PILOT_ACTUATOR_ADDR` | `actuator.remote_addr` | `192.168.10.1:8889` |
//! | `EPOC_PILOT_LOCAL_ADDR` | `actuator.local_addr` | `0.0.0.0:9000` |
//! | `EPOC_PILOT_THRESHOLD` | `threshold` | `15` |
//! | `EPOC_PILOT_TICK_MS` | `tick_interval` | `100` |
//! | `EPOC_PILOT_CIPHER_KEY` | `cipher_key` | 32 hex digits |
//! | `EPOC_PILOT_FILTER` | `filter` | `none` / `kalman` |
//! | `EPOC_PILOT_SIMULATE` | `simulate` | `1` / `true` |

use std::time::Duration;

use crate::actuator::ActuatorConfig;
use crate::classifier::{FilterKind, DEFAULT_THRESHOLD};
use crate::error::ConfigError;
use crate::parse::CipherKey;
use crate::transport::DeviceConfig;

/// Default control-loop cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Everything a [`crate::controller::ControlSession`] needs.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// AES key for the headset stream.
    pub cipher_key: CipherKey,
    /// USB ids of the headset receiver.
    pub device: DeviceConfig,
    /// Drone link settings.
    pub actuator: ActuatorConfig,
    /// Classifier dead-band. Default: `15`.
    pub threshold: i16,
    /// Time between control ticks. Default: 100 ms.
    pub tick_interval: Duration,
    /// Gyro smoothing before classification. Default: none.
    pub filter: FilterKind,
    /// Use the built-in headset simulator instead of the USB device.
    pub simulate: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cipher_key: CipherKey::default(),
            device: DeviceConfig::default(),
            actuator: ActuatorConfig::default(),
            threshold: DEFAULT_THRESHOLD,
            tick_interval: DEFAULT_TICK_INTERVAL,
            filter: FilterKind::None,
            simulate: false,
        }
    }
}

impl ControllerConfig {
    /// Defaults overridden by `EPOC_PILOT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("EPOC_PILOT_ACTUATOR_ADDR") {
            config.actuator.remote_addr = v;
        }
        if let Some(v) = lookup("EPOC_PILOT_LOCAL_ADDR") {
            config.actuator.local_addr = v;
        }
        if let Some(v) = lookup("EPOC_PILOT_THRESHOLD") {
            config.threshold = parse_num("EPOC_PILOT_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("EPOC_PILOT_TICK_MS") {
            let ms: u64 = parse_num("EPOC_PILOT_TICK_MS", &v)?;
            if ms == 0 {
                return Err(invalid("EPOC_PILOT_TICK_MS", &v, "must be at least 1"));
            }
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(v) = lookup("EPOC_PILOT_CIPHER_KEY") {
            config.cipher_key = CipherKey::from_hex(&v).map_err(|e| match e {
                ConfigError::Invalid { reason, .. } => {
                    invalid("EPOC_PILOT_CIPHER_KEY", &v, &reason)
                }
            })?;
        }
        if let Some(v) = lookup("EPOC_PILOT_FILTER") {
            config.filter = match v.trim().to_ascii_lowercase().as_str() {
                "" | "none" => FilterKind::None,
                "kalman" => FilterKind::Kalman { q: 1e-2, r: 1.0 },
                _ => return Err(invalid("EPOC_PILOT_FILTER", &v, "expected none or kalman")),
            };
        }
        if let Some(v) = lookup("EPOC_PILOT_SIMULATE") {
            config.simulate = parse_flag("EPOC_PILOT_SIMULATE", &v)?;
        }

        Ok(config)
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_owned(),
        reason: reason.to_owned(),
    }
}

fn parse_num<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(var, value, &e.to_string()))
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(invalid(var, value, "expected a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Result<ControllerConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ControllerConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let c = from(&[]).unwrap();
        assert_eq!(c.threshold, 15);
        assert_eq!(c.tick_interval, Duration::from_millis(100));
        assert_eq!(c.filter, FilterKind::None);
        assert!(!c.simulate);
        assert_eq!(c.actuator.remote_addr, "192.168.10.1:8889");
        assert_eq!(c.cipher_key, CipherKey::default());
    }

    #[test]
    fn overrides_apply() {
        let c = from(&[
            ("EPOC_PILOT_ACTUATOR_ADDR", "127.0.0.1:8889"),
            ("EPOC_PILOT_LOCAL_ADDR", "127.0.0.1:0"),
            ("EPOC_PILOT_THRESHOLD", "25"),
            ("EPOC_PILOT_TICK_MS", "50"),
            ("EPOC_PILOT_FILTER", "Kalman"),
            ("EPOC_PILOT_SIMULATE", "true"),
            ("EPOC_PILOT_CIPHER_KEY", "000102030405060708090a0b0c0d0e0f"),
        ])
        .unwrap();
        assert_eq!(c.actuator.remote_addr, "127.0.0.1:8889");
        assert_eq!(c.actuator.local_addr, "127.0.0.1:0");
        assert_eq!(c.threshold, 25);
        assert_eq!(c.tick_interval, Duration::from_millis(50));
        assert!(matches!(c.filter, FilterKind::Kalman { .. }));
        assert!(c.simulate);
        assert_eq!(c.cipher_key.as_bytes()[15], 0x0f);
    }

    #[test]
    fn bad_values_name_the_variable() {
        for (var, value) in [
            ("EPOC_PILOT_THRESHOLD", "loud"),
            ("EPOC_PILOT_TICK_MS", "0"),
            ("EPOC_PILOT_FILTER", "median"),
            ("EPOC_PILOT_SIMULATE", "maybe"),
            ("EPOC_PILOT_CIPHER_KEY", "abcd"),
        ] {
            match from(&[(var, value)]) {
                Err(ConfigError::Invalid { var: v, .. }) => assert_eq!(v, var),
                Ok(_) => panic!("{var}={value} should be rejected"),
            }
        }
    }
}
