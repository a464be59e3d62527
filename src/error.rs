//! Error types for every component.
//!
//! Only [`ControlError`] ever leaves [`crate::controller::ControlSession::run`];
//! the rest are absorbed (and logged) inside the component that raised them.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// A raw frame could not be turned into a [`crate::types::SensorReading`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The transport handed over something other than exactly 32 bytes.
    #[error("malformed frame: expected 32 bytes, got {len}")]
    MalformedFrame { len: usize },
}

/// Failures on the UDP command link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("could not bind local endpoint {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("could not resolve actuator address {addr}: {reason}")]
    Resolve { addr: String, reason: String },
    #[error("send to {addr} failed: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("acknowledgement receive failed: {0}")]
    Receive(#[source] io::Error),
    #[error("link is closed")]
    Closed,
}

/// Failures of the headset frame source.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not open headset {vendor_id:04x}:{product_id:04x}: {reason}")]
    Open {
        vendor_id: u16,
        product_id: u16,
        reason: String,
    },
    #[error("headset read failed: {0}")]
    Read(String),
    #[error("headset is not open")]
    NotOpen,
}

/// A configuration value could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Startup failures that abort a run before flight begins.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("connection failure: {0}")]
    ConnectionFailure(#[source] ConnectionFailure),
    /// `run` was called on a session that already flew.
    #[error("session already used (state {0})")]
    SessionConsumed(crate::types::FlightState),
}

/// What exactly failed to connect.
#[derive(Debug, Error)]
pub enum ConnectionFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Link(#[from] LinkError),
}

impl From<TransportError> for ControlError {
    fn from(e: TransportError) -> Self {
        ControlError::ConnectionFailure(e.into())
    }
}

impl From<LinkError> for ControlError {
    fn from(e: LinkError) -> Self {
        ControlError::ConnectionFailure(e.into())
    }
}
