use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum payload of a classic CAN frame, in bytes.
pub const MAX_PAYLOAD: usize = 8;

/// One classic CAN frame as handed from the bus driver to the safety hooks.
///
/// The payload lives inline so frames can be copied through the hot path
/// without touching the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    /// 11- or 29-bit arbitration identifier.
    pub addr: u32,
    /// Index of the bus the frame was received on (or is destined for).
    pub bus: u8,
    data: [u8; MAX_PAYLOAD],
    len: u8,
}

impl CanFrame {
    /// Build a frame from a payload slice.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::FrameTooLong`] when `payload` exceeds
    /// [`MAX_PAYLOAD`] bytes.
    pub fn new(addr: u32, bus: u8, payload: &[u8]) -> Result<Self, GateError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(GateError::FrameTooLong { len: payload.len() });
        }
        let mut data = [0u8; MAX_PAYLOAD];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            addr,
            bus,
            data,
            len: payload.len() as u8,
        })
    }

    /// Number of valid payload bytes.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The valid part of the payload.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// Mutable access to the valid part of the payload, for in-place rewrites.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let len = self.len();
        &mut self.data[..len]
    }

    /// Payload byte at `index`, or `None` past the frame length.
    pub fn byte(&self, index: usize) -> Option<u8> {
        self.payload().get(index).copied()
    }

    /// Copy of this frame retagged for another bus.
    pub fn with_bus(mut self, bus: u8) -> Self {
        self.bus = bus;
        self
    }
}

/// Built-in safety profiles, identified on the wire by a stable numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SafetyMode {
    /// No actuation output is ever admitted.
    #[default]
    NoOutput,
    /// Every actuation output is admitted. Bench bring-up only.
    AllOutput,
}

impl SafetyMode {
    /// Every built-in mode, in identifier order.
    pub const ALL: [SafetyMode; 2] = [SafetyMode::AllOutput, SafetyMode::NoOutput];

    /// Stable numeric identifier used by `set_safety_mode`.
    pub const fn id(self) -> u16 {
        match self {
            SafetyMode::AllOutput => 17,
            SafetyMode::NoOutput => 19,
        }
    }

    /// Resolve a numeric identifier, or `None` when it is not a known mode.
    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.id() == id)
    }

    /// Parse the configuration name (`"no_output"`, `"all_output"`).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    pub const fn name(self) -> &'static str {
        match self {
            SafetyMode::NoOutput => "no_output",
            SafetyMode::AllOutput => "all_output",
        }
    }
}

impl fmt::Display for SafetyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse lifecycle of the gateway, derived from the global safety flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyLifecycle {
    /// No policy `init` has run yet; every actuation request is denied.
    Uninitialized,
    /// `controls_allowed == false`.
    Restricted,
    /// `controls_allowed == true`.
    Permitted,
    /// Relay malfunction latched; cleared only by a fresh `init`.
    Faulted,
}

/// Point-in-time copy of the gateway state, published for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySnapshot {
    pub safety_mode: SafetyMode,
    pub safety_param: u16,
    pub lifecycle: SafetyLifecycle,
    pub controls_allowed: bool,
    pub relay_malfunction: bool,
    pub rx_frames: u64,
    pub tx_admitted: u64,
    pub tx_blocked: u64,
    pub forwarded: u64,
    /// Relayed frames the active policy floored in transit.
    pub rewrites_clamped: u64,
    /// Rewrite targets relayed untouched because of an unexpected length.
    pub rewrites_malformed: u64,
}

/// Safety-relevant conditions raised by the bus layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyAlert {
    /// A stock ECU frame was seen where the relay should have isolated it.
    RelayMalfunction { bus: u8, addr: u32 },
    /// A profile selection named an unknown mode; the restrictive policy was
    /// installed instead.
    UnknownSafetyMode { requested: u16 },
}

/// Event wrapper for the telemetry bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "safegate-hal::router"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the telemetry bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Snapshot(SafetySnapshot),
    Alert(SafetyAlert),
}

/// Error type shared by every safegate crate.
///
/// Admission denial is not an error: hooks answer with plain `bool` /
/// `Option<u8>` decisions.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateError {
    #[error("Unknown safety mode {0}; restrictive policy installed")]
    UnknownSafetyMode(u16),

    #[error("Frame payload of {len} bytes exceeds 8")]
    FrameTooLong { len: usize },

    #[error("No port registered for bus {0}")]
    PortNotRegistered(u8),

    #[error("No port registered for LIN channel {0}")]
    LinChannelNotRegistered(u8),

    #[error("Port fault on bus {bus}: {details}")]
    PortFault { bus: u8, details: String },

    #[error("Telemetry channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
