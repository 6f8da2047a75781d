//! Default bus routing and the in-transit speed cutoff rewrite.
//!
//! # Routing
//!
//! The baseline topology is a two-hop relay:
//!
//! ```text
//! vehicle bus (0)  <──>  gateway  <──>  assistance-computer bus (2)
//! ```
//!
//! Frames from bus 0 go to bus 2, frames from bus 2 go to bus 0, anything
//! else is not relayed. Policies inherit this through
//! [`SafetyPolicy::fwd`][crate::policy::SafetyPolicy::fwd].
//!
//! # Speed cutoff
//!
//! The instrument-cluster frame (`CLU11`, address 1265) carries the displayed
//! vehicle speed. The power-steering enable logic downstream reads it, so the
//! gateway floors the speed at the motor-driven power steering cutoff before
//! relaying it. Layout of the 4-byte payload, as far as this module cares:
//!
//! ```text
//! byte 1        : speed bits 0..=7
//! byte 2, bit 0 : speed bit 8
//! byte 2, bit 1 : display unit (1 = mph, 0 = km/h)
//! ```
//!
//! Speeds are raw fixed-point counts (factor 0.5 in the message definition),
//! so the cutoffs below are twice the physical value.

use safegate_types::CanFrame;

/// Bus facing the vehicle's own ECUs.
pub const VEHICLE_BUS: u8 = 0;
/// Bus facing the driving-assistance computer.
pub const ASSIST_BUS: u8 = 2;

/// Arbitration id of the instrument-cluster frame.
pub const CLU11_ADDR: u32 = 1265;
/// Payload length of the instrument-cluster frame.
pub const CLU11_LEN: usize = 4;

const SPEED_LOW_BYTE: usize = 1;
const SPEED_HIGH_BYTE: usize = 2;
/// Speed bit 8 lives in bit 0 of the high byte.
const SPEED_HIGH_MASK: u8 = 0x01;
const SPEED_HIGH_SHIFT: u32 = 8;
const SPEED_UNIT_BYTE: usize = 2;
const SPEED_UNIT_MPH_MASK: u8 = 0x02;

/// Largest value representable in the 9-bit speed field.
pub const SPEED_FIELD_MAX: u16 = 0x1FF;

/// Power steering cutoff in raw counts when the cluster displays mph.
pub const MDPS_CUTOFF_MPH: u16 = 76;
/// Power steering cutoff in raw counts when the cluster displays km/h.
pub const MDPS_CUTOFF_KPH: u16 = 120;

/// Default destination for a frame received on `bus`.
///
/// ```
/// use safegate_kernel::default_route;
///
/// assert_eq!(default_route(0), Some(2));
/// assert_eq!(default_route(2), Some(0));
/// assert_eq!(default_route(1), None);
/// ```
pub fn default_route(bus: u8) -> Option<u8> {
    match bus {
        VEHICLE_BUS => Some(ASSIST_BUS),
        ASSIST_BUS => Some(VEHICLE_BUS),
        _ => None,
    }
}

/// Display unit reported by the cluster frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedUnit {
    /// Unit bit set: speed displayed in miles per hour.
    Mph,
    /// Unit bit clear: speed displayed in kilometres per hour.
    Kph,
}

impl SpeedUnit {
    /// Raw cutoff below which the power steering enable must not be
    /// reported.
    pub const fn mdps_cutoff(self) -> u16 {
        match self {
            SpeedUnit::Mph => MDPS_CUTOFF_MPH,
            SpeedUnit::Kph => MDPS_CUTOFF_KPH,
        }
    }
}

/// What [`enforce_mdps_enable_speed`] did to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// Speed at or above the cutoff; payload untouched.
    Unchanged,
    /// Speed raised from `from` to `to`.
    Clamped { from: u16, to: u16 },
    /// Payload length does not match the cluster layout; payload untouched.
    Malformed { len: usize },
}

/// Decode the display unit and raw 9-bit speed of a cluster frame.
///
/// Returns `None` when the payload is not [`CLU11_LEN`] bytes long.
pub fn cluster_speed(frame: &CanFrame) -> Option<(SpeedUnit, u16)> {
    if frame.len() != CLU11_LEN {
        return None;
    }
    let payload = frame.payload();
    let unit = if payload[SPEED_UNIT_BYTE] & SPEED_UNIT_MPH_MASK != 0 {
        SpeedUnit::Mph
    } else {
        SpeedUnit::Kph
    };
    let speed = u16::from(payload[SPEED_LOW_BYTE])
        | (u16::from(payload[SPEED_HIGH_BYTE] & SPEED_HIGH_MASK) << SPEED_HIGH_SHIFT);
    Some((unit, speed))
}

/// Floor the cluster speed of `frame` at the unit-appropriate power steering
/// cutoff.
///
/// Only the 9 speed bits are written; every other bit of the payload,
/// including the unit flag sharing byte 2, is preserved.
///
/// ```
/// use safegate_kernel::{enforce_mdps_enable_speed, RewriteOutcome};
/// use safegate_types::CanFrame;
///
/// // mph display, raw speed 50
/// let mut frame = CanFrame::new(1265, 0, &[0x00, 50, 0x02, 0x00]).unwrap();
/// assert_eq!(
///     enforce_mdps_enable_speed(&mut frame),
///     RewriteOutcome::Clamped { from: 50, to: 76 }
/// );
/// assert_eq!(frame.payload(), &[0x00, 76, 0x02, 0x00]);
/// ```
pub fn enforce_mdps_enable_speed(frame: &mut CanFrame) -> RewriteOutcome {
    let Some((unit, speed)) = cluster_speed(frame) else {
        return RewriteOutcome::Malformed { len: frame.len() };
    };
    let cutoff = unit.mdps_cutoff();
    if speed >= cutoff {
        return RewriteOutcome::Unchanged;
    }

    let payload = frame.payload_mut();
    payload[SPEED_LOW_BYTE] = (cutoff & 0xFF) as u8;
    payload[SPEED_HIGH_BYTE] = (payload[SPEED_HIGH_BYTE] & !SPEED_HIGH_MASK)
        | ((cutoff >> SPEED_HIGH_SHIFT) as u8 & SPEED_HIGH_MASK);

    RewriteOutcome::Clamped {
        from: speed,
        to: cutoff,
    }
}
