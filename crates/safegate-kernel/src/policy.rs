//! [`SafetyPolicy`] – the per-profile hook set.
//!
//! A policy answers five questions for the bus layer:
//!
//! | Hook | Called | Answer |
//! |------|--------|--------|
//! | `init` | once per profile (re)selection | – (sets `controls_allowed`, clears the fault) |
//! | `rx` | every received frame | always `true`; side effects only |
//! | `tx` | before a CAN frame goes to the car | admit / deny |
//! | `tx_lin` | before a LIN transfer goes to the car | admit / deny |
//! | `fwd` | every received frame | destination bus, or `None` |
//!
//! Hooks run to completion in bounded time and never allocate, block or
//! perform I/O. That includes logging: a policy tallies what it did in
//! [`RewriteCounts`] and the bus layer reports it outside the frame path.

use safegate_types::CanFrame;

use crate::forwarding::default_route;
use crate::state::SafetyState;

/// In-transit rewrites performed by a policy since it was installed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteCounts {
    /// Frames whose payload was rewritten before relay.
    pub clamped: u64,
    /// Rewrite targets relayed untouched because their layout was wrong.
    pub malformed: u64,
}

/// One vehicle profile's safety logic.
///
/// Only [`init`][SafetyPolicy::init] receives the state mutably; the other
/// hooks can read the flags but never change them.
///
/// # Example
///
/// ```
/// use safegate_kernel::{SafetyPolicy, SafetyState};
/// use safegate_types::CanFrame;
///
/// /// Admits steering frames only while controls are allowed.
/// struct SteerOnly;
///
/// impl SafetyPolicy for SteerOnly {
///     fn name(&self) -> &str {
///         "steer_only"
///     }
///     fn init(&mut self, state: &mut SafetyState, _param: u16) {
///         state.set_controls_allowed(false);
///         state.reset_relay_malfunction();
///     }
///     fn tx(&mut self, state: &SafetyState, frame: &CanFrame) -> bool {
///         state.controls_allowed() && frame.addr == 0x340
///     }
///     fn tx_lin(&mut self, _state: &SafetyState, _channel: u8, _data: &[u8]) -> bool {
///         false
///     }
/// }
///
/// let mut policy = SteerOnly;
/// let mut state = SafetyState::new();
/// policy.init(&mut state, 0);
/// let frame = CanFrame::new(0x340, 0, &[0; 8]).unwrap();
/// assert!(!policy.tx(&state, &frame));
/// ```
pub trait SafetyPolicy: Send {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Establish `controls_allowed` and clear the relay malfunction flag.
    ///
    /// Must be idempotent for a given `param`, and must fall back to the most
    /// restrictive configuration on any `param` it does not understand.
    fn init(&mut self, state: &mut SafetyState, param: u16);

    /// Observe a received frame. Reception is never blocked at this layer,
    /// so the default implementation simply accepts.
    fn rx(&mut self, _state: &SafetyState, _frame: &CanFrame) -> bool {
        true
    }

    /// Admit (`true`) or deny (`false`) a CAN frame bound for the car.
    fn tx(&mut self, state: &SafetyState, frame: &CanFrame) -> bool;

    /// Admit (`true`) or deny (`false`) a LIN transfer on `channel`.
    fn tx_lin(&mut self, state: &SafetyState, channel: u8, data: &[u8]) -> bool;

    /// Destination bus for a frame received on `bus`, or `None` to drop it.
    ///
    /// May rewrite `frame` in place; the caller hands in the copy that will
    /// be relayed. Defaults to [`default_route`].
    fn fwd(&mut self, _state: &SafetyState, bus: u8, _frame: &mut CanFrame) -> Option<u8> {
        default_route(bus)
    }

    /// Rewrites performed by [`fwd`][SafetyPolicy::fwd] so far. Policies
    /// that never rewrite keep the default of zero.
    fn rewrite_counts(&self) -> RewriteCounts {
        RewriteCounts::default()
    }
}
