//! [`SafetyGateway`] – single entry point between the bus layer and the
//! active safety policy.
//!
//! The gateway owns the one [`SafetyState`] and the active
//! [`SafetyPolicy`], and threads the state into every hook call. On top of
//! the policy's own answers it enforces two fail-safe rules for `tx` and
//! `tx_lin`:
//!
//! 1. **Uninitialised** – until some policy `init` has run, every actuation
//!    request is denied.
//! 2. **Relay malfunction** – while the fault is latched, every actuation
//!    request is denied without asking the policy.
//!
//! `rx` and `fwd` are always delegated; forwarding of observation traffic is
//! independent of whether actuation is currently admitted.
//!
//! Processing is run-to-completion: one frame's hook chain finishes before
//! the next begins. To share a gateway across threads (e.g. one per bus),
//! wrap it in a `Mutex` so `init` is fully visible before the next admission
//! check.
//!
//! # Example
//!
//! ```
//! use safegate_kernel::SafetyGateway;
//! use safegate_types::{CanFrame, SafetyLifecycle, SafetyMode};
//!
//! let mut gateway = SafetyGateway::new();
//! let frame = CanFrame::new(0x340, 0, &[0; 8]).unwrap();
//!
//! // Nothing is admitted before a mode is selected.
//! assert!(!gateway.tx(&frame));
//!
//! gateway.select(SafetyMode::AllOutput, 0);
//! assert!(gateway.tx(&frame));
//!
//! // A latched relay fault overrides even the permissive policy.
//! gateway.report_relay_malfunction();
//! assert_eq!(gateway.lifecycle(), SafetyLifecycle::Faulted);
//! assert!(!gateway.tx(&frame));
//! ```

use safegate_types::{CanFrame, GateError, SafetyLifecycle, SafetyMode, SafetySnapshot};
use tracing::{debug, error, info, warn};

use crate::builtin::policy_for;
use crate::policy::{RewriteCounts, SafetyPolicy};
use crate::state::SafetyState;

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    rx_frames: u64,
    tx_admitted: u64,
    tx_blocked: u64,
    forwarded: u64,
}

/// Owns the global safety state and dispatches frame events to the active
/// policy.
pub struct SafetyGateway {
    state: SafetyState,
    policy: Box<dyn SafetyPolicy>,
    mode: SafetyMode,
    param: u16,
    counters: Counters,
}

impl SafetyGateway {
    /// Gateway with the restrictive policy installed but not yet
    /// initialised. Call [`select`][Self::select] or
    /// [`set_safety_mode`][Self::set_safety_mode] before expecting any
    /// actuation to be admitted.
    pub fn new() -> Self {
        Self {
            state: SafetyState::new(),
            policy: policy_for(SafetyMode::NoOutput),
            mode: SafetyMode::NoOutput,
            param: 0,
            counters: Counters::default(),
        }
    }

    /// Install the policy for `mode` and run its `init` with `param`.
    pub fn select(&mut self, mode: SafetyMode, param: u16) {
        self.policy = policy_for(mode);
        self.mode = mode;
        self.param = param;
        self.run_init();
        info!(
            mode = %mode,
            param,
            controls_allowed = self.state.controls_allowed(),
            "safety mode selected"
        );
    }

    /// Select a mode by its numeric identifier.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::UnknownSafetyMode`] when `mode_id` is not a
    /// built-in mode. The restrictive policy is installed and initialised
    /// before the error is returned, so the gateway is never left permissive.
    pub fn set_safety_mode(&mut self, mode_id: u16, param: u16) -> Result<(), GateError> {
        match SafetyMode::from_id(mode_id) {
            Some(mode) => {
                self.select(mode, param);
                Ok(())
            }
            None => {
                warn!(requested = mode_id, "unknown safety mode; falling back to no_output");
                self.select(SafetyMode::NoOutput, 0);
                Err(GateError::UnknownSafetyMode(mode_id))
            }
        }
    }

    /// Re-run the active policy's `init` with the last parameter. This is
    /// the only way out of [`SafetyLifecycle::Faulted`].
    pub fn reset(&mut self) {
        self.run_init();
        info!(mode = %self.mode, param = self.param, "safety policy reset");
    }

    fn run_init(&mut self) {
        self.policy.init(&mut self.state, self.param);
        self.state.mark_initialized();
    }

    /// Pass a received frame to the policy's `rx` hook.
    pub fn rx(&mut self, frame: &CanFrame) -> bool {
        self.counters.rx_frames = self.counters.rx_frames.wrapping_add(1);
        self.policy.rx(&self.state, frame)
    }

    /// Admission decision for a CAN frame bound for the car.
    pub fn tx(&mut self, frame: &CanFrame) -> bool {
        let admitted = self.admission_open() && self.policy.tx(&self.state, frame);
        self.count_tx(admitted);
        if !admitted {
            debug!(addr = frame.addr, bus = frame.bus, "tx blocked");
        }
        admitted
    }

    /// Admission decision for a LIN transfer bound for the car.
    pub fn tx_lin(&mut self, channel: u8, data: &[u8]) -> bool {
        let admitted = self.admission_open() && self.policy.tx_lin(&self.state, channel, data);
        self.count_tx(admitted);
        if !admitted {
            debug!(channel, len = data.len(), "tx_lin blocked");
        }
        admitted
    }

    /// Forwarding decision for a frame received on `bus`. `frame` is the
    /// copy that will be relayed and may be rewritten in place.
    pub fn fwd(&mut self, bus: u8, frame: &mut CanFrame) -> Option<u8> {
        let dest = self.policy.fwd(&self.state, bus, frame);
        if dest.is_some() {
            self.counters.forwarded = self.counters.forwarded.wrapping_add(1);
        }
        dest
    }

    /// Latch the relay malfunction fault. Returns `true` on the transition
    /// into the fault, `false` if it was already latched.
    pub fn report_relay_malfunction(&mut self) -> bool {
        let newly = self.state.latch_relay_malfunction();
        if newly {
            error!(
                mode = %self.mode,
                "relay malfunction latched; all actuation denied until reset"
            );
        }
        newly
    }

    fn admission_open(&self) -> bool {
        self.state.is_initialized() && !self.state.relay_malfunction()
    }

    fn count_tx(&mut self, admitted: bool) {
        if admitted {
            self.counters.tx_admitted = self.counters.tx_admitted.wrapping_add(1);
        } else {
            self.counters.tx_blocked = self.counters.tx_blocked.wrapping_add(1);
        }
    }

    pub fn state(&self) -> &SafetyState {
        &self.state
    }

    pub fn lifecycle(&self) -> SafetyLifecycle {
        self.state.lifecycle()
    }

    /// The active built-in mode.
    pub fn mode(&self) -> SafetyMode {
        self.mode
    }

    /// Parameter passed to the last `init`.
    pub fn param(&self) -> u16 {
        self.param
    }

    /// Name reported by the active policy.
    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    /// Rewrites performed by the active policy since it was installed.
    pub fn rewrite_counts(&self) -> RewriteCounts {
        self.policy.rewrite_counts()
    }

    /// Copy of the flags and counters for telemetry.
    pub fn snapshot(&self) -> SafetySnapshot {
        let rewrites = self.rewrite_counts();
        SafetySnapshot {
            safety_mode: self.mode,
            safety_param: self.param,
            lifecycle: self.lifecycle(),
            controls_allowed: self.state.controls_allowed(),
            relay_malfunction: self.state.relay_malfunction(),
            rx_frames: self.counters.rx_frames,
            tx_admitted: self.counters.tx_admitted,
            tx_blocked: self.counters.tx_blocked,
            forwarded: self.counters.forwarded,
            rewrites_clamped: rewrites.clamped,
            rewrites_malformed: rewrites.malformed,
        }
    }
}

impl Default for SafetyGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarding::CLU11_ADDR;

    fn steer_frame() -> CanFrame {
        CanFrame::new(0x340, 0, &[0x01; 8]).unwrap()
    }

    // ------------------------------------------------------------------ lifecycle

    #[test]
    fn new_gateway_is_uninitialized_and_denies() {
        let mut gw = SafetyGateway::new();
        assert_eq!(gw.lifecycle(), SafetyLifecycle::Uninitialized);
        assert!(!gw.tx(&steer_frame()));
        assert!(!gw.tx_lin(0, &[1, 2]));
    }

    #[test]
    fn select_moves_to_restricted_or_permitted() {
        let mut gw = SafetyGateway::new();
        gw.select(SafetyMode::NoOutput, 0);
        assert_eq!(gw.lifecycle(), SafetyLifecycle::Restricted);

        gw.select(SafetyMode::AllOutput, 0);
        assert_eq!(gw.lifecycle(), SafetyLifecycle::Permitted);

        gw.select(SafetyMode::NoOutput, 0);
        assert_eq!(gw.lifecycle(), SafetyLifecycle::Restricted);
    }

    #[test]
    fn no_output_tx_then_reinit_stays_restricted() {
        let mut gw = SafetyGateway::new();
        gw.select(SafetyMode::NoOutput, 0);
        assert!(!gw.tx(&steer_frame()));

        gw.select(SafetyMode::NoOutput, 0);
        assert!(!gw.state().relay_malfunction());
        assert!(!gw.state().controls_allowed());
    }

    #[test]
    fn repeated_init_is_idempotent() {
        let mut once = SafetyGateway::new();
        once.select(SafetyMode::AllOutput, 3);

        let mut twice = SafetyGateway::new();
        twice.select(SafetyMode::AllOutput, 3);
        twice.select(SafetyMode::AllOutput, 3);

        assert_eq!(once.state(), twice.state());
    }

    // ------------------------------------------------------------------ fault

    #[test]
    fn relay_malfunction_denies_permissive_policy() {
        let mut gw = SafetyGateway::new();
        gw.select(SafetyMode::AllOutput, 0);
        assert!(gw.report_relay_malfunction());
        assert!(!gw.report_relay_malfunction());

        assert_eq!(gw.lifecycle(), SafetyLifecycle::Faulted);
        assert!(!gw.tx(&steer_frame()));
        assert!(!gw.tx_lin(1, &[0x00]));
    }

    #[test]
    fn fault_does_not_stop_forwarding() {
        let mut gw = SafetyGateway::new();
        gw.select(SafetyMode::NoOutput, 0);
        gw.report_relay_malfunction();

        let mut frame = CanFrame::new(CLU11_ADDR, 0, &[0x00, 50, 0x02, 0x00]).unwrap();
        assert_eq!(gw.fwd(0, &mut frame), Some(2));
        assert_eq!(frame.byte(1), Some(76));
        assert!(gw.rx(&frame));
    }

    #[test]
    fn reset_clears_fault() {
        let mut gw = SafetyGateway::new();
        gw.select(SafetyMode::AllOutput, 0);
        gw.report_relay_malfunction();

        gw.reset();
        assert_eq!(gw.lifecycle(), SafetyLifecycle::Permitted);
        assert!(gw.tx(&steer_frame()));
    }

    // ------------------------------------------------------------------ selection by id

    #[test]
    fn set_safety_mode_by_id() {
        let mut gw = SafetyGateway::new();
        gw.set_safety_mode(SafetyMode::AllOutput.id(), 5).unwrap();
        assert_eq!(gw.mode(), SafetyMode::AllOutput);
        assert_eq!(gw.param(), 5);
        assert_eq!(gw.policy_name(), "all_output");
    }

    #[test]
    fn unknown_mode_falls_back_to_no_output() {
        let mut gw = SafetyGateway::new();
        gw.select(SafetyMode::AllOutput, 0);

        let err = gw.set_safety_mode(0xBEEF, 1).unwrap_err();
        assert_eq!(err, GateError::UnknownSafetyMode(0xBEEF));
        assert_eq!(gw.mode(), SafetyMode::NoOutput);
        assert_eq!(gw.lifecycle(), SafetyLifecycle::Restricted);
        assert!(!gw.tx(&steer_frame()));
    }

    // ------------------------------------------------------------------ counters

    #[test]
    fn snapshot_counts_decisions() {
        let mut gw = SafetyGateway::new();
        gw.select(SafetyMode::NoOutput, 0);

        let frame = steer_frame();
        gw.rx(&frame);
        gw.rx(&frame);
        gw.tx(&frame);
        gw.tx_lin(0, &[]);
        let mut relay = frame;
        gw.fwd(0, &mut relay);
        gw.fwd(1, &mut relay);

        let snap = gw.snapshot();
        assert_eq!(snap.safety_mode, SafetyMode::NoOutput);
        assert_eq!(snap.lifecycle, SafetyLifecycle::Restricted);
        assert_eq!(snap.rx_frames, 2);
        assert_eq!(snap.tx_admitted, 0);
        assert_eq!(snap.tx_blocked, 2);
        assert_eq!(snap.forwarded, 1);
        assert_eq!(snap.rewrites_clamped, 0);
    }

    #[test]
    fn snapshot_carries_rewrite_counts_of_active_policy() {
        let mut gw = SafetyGateway::new();
        gw.select(SafetyMode::NoOutput, 0);

        let mut slow = CanFrame::new(CLU11_ADDR, 0, &[0x00, 50, 0x02, 0x00]).unwrap();
        let mut short = CanFrame::new(CLU11_ADDR, 0, &[0x00, 50]).unwrap();
        gw.fwd(0, &mut slow);
        gw.fwd(0, &mut short);

        let snap = gw.snapshot();
        assert_eq!(snap.rewrites_clamped, 1);
        assert_eq!(snap.rewrites_malformed, 1);

        // A freshly installed policy starts from zero.
        gw.select(SafetyMode::NoOutput, 0);
        assert_eq!(gw.rewrite_counts(), RewriteCounts::default());
    }

    #[test]
    fn admitted_frames_are_counted() {
        let mut gw = SafetyGateway::new();
        gw.select(SafetyMode::AllOutput, 0);
        gw.tx(&steer_frame());
        gw.tx_lin(0, &[0xAA]);
        assert_eq!(gw.snapshot().tx_admitted, 2);
        assert_eq!(gw.snapshot().tx_blocked, 0);
    }
}
