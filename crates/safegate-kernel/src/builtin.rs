//! Reference policies at the two ends of the safety spectrum.
//!
//! - [`NoOutputPolicy`] – nothing the assistance computer sends ever reaches
//!   the car. Relays traffic on the default route and floors the cluster
//!   speed on the way from the vehicle bus. This is the default mode.
//! - [`AllOutputPolicy`] – everything is admitted. Bench bring-up only.

use safegate_types::{CanFrame, SafetyMode};

use crate::forwarding::{
    CLU11_ADDR, RewriteOutcome, VEHICLE_BUS, default_route, enforce_mdps_enable_speed,
};
use crate::policy::{RewriteCounts, SafetyPolicy};
use crate::state::SafetyState;

/// Build the policy backing a built-in [`SafetyMode`].
pub fn policy_for(mode: SafetyMode) -> Box<dyn SafetyPolicy> {
    match mode {
        SafetyMode::NoOutput => Box::new(NoOutputPolicy::default()),
        SafetyMode::AllOutput => Box::new(AllOutputPolicy),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// No output
// ────────────────────────────────────────────────────────────────────────────

/// Denies every actuation request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOutputPolicy {
    rewrites: RewriteCounts,
}

impl SafetyPolicy for NoOutputPolicy {
    fn name(&self) -> &str {
        SafetyMode::NoOutput.name()
    }

    fn init(&mut self, state: &mut SafetyState, _param: u16) {
        state.set_controls_allowed(false);
        state.reset_relay_malfunction();
    }

    fn tx(&mut self, _state: &SafetyState, _frame: &CanFrame) -> bool {
        false
    }

    fn tx_lin(&mut self, _state: &SafetyState, _channel: u8, _data: &[u8]) -> bool {
        false
    }

    fn fwd(&mut self, _state: &SafetyState, bus: u8, frame: &mut CanFrame) -> Option<u8> {
        if bus == VEHICLE_BUS && frame.addr == CLU11_ADDR {
            match enforce_mdps_enable_speed(frame) {
                RewriteOutcome::Clamped { .. } => {
                    self.rewrites.clamped = self.rewrites.clamped.wrapping_add(1);
                }
                RewriteOutcome::Malformed { .. } => {
                    self.rewrites.malformed = self.rewrites.malformed.wrapping_add(1);
                }
                RewriteOutcome::Unchanged => {}
            }
        }
        default_route(bus)
    }

    fn rewrite_counts(&self) -> RewriteCounts {
        self.rewrites
    }
}

// ────────────────────────────────────────────────────────────────────────────
// All output
// ────────────────────────────────────────────────────────────────────────────

/// Admits every actuation request.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllOutputPolicy;

impl SafetyPolicy for AllOutputPolicy {
    fn name(&self) -> &str {
        SafetyMode::AllOutput.name()
    }

    fn init(&mut self, state: &mut SafetyState, _param: u16) {
        state.set_controls_allowed(true);
        state.reset_relay_malfunction();
    }

    fn tx(&mut self, _state: &SafetyState, _frame: &CanFrame) -> bool {
        true
    }

    fn tx_lin(&mut self, _state: &SafetyState, _channel: u8, _data: &[u8]) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarding::ASSIST_BUS;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::{Level, Metadata, Subscriber, span};

    fn initialized(policy: &mut dyn SafetyPolicy, param: u16) -> SafetyState {
        let mut state = SafetyState::new();
        policy.init(&mut state, param);
        state
    }

    fn sample_frames() -> Vec<CanFrame> {
        let mut frames = Vec::new();
        for addr in [0x000, 0x1, 0x340, CLU11_ADDR, 0x7FF, 0x1FFF_FFFF] {
            for bus in 0..4 {
                frames.push(CanFrame::new(addr, bus, &[]).unwrap());
                frames.push(CanFrame::new(addr, bus, &[0xFF; 8]).unwrap());
            }
        }
        frames
    }

    // ------------------------------------------------------------------ no output

    #[test]
    fn no_output_init_restricts_and_clears_fault() {
        let mut state = SafetyState::new();
        state.set_controls_allowed(true);
        state.latch_relay_malfunction();
        NoOutputPolicy::default().init(&mut state, 0);
        assert!(!state.controls_allowed());
        assert!(!state.relay_malfunction());
    }

    #[test]
    fn no_output_denies_every_frame() {
        let mut policy = NoOutputPolicy::default();
        let state = initialized(&mut policy, 0);
        for frame in sample_frames() {
            assert!(!policy.tx(&state, &frame));
        }
        assert!(!policy.tx_lin(&state, 0, &[]));
        assert!(!policy.tx_lin(&state, 1, &[0xFF; 8]));
    }

    #[test]
    fn no_output_denies_even_if_controls_allowed() {
        let mut policy = NoOutputPolicy::default();
        let mut state = SafetyState::new();
        state.set_controls_allowed(true);
        let frame = CanFrame::new(0x340, 0, &[0; 8]).unwrap();
        assert!(!policy.tx(&state, &frame));
    }

    #[test]
    fn no_output_rx_accepts() {
        let mut policy = NoOutputPolicy::default();
        let state = initialized(&mut policy, 0);
        for frame in sample_frames() {
            assert!(policy.rx(&state, &frame));
        }
    }

    #[test]
    fn no_output_clamps_cluster_speed_from_vehicle_bus() {
        let mut policy = NoOutputPolicy::default();
        let state = initialized(&mut policy, 0);
        let mut frame = CanFrame::new(CLU11_ADDR, VEHICLE_BUS, &[0xA5, 50, 0x02, 0x5A]).unwrap();

        assert_eq!(policy.fwd(&state, VEHICLE_BUS, &mut frame), Some(ASSIST_BUS));
        assert_eq!(frame.payload(), &[0xA5, 76, 0x02, 0x5A]);
        assert_eq!(policy.rewrite_counts().clamped, 1);
    }

    #[test]
    fn no_output_passes_fast_kph_cluster_frame() {
        let mut policy = NoOutputPolicy::default();
        let state = initialized(&mut policy, 0);
        let original = CanFrame::new(CLU11_ADDR, VEHICLE_BUS, &[0xA5, 130, 0x00, 0x5A]).unwrap();
        let mut frame = original;

        assert_eq!(policy.fwd(&state, VEHICLE_BUS, &mut frame), Some(ASSIST_BUS));
        assert_eq!(frame, original);
    }

    #[test]
    fn no_output_leaves_cluster_frame_from_assist_bus_alone() {
        let mut policy = NoOutputPolicy::default();
        let state = initialized(&mut policy, 0);
        let original = CanFrame::new(CLU11_ADDR, ASSIST_BUS, &[0x00, 10, 0x02, 0x00]).unwrap();
        let mut frame = original;

        assert_eq!(policy.fwd(&state, ASSIST_BUS, &mut frame), Some(VEHICLE_BUS));
        assert_eq!(frame, original);
    }

    #[test]
    fn no_output_relays_malformed_cluster_frame_unmodified() {
        let mut policy = NoOutputPolicy::default();
        let state = initialized(&mut policy, 0);
        let original =
            CanFrame::new(CLU11_ADDR, VEHICLE_BUS, &[0x00, 10, 0x02, 0x00, 0, 0, 0, 0]).unwrap();
        let mut frame = original;

        assert_eq!(policy.fwd(&state, VEHICLE_BUS, &mut frame), Some(ASSIST_BUS));
        assert_eq!(frame, original);
        assert_eq!(
            policy.rewrite_counts(),
            RewriteCounts {
                clamped: 0,
                malformed: 1
            }
        );
    }

    /// Counts every event more severe than `TRACE`.
    struct EventCounter(Arc<AtomicUsize>);

    impl Subscriber for EventCounter {
        fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
            true
        }
        fn new_span(&self, _span: &span::Attributes<'_>) -> span::Id {
            span::Id::from_u64(1)
        }
        fn record(&self, _span: &span::Id, _values: &span::Record<'_>) {}
        fn record_follows_from(&self, _span: &span::Id, _follows: &span::Id) {}
        fn event(&self, event: &tracing::Event<'_>) {
            if *event.metadata().level() != Level::TRACE {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }
        fn enter(&self, _span: &span::Id) {}
        fn exit(&self, _span: &span::Id) {}
    }

    #[test]
    fn fwd_hook_stays_silent_on_bad_cluster_frames() {
        let emitted = Arc::new(AtomicUsize::new(0));
        let mut policy = NoOutputPolicy::default();
        let state = initialized(&mut policy, 0);
        let malformed = CanFrame::new(CLU11_ADDR, VEHICLE_BUS, &[0x00, 10, 0x02, 0, 0, 0, 0, 0])
            .unwrap();
        let slow = CanFrame::new(CLU11_ADDR, VEHICLE_BUS, &[0x00, 10, 0x02, 0x00]).unwrap();

        tracing::subscriber::with_default(EventCounter(Arc::clone(&emitted)), || {
            for _ in 0..1000 {
                let mut relayed = malformed;
                policy.fwd(&state, VEHICLE_BUS, &mut relayed);
                let mut relayed = slow;
                policy.fwd(&state, VEHICLE_BUS, &mut relayed);
            }
        });

        assert_eq!(emitted.load(Ordering::Relaxed), 0);
        assert_eq!(
            policy.rewrite_counts(),
            RewriteCounts {
                clamped: 1000,
                malformed: 1000
            }
        );
    }

    #[test]
    fn no_output_does_not_touch_other_addresses() {
        let mut policy = NoOutputPolicy::default();
        let state = initialized(&mut policy, 0);
        let original = CanFrame::new(CLU11_ADDR + 1, VEHICLE_BUS, &[0x00, 10, 0x02, 0x00]).unwrap();
        let mut frame = original;

        policy.fwd(&state, VEHICLE_BUS, &mut frame);
        assert_eq!(frame, original);
    }

    // ------------------------------------------------------------------ all output

    #[test]
    fn all_output_init_permits_and_clears_fault() {
        let mut state = SafetyState::new();
        state.latch_relay_malfunction();
        AllOutputPolicy.init(&mut state, 0);
        assert!(state.controls_allowed());
        assert!(!state.relay_malfunction());
    }

    #[test]
    fn all_output_admits_every_frame() {
        let mut policy = AllOutputPolicy;
        let state = initialized(&mut policy, 0);
        for frame in sample_frames() {
            assert!(policy.tx(&state, &frame));
        }
        assert!(policy.tx_lin(&state, 0, &[]));
        assert!(policy.tx_lin(&state, 1, &[0xFF; 8]));
    }

    #[test]
    fn all_output_forwards_without_rewrite() {
        let mut policy = AllOutputPolicy;
        let state = initialized(&mut policy, 0);
        let original = CanFrame::new(CLU11_ADDR, VEHICLE_BUS, &[0x00, 10, 0x02, 0x00]).unwrap();
        let mut frame = original;

        assert_eq!(policy.fwd(&state, VEHICLE_BUS, &mut frame), Some(ASSIST_BUS));
        assert_eq!(frame, original);
        assert_eq!(policy.fwd(&state, 1, &mut frame), None);
    }

    // ------------------------------------------------------------------ shared

    #[test]
    fn init_is_idempotent() {
        for mode in SafetyMode::ALL {
            let mut policy = policy_for(mode);
            let once = initialized(policy.as_mut(), 7);
            let mut twice = once.clone();
            policy.init(&mut twice, 7);
            assert_eq!(once, twice, "{mode}");
        }
    }

    #[test]
    fn policy_for_matches_mode_name() {
        for mode in SafetyMode::ALL {
            assert_eq!(policy_for(mode).name(), mode.name());
        }
    }
}
