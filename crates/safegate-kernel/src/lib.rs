//! `safegate-kernel` – Safety hooks & admission control
//!
//! Decides, frame by frame, which actuation requests may reach the vehicle,
//! which frames are relayed between buses, and which relayed frames must be
//! rewritten on the way through. Nothing in here touches hardware; the bus
//! layer in `safegate-hal` calls in and acts on the answers.
//!
//! # Modules
//!
//! - [`state`] – [`SafetyState`][state::SafetyState]: the single
//!   `controls_allowed` / `relay_malfunction` record every hook reads.
//! - [`policy`] – [`SafetyPolicy`][policy::SafetyPolicy]: the five-hook
//!   contract (`init`, `rx`, `tx`, `tx_lin`, `fwd`) implemented once per
//!   vehicle profile.
//! - [`builtin`] – the two reference policies at either end of the safety
//!   spectrum, [`NoOutputPolicy`][builtin::NoOutputPolicy] and
//!   [`AllOutputPolicy`][builtin::AllOutputPolicy].
//! - [`forwarding`] – default bus-to-bus route and the in-transit speed
//!   cutoff rewrite of the instrument-cluster frame.
//! - [`gateway`] – [`SafetyGateway`][gateway::SafetyGateway]: owns the state
//!   and the active policy and is the only thing the bus layer talks to.

pub mod builtin;
pub mod forwarding;
pub mod gateway;
pub mod policy;
pub mod state;

pub use builtin::{AllOutputPolicy, NoOutputPolicy, policy_for};
pub use forwarding::{RewriteOutcome, SpeedUnit, default_route, enforce_mdps_enable_speed};
pub use gateway::SafetyGateway;
pub use policy::{RewriteCounts, SafetyPolicy};
pub use state::SafetyState;
