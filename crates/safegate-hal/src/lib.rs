//! `safegate-hal` – The bus layer
//!
//! Moves frames between CAN/LIN drivers and the safety hooks. Drivers only
//! ever talk to the [`CanPort`]/[`LinPort`] traits; every frame passes
//! through the [`FrameRouter`], which asks the
//! [`SafetyGateway`][safegate_kernel::SafetyGateway] before anything is
//! relayed or sent to the car.
//!
//! # Modules
//!
//! - [`port`] – driver traits for CAN buses and LIN channels.
//! - [`router`] – [`FrameRouter`]: calls `fwd`, `rx`, `tx` and `tx_lin` in
//!   the documented order and acts on the answers.
//! - [`relay_monitor`] – [`RelayMonitor`]: latches the relay malfunction
//!   fault when stock ECU traffic leaks onto a bus it should be isolated
//!   from.
//! - [`sim`] – in-memory ports that record traffic, for tests and replay.

pub mod port;
pub mod relay_monitor;
pub mod router;
pub mod sim;

pub use port::{CanPort, LinPort};
pub use relay_monitor::RelayMonitor;
pub use router::{FrameRouter, RxOutcome, TxOutcome};
