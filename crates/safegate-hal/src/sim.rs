//! In-memory ports for CI and bench replay without a CAN controller.
//!
//! Each simulated port records what it was asked to send into a shared log
//! that the test (or the replay command) keeps a handle to after the port
//! has been boxed and handed to the router.
//!
//! # Example
//!
//! ```rust
//! use safegate_hal::sim::SimCanPort;
//! use safegate_hal::FrameRouter;
//! use safegate_kernel::SafetyGateway;
//! use safegate_types::{CanFrame, SafetyMode};
//!
//! let mut gateway = SafetyGateway::new();
//! gateway.select(SafetyMode::NoOutput, 0);
//!
//! let assist = SimCanPort::new(2);
//! let log = assist.log();
//! let mut router = FrameRouter::new(gateway);
//! router.register_can(Box::new(assist));
//!
//! router.on_receive(CanFrame::new(0x100, 0, &[1, 2, 3]).unwrap());
//! assert_eq!(log.frames().len(), 1);
//! assert_eq!(log.frames()[0].bus, 2);
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use safegate_types::{CanFrame, GateError};

use crate::port::{CanPort, LinPort};

/// Shared, append-only record of traffic sent through a simulated port.
#[derive(Debug)]
pub struct SimLog<T> {
    entries: Arc<Mutex<Vec<T>>>,
}

impl<T> Default for SimLog<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> Clone for SimLog<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T: Clone> SimLog<T> {
    fn push(&self, entry: T) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    fn snapshot(&self) -> Vec<T> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SimLog<CanFrame> {
    /// Copy of every frame sent so far, oldest first.
    pub fn frames(&self) -> Vec<CanFrame> {
        self.snapshot()
    }
}

impl SimLog<Vec<u8>> {
    /// Copy of every LIN transfer sent so far, oldest first.
    pub fn transfers(&self) -> Vec<Vec<u8>> {
        self.snapshot()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CAN
// ────────────────────────────────────────────────────────────────────────────

/// A simulated CAN bus that records every frame it is asked to send.
/// Always succeeds.
pub struct SimCanPort {
    bus: u8,
    log: SimLog<CanFrame>,
}

impl SimCanPort {
    pub fn new(bus: u8) -> Self {
        Self {
            bus,
            log: SimLog::default(),
        }
    }

    /// Handle to the send log; stays valid after the port is boxed.
    pub fn log(&self) -> SimLog<CanFrame> {
        self.log.clone()
    }
}

impl CanPort for SimCanPort {
    fn bus(&self) -> u8 {
        self.bus
    }

    fn send(&mut self, frame: &CanFrame) -> Result<(), GateError> {
        self.log.push(*frame);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LIN
// ────────────────────────────────────────────────────────────────────────────

/// A simulated LIN channel that records every transfer. Always succeeds.
pub struct SimLinPort {
    channel: u8,
    log: SimLog<Vec<u8>>,
}

impl SimLinPort {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            log: SimLog::default(),
        }
    }

    /// Handle to the transfer log; stays valid after the port is boxed.
    pub fn log(&self) -> SimLog<Vec<u8>> {
        self.log.clone()
    }
}

impl LinPort for SimLinPort {
    fn channel(&self) -> u8 {
        self.channel
    }

    fn send(&mut self, data: &[u8]) -> Result<(), GateError> {
        self.log.push(data.to_vec());
        Ok(())
    }
}
