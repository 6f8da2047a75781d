//! [`RelayMonitor`] – stock ECU leak detection.
//!
//! While the gateway is interposed, the car's own actuation ECUs are cut off
//! from the actuation bus by a relay and the gateway substitutes its own
//! traffic. If one of their frames is nevertheless *received* on that bus,
//! the relay did not switch: the router then latches the relay malfunction
//! fault and all actuation is denied until the next `init`.

use std::collections::HashSet;

use safegate_types::CanFrame;

/// Set of `(bus, addr)` pairs that must never be received.
///
/// # Example
///
/// ```
/// use safegate_hal::RelayMonitor;
/// use safegate_types::CanFrame;
///
/// let mut monitor = RelayMonitor::new();
/// monitor.watch(0, 0x340);
///
/// let leaked = CanFrame::new(0x340, 0, &[0; 8]).unwrap();
/// let elsewhere = CanFrame::new(0x340, 2, &[0; 8]).unwrap();
/// assert!(monitor.is_stock_ecu(&leaked));
/// assert!(!monitor.is_stock_ecu(&elsewhere));
/// ```
#[derive(Debug, Default, Clone)]
pub struct RelayMonitor {
    watched: HashSet<(u8, u32)>,
}

impl RelayMonitor {
    /// Monitor with nothing watched; never trips.
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `addr` received on `bus` as a stock ECU leak.
    pub fn watch(&mut self, bus: u8, addr: u32) {
        self.watched.insert((bus, addr));
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    /// Whether `frame` is stock ECU traffic on a watched bus.
    pub fn is_stock_ecu(&self, frame: &CanFrame) -> bool {
        self.watched.contains(&(frame.bus, frame.addr))
    }
}
