//! Driver traits for the physical transports.
//!
//! A CAN controller driver implements [`CanPort`] once per bus; a LIN
//! transceiver implements [`LinPort`] once per channel. Both register with a
//! [`FrameRouter`][crate::router::FrameRouter], which is the only caller.

use safegate_types::{CanFrame, GateError};

/// One CAN bus the gateway can transmit on.
pub trait CanPort: Send {
    /// Index of the bus this port drives.
    fn bus(&self) -> u8;

    /// Queue `frame` for transmission. The router has already retagged
    /// `frame.bus` to [`bus`][Self::bus].
    ///
    /// # Errors
    ///
    /// Returns [`GateError::PortFault`] if the controller rejects the frame
    /// (bus-off, mailbox full, …).
    fn send(&mut self, frame: &CanFrame) -> Result<(), GateError>;
}

/// One LIN channel the gateway can transmit on.
pub trait LinPort: Send {
    /// Index of the LIN channel this port drives.
    fn channel(&self) -> u8;

    /// Transmit `data` on the channel.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::PortFault`] if the transfer cannot be started.
    fn send(&mut self, data: &[u8]) -> Result<(), GateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal port that fails once its mailbox is full.
    struct Mailbox {
        bus: u8,
        slots: usize,
        queued: Vec<CanFrame>,
    }

    impl CanPort for Mailbox {
        fn bus(&self) -> u8 {
            self.bus
        }

        fn send(&mut self, frame: &CanFrame) -> Result<(), GateError> {
            if self.queued.len() >= self.slots {
                return Err(GateError::PortFault {
                    bus: self.bus,
                    details: "mailbox full".to_string(),
                });
            }
            self.queued.push(*frame);
            Ok(())
        }
    }

    #[test]
    fn port_reports_fault_when_full() {
        let mut port = Mailbox {
            bus: 1,
            slots: 1,
            queued: Vec::new(),
        };
        let frame = CanFrame::new(0x10, 1, &[1]).unwrap();
        assert!(port.send(&frame).is_ok());
        assert!(matches!(
            port.send(&frame),
            Err(GateError::PortFault { bus: 1, .. })
        ));
        assert_eq!(port.bus(), 1);
    }
}
