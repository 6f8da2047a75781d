//! [`FrameRouter`] – the bus layer's call sequence around the safety hooks.
//!
//! # Receive path
//!
//! For every frame a driver hands to [`FrameRouter::on_receive`]:
//!
//! 1. `fwd` is asked for a destination, on a copy of the frame. The copy may
//!    be rewritten by the policy; the original is left as received.
//! 2. If a destination was returned, the copy is retagged and sent on that
//!    bus's port.
//! 3. The [`RelayMonitor`] checks for stock ECU leaks and, on a hit, latches
//!    the relay malfunction fault and publishes a
//!    [`SafetyAlert::RelayMalfunction`].
//! 4. `rx` observes the original frame.
//!
//! Forwarding never depends on whether actuation is admitted.
//!
//! # Transmit path
//!
//! [`FrameRouter::transmit`] / [`FrameRouter::transmit_lin`] ask `tx` /
//! `tx_lin` first. A denial is returned as [`TxOutcome::Blocked`] and the
//! frame is dropped; it is not an error.
//!
//! # Reporting
//!
//! Hooks never log. Malformed rewrite targets are tallied by the policy and
//! reported here, once per [`FrameRouter::publish_snapshot`], as a single
//! `warn!` carrying the number seen since the previous snapshot.

use std::collections::HashMap;

use safegate_kernel::SafetyGateway;
use safegate_middleware::{EventBus, Topic};
use safegate_types::{CanFrame, Event, EventPayload, GateError, SafetyAlert};
use tracing::{debug, warn};

use crate::port::{CanPort, LinPort};
use crate::relay_monitor::RelayMonitor;

const EVENT_SOURCE: &str = "safegate-hal::router";

/// What happened to a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxOutcome {
    /// Bus the frame was relayed to, if any.
    pub forwarded_to: Option<u8>,
    /// Whether the policy rewrote the relayed copy.
    pub rewritten: bool,
    /// Whether the frame was recognised as a stock ECU leak.
    pub relay_fault: bool,
}

/// Result of an admission-gated transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// Admitted and handed to the port.
    Sent,
    /// Denied by the safety gateway and dropped.
    Blocked,
}

/// Routes frames between driver ports through the [`SafetyGateway`].
pub struct FrameRouter {
    gateway: SafetyGateway,
    can_ports: HashMap<u8, Box<dyn CanPort>>,
    lin_ports: HashMap<u8, Box<dyn LinPort>>,
    relay_monitor: RelayMonitor,
    events: Option<EventBus>,
    rewritten: u64,
    malformed_reported: u64,
}

impl FrameRouter {
    /// Router around `gateway` with no ports registered.
    pub fn new(gateway: SafetyGateway) -> Self {
        Self {
            gateway,
            can_ports: HashMap::new(),
            lin_ports: HashMap::new(),
            relay_monitor: RelayMonitor::new(),
            events: None,
            rewritten: 0,
            malformed_reported: 0,
        }
    }

    /// Use `monitor` for stock ECU leak detection.
    pub fn with_relay_monitor(mut self, monitor: RelayMonitor) -> Self {
        self.relay_monitor = monitor;
        self
    }

    /// Publish alerts and snapshots on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Register a CAN port. Any port previously registered for the same bus
    /// is replaced.
    pub fn register_can(&mut self, port: Box<dyn CanPort>) {
        self.can_ports.insert(port.bus(), port);
    }

    /// Register a LIN port. Any port previously registered for the same
    /// channel is replaced.
    pub fn register_lin(&mut self, port: Box<dyn LinPort>) {
        self.lin_ports.insert(port.channel(), port);
    }

    pub fn gateway(&self) -> &SafetyGateway {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut SafetyGateway {
        &mut self.gateway
    }

    /// Number of relayed frames the policy rewrote.
    pub fn rewritten(&self) -> u64 {
        self.rewritten
    }

    /// Select a safety mode by identifier, publishing an alert when the
    /// identifier is unknown and the restrictive fallback was installed.
    ///
    /// # Errors
    ///
    /// Propagates [`GateError::UnknownSafetyMode`] from
    /// [`SafetyGateway::set_safety_mode`].
    pub fn set_safety_mode(&mut self, mode_id: u16, param: u16) -> Result<(), GateError> {
        let result = self.gateway.set_safety_mode(mode_id, param);
        if let Err(GateError::UnknownSafetyMode(requested)) = result {
            self.publish_alert(SafetyAlert::UnknownSafetyMode { requested });
        }
        result
    }

    /// Run the receive path for `frame`.
    pub fn on_receive(&mut self, frame: CanFrame) -> RxOutcome {
        let mut relayed = frame;
        let dest = self.gateway.fwd(frame.bus, &mut relayed);

        let rewritten = relayed.payload() != frame.payload();
        if rewritten {
            self.rewritten = self.rewritten.wrapping_add(1);
        }

        let forwarded_to = dest.and_then(|bus| self.relay(relayed.with_bus(bus)));

        let relay_fault = self.relay_monitor.is_stock_ecu(&frame);
        if relay_fault && self.gateway.report_relay_malfunction() {
            self.publish_alert(SafetyAlert::RelayMalfunction {
                bus: frame.bus,
                addr: frame.addr,
            });
        }

        self.gateway.rx(&frame);

        RxOutcome {
            forwarded_to,
            rewritten,
            relay_fault,
        }
    }

    /// Send a relayed frame on its destination port. A missing or failing
    /// port drops the frame.
    fn relay(&mut self, frame: CanFrame) -> Option<u8> {
        let Some(port) = self.can_ports.get_mut(&frame.bus) else {
            debug!(bus = frame.bus, addr = frame.addr, "no port for forward destination; dropped");
            return None;
        };
        match port.send(&frame) {
            Ok(()) => Some(frame.bus),
            Err(e) => {
                warn!(error = %e, addr = frame.addr, "forward failed; dropped");
                None
            }
        }
    }

    /// Transmit a frame requested by the assistance computer, if admitted.
    ///
    /// # Errors
    ///
    /// - [`GateError::PortNotRegistered`] – admitted, but no port for
    ///   `frame.bus`.
    /// - Any error returned by the port driver.
    pub fn transmit(&mut self, frame: &CanFrame) -> Result<TxOutcome, GateError> {
        if !self.gateway.tx(frame) {
            return Ok(TxOutcome::Blocked);
        }
        let port = self
            .can_ports
            .get_mut(&frame.bus)
            .ok_or(GateError::PortNotRegistered(frame.bus))?;
        port.send(frame)?;
        Ok(TxOutcome::Sent)
    }

    /// Transmit a LIN transfer requested by the assistance computer, if
    /// admitted.
    ///
    /// # Errors
    ///
    /// - [`GateError::LinChannelNotRegistered`] – admitted, but no port for
    ///   `channel`.
    /// - Any error returned by the port driver.
    pub fn transmit_lin(&mut self, channel: u8, data: &[u8]) -> Result<TxOutcome, GateError> {
        if !self.gateway.tx_lin(channel, data) {
            return Ok(TxOutcome::Blocked);
        }
        let port = self
            .lin_ports
            .get_mut(&channel)
            .ok_or(GateError::LinChannelNotRegistered(channel))?;
        port.send(data)?;
        Ok(TxOutcome::Sent)
    }

    /// Publish the current [`SafetySnapshot`][safegate_types::SafetySnapshot]
    /// on [`Topic::Telemetry`]. Returns the number of subscribers reached;
    /// `0` when no event bus is attached or nobody is listening.
    ///
    /// Malformed rewrite targets seen since the previous call are logged
    /// here, whether or not an event bus is attached.
    pub fn publish_snapshot(&mut self) -> usize {
        let snapshot = self.gateway.snapshot();
        let malformed = snapshot.rewrites_malformed;
        if malformed > self.malformed_reported {
            warn!(
                count = malformed - self.malformed_reported,
                mode = %snapshot.safety_mode,
                "cluster frames with unexpected length relayed unmodified"
            );
        }
        // Counts restart from zero when a new policy is installed.
        self.malformed_reported = malformed;

        let Some(bus) = &self.events else {
            return 0;
        };
        let event = Event::new(EVENT_SOURCE, EventPayload::Snapshot(snapshot));
        bus.publish_to(Topic::Telemetry, event).unwrap_or(0)
    }

    fn publish_alert(&self, alert: SafetyAlert) {
        if let Some(bus) = &self.events {
            let event = Event::new(EVENT_SOURCE, EventPayload::Alert(alert));
            bus.publish_to(Topic::SafetyAlerts, event).ok();
        }
    }
}
