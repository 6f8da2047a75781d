//! Bench replay of a recorded frame log through the full bus layer.
//!
//! # Log format
//!
//! One record per line; blank lines and lines starting with `#` are ignored.
//!
//! ```text
//! rx   <bus> <addr-hex>#<data-hex>     frame received from a bus
//! tx   <bus> <addr-hex>#<data-hex>     frame the assistance computer wants sent
//! lin  <channel> <data-hex>            LIN transfer the assistance computer wants sent
//! mode <id> <param>                    profile (re)selection
//! ```
//!
//! Example: `rx 0 4F1#00320200` is the cluster frame on the vehicle bus with
//! an mph speed of 50.

use std::io::BufRead;

use safegate_hal::sim::{SimCanPort, SimLinPort};
use safegate_hal::{FrameRouter, RelayMonitor, TxOutcome};
use safegate_kernel::SafetyGateway;
use safegate_middleware::EventBus;
use safegate_types::{CanFrame, GateError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

/// Buses that get a simulated CAN port during replay.
const SIM_BUSES: [u8; 3] = [0, 1, 2];
/// LIN channels that get a simulated port during replay.
const SIM_LIN_CHANNELS: [u8; 2] = [0, 1];

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("reading replay log: {0}")]
    Io(#[from] std::io::Error),
}

/// One parsed log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Rx(CanFrame),
    Tx(CanFrame),
    Lin { channel: u8, data: Vec<u8> },
    Mode { id: u16, param: u16 },
}

/// Totals printed at the end of a replay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub records: u64,
    pub received: u64,
    pub forwarded: u64,
    pub rewritten: u64,
    pub admitted: u64,
    pub blocked: u64,
    pub failed: u64,
    pub relay_faults: u64,
    pub snapshots: u64,
}

/// Router with simulated ports on every replay bus, configured from `cfg`.
pub fn build_router(cfg: &Config, events: EventBus) -> FrameRouter {
    let mut monitor = RelayMonitor::new();
    for ecu in &cfg.stock_ecu {
        monitor.watch(ecu.bus, ecu.addr);
    }

    let mut gateway = SafetyGateway::new();
    gateway.select(cfg.safety_mode, cfg.safety_param);

    let mut router = FrameRouter::new(gateway)
        .with_relay_monitor(monitor)
        .with_event_bus(events);
    for bus in SIM_BUSES {
        router.register_can(Box::new(SimCanPort::new(bus)));
    }
    for channel in SIM_LIN_CHANNELS {
        router.register_lin(Box::new(SimLinPort::new(channel)));
    }
    router
}

/// Drive every record of `reader` through `router`.
///
/// A snapshot is published every `snapshot_every` records (never when `0`)
/// and once more at the end.
pub fn run<R: BufRead>(
    router: &mut FrameRouter,
    reader: R,
    snapshot_every: u64,
) -> Result<ReplaySummary, ReplayError> {
    let mut summary = ReplaySummary::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let record = parse_line(&line).map_err(|reason| ReplayError::Parse {
            line: idx + 1,
            reason,
        })?;
        let Some(record) = record else {
            continue;
        };

        apply(router, record, &mut summary);
        summary.records += 1;

        if snapshot_every != 0 && summary.records % snapshot_every == 0 {
            router.publish_snapshot();
            summary.snapshots += 1;
        }
    }

    router.publish_snapshot();
    summary.snapshots += 1;
    summary.rewritten = router.rewritten();
    Ok(summary)
}

fn apply(router: &mut FrameRouter, record: Record, summary: &mut ReplaySummary) {
    match record {
        Record::Rx(frame) => {
            let outcome = router.on_receive(frame);
            summary.received += 1;
            if outcome.forwarded_to.is_some() {
                summary.forwarded += 1;
            }
            if outcome.relay_fault {
                summary.relay_faults += 1;
            }
        }
        Record::Tx(frame) => tally_tx(router.transmit(&frame), summary),
        Record::Lin { channel, data } => tally_tx(router.transmit_lin(channel, &data), summary),
        Record::Mode { id, param } => {
            if let Err(e) = router.set_safety_mode(id, param) {
                warn!(error = %e, "replayed mode selection rejected");
            }
        }
    }
}

fn tally_tx(result: Result<TxOutcome, GateError>, summary: &mut ReplaySummary) {
    match result {
        Ok(TxOutcome::Sent) => summary.admitted += 1,
        Ok(TxOutcome::Blocked) => summary.blocked += 1,
        Err(e) => {
            debug!(error = %e, "replayed transmit failed");
            summary.failed += 1;
        }
    }
}

/// Parse one log line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<Record>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = line.split_whitespace();
    let kind = fields.next().unwrap_or_default();
    let first = fields.next().ok_or("missing bus/channel")?;
    let second = fields.next().ok_or("missing payload")?;
    if let Some(extra) = fields.next() {
        return Err(format!("unexpected trailing field '{extra}'"));
    }

    let record = match kind {
        "rx" => Record::Rx(parse_frame(first, second)?),
        "tx" => Record::Tx(parse_frame(first, second)?),
        "lin" => Record::Lin {
            channel: parse_index(first)?,
            data: parse_hex_bytes(second)?,
        },
        "mode" => Record::Mode {
            id: first.parse().map_err(|e| format!("bad mode id '{first}': {e}"))?,
            param: second.parse().map_err(|e| format!("bad mode param '{second}': {e}"))?,
        },
        other => return Err(format!("unknown record kind '{other}'")),
    };
    Ok(Some(record))
}

fn parse_index(field: &str) -> Result<u8, String> {
    field.parse().map_err(|e| format!("bad bus/channel '{field}': {e}"))
}

fn parse_frame(bus: &str, body: &str) -> Result<CanFrame, String> {
    let bus = parse_index(bus)?;
    let (addr, data) = body
        .split_once('#')
        .ok_or_else(|| format!("expected <addr>#<data>, got '{body}'"))?;
    let addr = u32::from_str_radix(addr, 16).map_err(|e| format!("bad address '{addr}': {e}"))?;
    let data = parse_hex_bytes(data)?;
    CanFrame::new(addr, bus, &data).map_err(|e| e.to_string())
}

fn parse_hex_bytes(hex: &str) -> Result<Vec<u8>, String> {
    if hex.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{hex}'"));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("bad hex byte in '{hex}'"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StockEcu;
    use safegate_middleware::Topic;
    use safegate_types::{EventPayload, SafetyAlert, SafetyLifecycle, SafetyMode};

    // ------------------------------------------------------------------ parsing

    #[test]
    fn parses_rx_tx_lin_and_mode() {
        assert_eq!(
            parse_line("rx 0 4F1#00320200").unwrap(),
            Some(Record::Rx(CanFrame::new(0x4F1, 0, &[0x00, 0x32, 0x02, 0x00]).unwrap()))
        );
        assert_eq!(
            parse_line("  tx 2 340#  ").unwrap(),
            Some(Record::Tx(CanFrame::new(0x340, 2, &[]).unwrap()))
        );
        assert_eq!(
            parse_line("lin 1 A55A").unwrap(),
            Some(Record::Lin {
                channel: 1,
                data: vec![0xA5, 0x5A]
            })
        );
        assert_eq!(
            parse_line("mode 17 3").unwrap(),
            Some(Record::Mode { id: 17, param: 3 })
        );
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# header").unwrap(), None);
    }

    #[test]
    fn rejects_malformed_lines() {
        for bad in [
            "rx",
            "rx 0",
            "rx 0 4F1",
            "rx x 4F1#00",
            "rx 0 ZZZ#00",
            "rx 0 4F1#0",
            "rx 0 4F1#GG",
            "rx 0 4F1#000102030405060708",
            "rx 0 4F1#00 extra",
            "can 0 4F1#00",
            "mode nineteen 0",
        ] {
            assert!(parse_line(bad).is_err(), "{bad}");
        }
    }

    // ------------------------------------------------------------------ replay

    #[test]
    fn replay_counts_decisions_under_no_output() {
        let log = "\
# cluster at 50 mph, then at 130 km/h
rx 0 4F1#00320200
rx 0 4F1#00820000
rx 2 123#01
rx 1 123#01
tx 0 340#0000000000000000
lin 0 0102
";
        let mut router = build_router(&Config::default(), EventBus::default());
        let summary = run(&mut router, log.as_bytes(), 0).unwrap();

        assert_eq!(summary.records, 6);
        assert_eq!(summary.received, 4);
        assert_eq!(summary.forwarded, 3);
        assert_eq!(summary.rewritten, 1);
        assert_eq!(summary.admitted, 0);
        assert_eq!(summary.blocked, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.snapshots, 1);
    }

    #[test]
    fn replay_admits_under_all_output() {
        let cfg = Config {
            safety_mode: SafetyMode::AllOutput,
            ..Config::default()
        };
        let log = "tx 0 340#01\nlin 1 FF\ntx 5 340#01\n";
        let mut router = build_router(&cfg, EventBus::default());
        let summary = run(&mut router, log.as_bytes(), 0).unwrap();

        assert_eq!(summary.admitted, 2);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn replay_mode_lines_switch_policy() {
        let log = "mode 17 0\ntx 0 340#01\nmode 4242 0\ntx 0 340#01\n";
        let mut router = build_router(&Config::default(), EventBus::default());
        let summary = run(&mut router, log.as_bytes(), 0).unwrap();

        assert_eq!(summary.admitted, 1);
        assert_eq!(summary.blocked, 1);
        assert_eq!(router.gateway().mode(), SafetyMode::NoOutput);
    }

    #[test]
    fn replay_stock_ecu_leak_faults_gateway() {
        let cfg = Config {
            safety_mode: SafetyMode::AllOutput,
            stock_ecu: vec![StockEcu { bus: 0, addr: 0x340 }],
            ..Config::default()
        };
        let events = EventBus::default();
        let mut alerts = events.subscribe_to(Topic::SafetyAlerts);
        let mut router = build_router(&cfg, events);

        let log = "tx 0 340#01\nrx 0 340#01\ntx 0 340#01\n";
        let summary = run(&mut router, log.as_bytes(), 0).unwrap();

        assert_eq!(summary.admitted, 1);
        assert_eq!(summary.blocked, 1);
        assert_eq!(summary.relay_faults, 1);
        assert_eq!(router.gateway().lifecycle(), SafetyLifecycle::Faulted);
        let alert = alerts.try_next().expect("alert");
        assert!(matches!(
            alert.payload,
            EventPayload::Alert(SafetyAlert::RelayMalfunction { bus: 0, addr: 0x340 })
        ));
    }

    #[test]
    fn replay_publishes_periodic_snapshots() {
        let events = EventBus::default();
        let mut telemetry = events.subscribe_to(Topic::Telemetry);
        let mut router = build_router(&Config::default(), events);

        let log = "rx 1 1#\nrx 1 1#\nrx 1 1#\nrx 1 1#\nrx 1 1#\n";
        let summary = run(&mut router, log.as_bytes(), 2).unwrap();
        assert_eq!(summary.snapshots, 3);

        let mut last = None;
        while let Some(event) = telemetry.try_next() {
            last = Some(event);
        }
        let Some(EventPayload::Snapshot(snapshot)) = last.map(|e| e.payload) else {
            panic!("expected a final snapshot");
        };
        assert_eq!(snapshot.rx_frames, 5);
    }

    #[test]
    fn parse_error_reports_line_number() {
        let mut router = build_router(&Config::default(), EventBus::default());
        let err = run(&mut router, "rx 0 1#00\n\nbogus 0 0\n".as_bytes(), 0).unwrap_err();
        assert!(matches!(err, ReplayError::Parse { line: 3, .. }));
    }
}
