//! `safegate` – bench tool for the CAN safety gateway.
//!
//! ```text
//! safegate replay <file|->   drive a recorded frame log through the gateway
//! safegate modes             list the built-in safety modes
//! safegate init              write the default config file
//! safegate config            show the effective configuration
//! ```
//!
//! Replay summaries go to stdout; logs go to stderr (see [`telemetry`]).

mod config;
mod replay;
mod telemetry;

use std::fs::File;
use std::io::{self, BufReader};
use std::process::ExitCode;

use colored::Colorize;
use safegate_hal::FrameRouter;
use safegate_middleware::{EventBus, Topic, TopicReceiver};
use safegate_types::{EventPayload, SafetyAlert, SafetyLifecycle, SafetyMode};
use tracing::{error, info, info_span};

fn main() -> ExitCode {
    let _guard = telemetry::init_tracing("safegate");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("replay") => match args.get(1) {
            Some(path) => cmd_replay(path),
            None => usage_error("replay needs a log file (or '-' for stdin)"),
        },
        Some("modes") => cmd_modes(),
        Some("init") => cmd_init(),
        Some("config") => cmd_config(),
        Some("help" | "-h" | "--help") | None => {
            print_help();
            ExitCode::SUCCESS
        }
        Some(other) => usage_error(&format!("unknown command '{other}'")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_replay(path: &str) -> ExitCode {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };

    let events = EventBus::new(cfg.event_capacity);
    let mut alerts = events.subscribe_to(Topic::SafetyAlerts);
    let mut router = replay::build_router(&cfg, events);

    let _span = info_span!("replay", path, mode = %cfg.safety_mode).entered();
    info!(param = cfg.safety_param, "replay started");

    let result = if path == "-" {
        replay::run(&mut router, io::stdin().lock(), cfg.snapshot_every)
    } else {
        match File::open(path) {
            Ok(file) => replay::run(&mut router, BufReader::new(file), cfg.snapshot_every),
            Err(e) => Err(e.into()),
        }
    };

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "replay aborted");
            println!("{}: {e}", "Replay failed".red());
            return ExitCode::FAILURE;
        }
    };

    print_router_state(&router);
    println!();
    println!("  {:<14}{}", "records", summary.records);
    println!("  {:<14}{}", "received", summary.received);
    println!("  {:<14}{}", "forwarded", summary.forwarded);
    println!("  {:<14}{}", "rewritten", summary.rewritten);
    println!("  {:<14}{}", "admitted", summary.admitted.to_string().green());
    println!("  {:<14}{}", "blocked", summary.blocked.to_string().yellow());
    if summary.failed > 0 {
        println!("  {:<14}{}", "failed", summary.failed.to_string().red());
    }
    print_alerts(&mut alerts);

    info!(records = summary.records, "replay finished");
    if summary.relay_faults > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn cmd_modes() -> ExitCode {
    println!("  {:<6}{:<14}", "id".bold(), "name".bold());
    for mode in SafetyMode::ALL {
        let marker = if mode == SafetyMode::default() {
            " (default)".dimmed().to_string()
        } else {
            String::new()
        };
        println!("  {:<6}{:<14}{marker}", mode.id(), mode.name());
    }
    ExitCode::SUCCESS
}

fn cmd_init() -> ExitCode {
    let path = config::config_path();
    if path.exists() {
        println!("  Config already exists at {}", path.display().to_string().bold());
        return ExitCode::SUCCESS;
    }
    match config::save(&config::Config::default()) {
        Ok(()) => {
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {e}", "Error saving config".red());
            ExitCode::FAILURE
        }
    }
}

fn cmd_config() -> ExitCode {
    match config::load() {
        Ok(cfg) => {
            println!("  # {}", config::config_path().display().to_string().dimmed());
            match toml::to_string_pretty(&cfg) {
                Ok(raw) => {
                    for line in raw.lines() {
                        println!("  {line}");
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    println!("{}: {e}", "Config error".red());
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            println!("{}: {e}", "Config error".red());
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output helpers
// ─────────────────────────────────────────────────────────────────────────────

fn print_router_state(router: &FrameRouter) {
    let gateway = router.gateway();
    let lifecycle = match gateway.lifecycle() {
        SafetyLifecycle::Permitted => "permitted".green(),
        SafetyLifecycle::Restricted => "restricted".yellow(),
        SafetyLifecycle::Uninitialized => "uninitialized".dimmed(),
        SafetyLifecycle::Faulted => "FAULTED".red().bold(),
    };
    println!(
        "  {} {} (param {}) – {}",
        "mode".bold(),
        gateway.mode(),
        gateway.param(),
        lifecycle
    );
}

fn print_alerts(alerts: &mut TopicReceiver) {
    while let Some(event) = alerts.try_next() {
        let EventPayload::Alert(alert) = event.payload else {
            continue;
        };
        let text = match alert {
            SafetyAlert::RelayMalfunction { bus, addr } => {
                format!("relay malfunction: stock ECU 0x{addr:X} seen on bus {bus}")
            }
            SafetyAlert::UnknownSafetyMode { requested } => {
                format!("unknown safety mode {requested}; no_output installed")
            }
        };
        println!("  {} {text}", "⚠".red().bold());
    }
}

fn usage_error(msg: &str) -> ExitCode {
    println!("{}: {msg}", "Error".red());
    print_help();
    ExitCode::from(2)
}

fn print_help() {
    println!();
    println!("  {} {}", "safegate".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!();
    println!("  {}  <file|->   Replay a frame log through the gateway", "replay".cyan());
    println!("  {}             List built-in safety modes", "modes".cyan());
    println!("  {}              Write the default config file", "init".cyan());
    println!("  {}            Show the effective configuration", "config".cyan());
    println!("  {}              Show this help", "help".cyan());
    println!();
    println!("  Config: {}", config::config_path().display().to_string().dimmed());
    println!();
}
