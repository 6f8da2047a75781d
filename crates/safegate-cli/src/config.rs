//! Configuration – reads/writes `~/.safegate/config.toml`.
//!
//! The only safety-relevant setting is the profile selector (`safety_mode`
//! plus its `safety_param`); everything else tunes the bench tooling around
//! the gateway. A missing file means defaults, and the default mode is the
//! restrictive one.

use std::fs;
use std::path::{Path, PathBuf};

use safegate_middleware::MAX_CAPACITY;
use safegate_types::{GateError, SafetyMode};
use serde::{Deserialize, Serialize};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_VAR: &str = "SAFEGATE_CONFIG";

/// A `(bus, addr)` pair whose reception means the isolation relay failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEcu {
    pub bus: u8,
    pub addr: u32,
}

/// Persisted configuration stored in `~/.safegate/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Safety profile selected at start-up.
    #[serde(default)]
    pub safety_mode: SafetyMode,

    /// Opaque variant selector passed to the profile's `init`.
    #[serde(default)]
    pub safety_param: u16,

    /// Publish a telemetry snapshot every this many replayed records
    /// (`0` disables periodic snapshots).
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: u64,

    /// Per-topic buffer of the telemetry bus, `1..=65536`.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Stock ECU frames that latch the relay malfunction fault when seen.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stock_ecu: Vec<StockEcu>,
}

fn default_snapshot_every() -> u64 {
    100
}
fn default_event_capacity() -> usize {
    256
}

impl Default for Config {
    fn default() -> Self {
        Self {
            safety_mode: SafetyMode::default(),
            safety_param: 0,
            snapshot_every: default_snapshot_every(),
            event_capacity: default_event_capacity(),
            stock_ecu: Vec::new(),
        }
    }
}

/// Path of the active config file: `$SAFEGATE_CONFIG`, else
/// `~/.safegate/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(explicit) = std::env::var(CONFIG_PATH_VAR) {
        return PathBuf::from(explicit);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".safegate").join("config.toml")
}

/// Load the config from [`config_path`] and apply environment overrides.
/// A missing file yields [`Config::default`] with the overrides applied.
pub fn load() -> Result<Config, GateError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg)?;
    Ok(cfg)
}

/// Parse the config at `path`. `Ok(None)` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, GateError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| GateError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| GateError::Config(format!("failed to parse {}: {e}", path.display())))?;
    validate(&cfg).map_err(|e| GateError::Config(format!("{}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Range checks serde cannot express.
fn validate(cfg: &Config) -> Result<(), String> {
    if !(1..=MAX_CAPACITY).contains(&cfg.event_capacity) {
        return Err(format!(
            "event_capacity {} outside 1..={MAX_CAPACITY}",
            cfg.event_capacity
        ));
    }
    Ok(())
}

/// Apply `SAFEGATE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SAFEGATE_SAFETY_MODE` | `safety_mode` (by name, e.g. `no_output`) |
/// | `SAFEGATE_SAFETY_PARAM` | `safety_param` |
///
/// # Errors
///
/// [`GateError::Config`] for an unrecognised mode name or an unparsable
/// parameter; `cfg` keeps its previous mode in that case.
pub fn apply_env_overrides(cfg: &mut Config) -> Result<(), GateError> {
    if let Ok(v) = std::env::var("SAFEGATE_SAFETY_MODE") {
        cfg.safety_mode = SafetyMode::from_name(v.trim())
            .ok_or_else(|| GateError::Config(format!("unknown SAFEGATE_SAFETY_MODE '{v}'")))?;
    }
    if let Ok(v) = std::env::var("SAFEGATE_SAFETY_PARAM") {
        cfg.safety_param = v
            .trim()
            .parse()
            .map_err(|e| GateError::Config(format!("invalid SAFEGATE_SAFETY_PARAM '{v}': {e}")))?;
    }
    Ok(())
}

/// Save the config to [`config_path`], creating the directory if necessary.
pub fn save(cfg: &Config) -> Result<(), GateError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), GateError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| GateError::Config(format!("failed to create {}: {e}", parent.display())))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| GateError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| GateError::Config(format!("failed to write {}: {e}", path.display())))
}
