use clap::{Parser, ValueEnum};
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{FailoverError, FailoverResult};
use crate::state::{DEFAULT_BAD_MAX, DEFAULT_GOOD_MIN};

/// Configuration file read when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/link-failover/config.toml";

const DEFAULT_INTERVAL_MS: u64 = 1000;
const DEFAULT_TIMEOUT_MS: u64 = 800;

/// Link failover - moves the default route to a backup link while the
/// preferred link cannot reach its sentinel host
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about)]
pub struct Args {
    /// Path to configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Preferred network interface (e.g., eth0)
    #[arg(short = 'p', long)]
    pub preferred: Option<String>,

    /// Backup network interface (e.g., wlan0)
    #[arg(short = 'b', long)]
    pub backup: Option<String>,

    /// Host probed through the preferred interface
    #[arg(short = 'H', long)]
    pub ping_host: Option<String>,

    /// Probe period in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Probe timeout in milliseconds, must be below the period
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Consecutive failed probes before failing over
    #[arg(long)]
    pub bad_max: Option<u32>,

    /// Consecutive good probes before failing back
    #[arg(long)]
    pub good_min: Option<u32>,

    /// Command run after every switch. Split on whitespace with no shell
    /// quoting; use the `[hooks] on_switch` array in the config file for
    /// arguments containing spaces
    #[arg(long)]
    pub on_switch: Option<String>,

    /// Switch to the given link once and exit
    #[arg(long, value_enum)]
    pub force: Option<ForceTarget>,
}

/// Link selected by `--force`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceTarget {
    Preferred,
    Backup,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FileConfig {
    pub preferred_interface: Option<String>,
    pub backup_interface: Option<String>,
    pub ping_host: Option<String>,
    pub monitoring: Option<MonitoringConfig>,
    pub hooks: Option<HookConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MonitoringConfig {
    pub interval_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub bad_max: Option<u32>,
    pub good_min: Option<u32>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HookConfig {
    pub on_switch: Option<Vec<String>>,
}

/// Fully resolved controller configuration
#[derive(Debug, Clone, PartialEq)]
pub struct FailoverConfig {
    /// Interface that should carry traffic whenever it can
    pub preferred_interface: String,

    /// Interface used while the preferred one is down
    pub backup_interface: String,

    /// Sentinel host probed through the preferred interface
    pub ping_host: String,

    /// Probe period
    pub interval: Duration,

    /// Probe timeout
    pub probe_timeout: Duration,

    /// Failed probes before failing over
    pub bad_max: u32,

    /// Good probes before failing back
    pub good_min: u32,

    /// Command run after every switch
    pub on_switch: Option<Vec<String>>,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        FailoverConfig {
            preferred_interface: String::new(),
            backup_interface: String::new(),
            ping_host: String::new(),
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            probe_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            bad_max: DEFAULT_BAD_MAX,
            good_min: DEFAULT_GOOD_MIN,
            on_switch: None,
        }
    }
}

/// Read a TOML configuration file. A missing file yields `None`.
pub fn load_file(path: &Path) -> FailoverResult<Option<FileConfig>> {
    if !path.exists() {
        debug!("Configuration file {:?} does not exist", path);
        return Ok(None);
    }

    debug!("Reading configuration from {:?}", path);
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content).map_err(|e| {
        FailoverError::InvalidConfiguration(format!("failed to parse {}: {}", path.display(), e))
    })?;
    Ok(Some(config))
}

impl FailoverConfig {
    /// Merge command line and file values with precedence Args -> Config File -> Defaults.
    pub fn from_sources(args: &Args, file: Option<&FileConfig>) -> FailoverResult<Self> {
        let defaults = FailoverConfig::default();
        let monitoring = file.and_then(|f| f.monitoring.as_ref());

        let preferred_interface = args
            .preferred
            .clone()
            .or_else(|| file.and_then(|f| f.preferred_interface.clone()))
            .ok_or_else(|| missing("preferred_interface"))?;

        let backup_interface = args
            .backup
            .clone()
            .or_else(|| file.and_then(|f| f.backup_interface.clone()))
            .ok_or_else(|| missing("backup_interface"))?;

        let ping_host = args
            .ping_host
            .clone()
            .or_else(|| file.and_then(|f| f.ping_host.clone()))
            .ok_or_else(|| missing("ping_host"))?;

        let interval = args
            .interval_ms
            .or_else(|| monitoring.and_then(|m| m.interval_ms))
            .map(Duration::from_millis)
            .unwrap_or(defaults.interval);

        let probe_timeout = args
            .timeout_ms
            .or_else(|| monitoring.and_then(|m| m.timeout_ms))
            .map(Duration::from_millis)
            .unwrap_or(defaults.probe_timeout);

        let bad_max = args
            .bad_max
            .or_else(|| monitoring.and_then(|m| m.bad_max))
            .unwrap_or(defaults.bad_max);

        let good_min = args
            .good_min
            .or_else(|| monitoring.and_then(|m| m.good_min))
            .unwrap_or(defaults.good_min);

        let on_switch: Option<Vec<String>> = args
            .on_switch
            .as_ref()
            .map(|cmd| cmd.split_whitespace().map(str::to_string).collect())
            .or_else(|| file.and_then(|f| f.hooks.as_ref()).and_then(|h| h.on_switch.clone()));

        let config = FailoverConfig {
            preferred_interface,
            backup_interface,
            ping_host,
            interval,
            probe_timeout,
            bad_max,
            good_min,
            on_switch,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the controller relies on.
    pub fn validate(&self) -> FailoverResult<()> {
        for (name, value) in [
            ("preferred_interface", &self.preferred_interface),
            ("backup_interface", &self.backup_interface),
            ("ping_host", &self.ping_host),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(format!("{} must not be empty", name)));
            }
        }

        if self.preferred_interface == self.backup_interface {
            return Err(invalid(format!(
                "preferred and backup interface are both {}",
                self.preferred_interface
            )));
        }

        if self.interval.is_zero() {
            return Err(invalid("probe interval must be positive".to_string()));
        }

        if self.probe_timeout.is_zero() || self.probe_timeout >= self.interval {
            return Err(invalid(format!(
                "probe timeout {:?} must be positive and shorter than the interval {:?}",
                self.probe_timeout, self.interval
            )));
        }

        if self.bad_max == 0 || self.good_min == 0 {
            return Err(invalid("bad_max and good_min must be at least 1".to_string()));
        }

        if let Some(cmd) = &self.on_switch {
            if cmd.is_empty() {
                return Err(invalid("on_switch command must not be empty".to_string()));
            }
        }

        Ok(())
    }
}

fn missing(name: &str) -> FailoverError {
    FailoverError::InvalidConfiguration(format!("{} is required (in args or config)", name))
}

fn invalid(msg: String) -> FailoverError {
    FailoverError::InvalidConfiguration(msg)
}
