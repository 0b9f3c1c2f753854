use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use log::{error, info};
use std::io::Write;
use std::path::PathBuf;

use link_failover::config::{self, DEFAULT_CONFIG_PATH};
use link_failover::{
    check_privileges, interface_exists, list_interfaces, Args, CommandHook, Controller,
    FailoverConfig, FailoverError, ForceTarget, IpRouteTable, IptablesFirewall, NoopHook,
    PingProber, SwitchHook, Transition,
};

/// Log lines carry a local timestamp, level and message
fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .init();
}

fn load_config(args: &Args) -> Result<FailoverConfig> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    info!("Configuration file path: {:?}", config_path);

    let file = config::load_file(&config_path)
        .with_context(|| format!("Failed to load config file {:?}", config_path))?;
    if file.is_none() {
        info!("Configuration file does not exist, using command line arguments only");
    }

    let config = FailoverConfig::from_sources(args, file.as_ref())?;
    Ok(config)
}

/// Refuse to start without root or with an interface the kernel does not know.
fn preflight(config: &FailoverConfig) -> Result<()> {
    if !cfg!(target_os = "linux") {
        return Err(FailoverError::UnsupportedOS.into());
    }

    check_privileges()?;

    for iface in [&config.preferred_interface, &config.backup_interface] {
        if !interface_exists(iface) {
            let available = list_interfaces().join(", ");
            return Err(FailoverError::InterfaceNotFound(iface.clone()))
                .with_context(|| format!("Available interfaces: {}", available));
        }
    }
    Ok(())
}

fn build_hook(config: &FailoverConfig) -> Result<Box<dyn SwitchHook>> {
    match &config.on_switch {
        Some(argv) => {
            let hook = CommandHook::new(argv.clone())?;
            info!("Switch hook: {}", hook.argv().join(" "));
            Ok(Box::new(hook))
        }
        None => Ok(Box::new(NoopHook)),
    }
}

fn main() -> Result<()> {
    // Note: For detailed debug logging, set environment variable RUST_LOG=debug
    init_logger();

    let args = Args::parse();
    let config = load_config(&args)?;
    preflight(&config)?;

    info!(
        "Preferred: {}, Backup: {}, Sentinel: {}",
        config.preferred_interface, config.backup_interface, config.ping_host
    );
    info!(
        "Probe every {:?} (timeout {:?}), fail over after {} bad, fail back after {} good",
        config.interval, config.probe_timeout, config.bad_max, config.good_min
    );

    let hook = build_hook(&config)?;
    let mut controller =
        Controller::new(config, IpRouteTable::new(), IptablesFirewall::new(), hook);

    if let Some(target) = args.force {
        let transition = match target {
            ForceTarget::Preferred => Transition::Promote,
            ForceTarget::Backup => Transition::Demote,
        };
        controller
            .force(transition)
            .with_context(|| format!("Forced switch to {:?} failed", target))?;
        info!("Forced switch complete");
        return Ok(());
    }

    let shutdown = controller.shutdown_handle();
    ctrlc::set_handler(move || shutdown.shutdown()).context("Failed to install signal handler")?;

    if let Err(e) = controller.run(PingProber::new()) {
        error!("Controller failed: {}", e);
        return Err(e.into());
    }
    Ok(())
}
