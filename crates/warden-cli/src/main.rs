//! # Warden
//!
//! Control core of the access-control appliance: loads the configuration,
//! opens the peripherals and IPC channels, starts every worker and runs
//! until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use nix::sys::signal::{SigSet, Signal};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use warden_control::{ControlCore, SignalInterruptBus, block_signals};
use warden_core::config::WardenConfig;
use warden_hardware::Peripherals;
use warden_ipc::{Backend, ChannelSet};

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version)]
#[command(about = "Access-control appliance core")]
struct Args {
    /// Path to the TOML configuration.
    #[arg(short, long, value_name = "FILE", default_value = "/etc/warden/warden.toml")]
    config: PathBuf,

    /// Create the IPC channels and unlink them on exit. Without it the
    /// channels must already exist.
    #[arg(long)]
    own_channels: bool,

    /// Log filter directive, overriding `log_level` from the configuration.
    #[arg(long, value_name = "DIRECTIVE")]
    log_level: Option<String>,

    /// Output logs in JSON format.
    #[arg(long)]
    json_logs: bool,

    /// Validate the configuration and exit.
    #[arg(long)]
    check_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;
    if args.check_config {
        println!("{}: configuration OK", args.config.display());
        return Ok(());
    }
    setup_tracing(&args, &config);
    info!("Warden v{} starting", env!("CARGO_PKG_VERSION"));

    // Every thread inherits this mask, so block before the first spawn.
    block_signals().context("blocking interrupt signals")?;
    let mut shutdown = SigSet::empty();
    shutdown.add(Signal::SIGINT);
    shutdown.add(Signal::SIGTERM);
    shutdown.thread_block().context("blocking shutdown signals")?;

    let peripherals = Peripherals::open(&config.devices).context("opening peripherals")?;
    let backend = Backend::from_config(&config.ipc);
    // A fresh in-process broker has nothing to attach to.
    let owner = args.own_channels || matches!(backend, Backend::Local(_));
    let channels =
        ChannelSet::open(&config.ipc, &backend, owner).context("opening IPC channels")?;
    let bus = SignalInterruptBus::new(&config.devices.irq_relay_device);

    let mut core = ControlCore::new(config, channels, peripherals, Box::new(bus));
    core.start().context("starting control core")?;

    let signal = shutdown.wait().context("waiting for shutdown signal")?;
    info!(signal = signal.as_str(), "shutdown requested");
    core.shutdown();
    info!("Warden stopped");
    Ok(())
}

fn load_config(path: &Path) -> Result<WardenConfig> {
    WardenConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

fn setup_tracing(args: &Args, config: &WardenConfig) {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or_else(|| config.log_level.as_directive());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if args.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).compact().init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_parse() {
        let args = Args::try_parse_from([
            "warden",
            "--config",
            "/tmp/w.toml",
            "--own-channels",
            "--log-level",
            "debug",
            "--json-logs",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("/tmp/w.toml"));
        assert!(args.own_channels);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
        assert!(!args.check_config);
    }

    #[test]
    fn test_default_config_path() {
        let args = Args::try_parse_from(["warden"]).unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/warden/warden.toml"));
    }

    #[test]
    fn test_load_config_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[access]\nmax_consecutive_failures = 0").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("max_consecutive_failures"));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_load_minimal_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"debug\"\n[ipc]\nbackend = \"local\"").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.log_level.as_directive(), "debug");
    }
}
