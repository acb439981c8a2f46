//! # OHT-50 Control Core Binary
//!
//! Loads `core.toml`, opens the RS485 bus, and runs the fixed-period
//! cooperative tick loop (§4.9) until a clean shutdown is requested.
//!
//! # Usage
//!
//! ```bash
//! # Run with the default config path
//! oht_core
//!
//! # Run against a specific config, with debug logging
//! oht_core --config /etc/oht/core.toml -v
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use oht_common::config::ConfigLoader;
use oht_core::config::CoreConfig;
use oht_core::error::CoreError;
use oht_core::hal_sim::SimulatedHal;
use oht_core::orchestrator::{CoreEvent, CoreOrchestrator};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// OHT-50 Control Core - deterministic master-module control loop.
#[derive(Parser, Debug)]
#[command(name = "oht_core")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "OHT-50 master module control core")]
#[command(long_about = None)]
struct Args {
    /// Path to the core configuration file (core.toml)
    #[arg(short, long, default_value = "/etc/oht50/core.toml")]
    config: PathBuf,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    match run(&args) {
        Ok(()) => {
            info!("OHT-50 control core shut down cleanly");
        }
        Err(e) => {
            error!("OHT-50 control core exited with a fatal error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

fn run(args: &Args) -> Result<(), CoreError> {
    info!("OHT-50 control core v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = CoreConfig::load(&args.config)?;
    config.validate()?;
    info!("loaded configuration from {}", args.config.display());

    // TODO(#HAL-gpio-driver): swap in a real GPIO/LED backend once the
    // master-module carrier board bring-up lands; `SimulatedHal` keeps the
    // tick loop runnable on dev hosts in the meantime.
    let mut orchestrator = CoreOrchestrator::open(config, Box::new(SimulatedHal::new()))?;
    orchestrator.subscribe(Box::new(|event| match event {
        CoreEvent::StateChanged { from, to } => info!(?from, ?to, "state transition"),
        CoreEvent::FaultRaised(kind) => error!(?kind, "fault raised"),
        CoreEvent::EstopTriggered => error!("e-stop triggered"),
    }));

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    install_signal_handler(Arc::clone(&shutdown_flag));

    info!("entering tick loop");
    orchestrator
        .run(|| shutdown_flag.load(Ordering::Relaxed))
        .map_err(|e| CoreError::Fatal(e.to_string()))
}

/// Register a SIGINT/SIGTERM handler that flips `flag` so the tick loop
/// can request a clean shutdown (§6) instead of being killed mid-cycle.
fn install_signal_handler(flag: Arc<AtomicBool>) {
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

    static SHUTDOWN_FLAG: std::sync::OnceLock<Arc<AtomicBool>> = std::sync::OnceLock::new();
    let _ = SHUTDOWN_FLAG.set(flag);

    extern "C" fn handle_signal(_sig: i32) {
        if let Some(flag) = SHUTDOWN_FLAG.get() {
            flag.store(true, Ordering::Relaxed);
        }
    }

    let action = SigAction::new(SigHandler::Handler(handle_signal), SaFlags::empty(), SigSet::empty());
    unsafe {
        let _ = signal::sigaction(Signal::SIGINT, &action);
        let _ = signal::sigaction(Signal::SIGTERM, &action);
    }
}

/// Configure the tracing subscriber from CLI flags.
fn setup_tracing(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
