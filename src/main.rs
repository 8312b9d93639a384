//! profile-focusd - user daemon that switches keyboard profiles on focus change.
//!
//! Watches the focused window and activates the keyboard profile configured
//! for it, restoring the original profile on exit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use profile_focusd::backend::{self, BackendKind};
use profile_focusd::config::Config;
use profile_focusd::daemon;
use profile_focusd::device::{self, DeviceLink, DryRunDevice, WootingDevice};
use profile_focusd::domain::ProfileIndex;
use profile_focusd::lifecycle::{self, Lifecycle};
use profile_focusd::switcher::ProfileSwitcher;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Keyboard profile switcher daemon.
///
/// Activates the keyboard profile configured for the focused application.
#[derive(Parser, Debug)]
#[command(name = "profile-focusd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log device commands instead of sending them.
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print focus events to stdout.
    #[arg(long)]
    print_events: bool,

    /// Focus backend to use.
    #[arg(long, value_enum, default_value_t = BackendKind::Auto)]
    backend: BackendKind,

    /// Set the active profile index and exit.
    /// Can be useful for automation scripting.
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=3))]
    profile_index: Option<u8>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;
    install_panic_hook();

    info!("profile-focusd v{} starting", env!("CARGO_PKG_VERSION"));

    let config =
        Config::load_or_create(args.config.as_deref()).context("Failed to load configuration")?;
    info!(
        "Configuration loaded from {}: {} rule(s), {} skipped, send_sleep={:?}",
        config.path.display(),
        config.rules.len(),
        config.rules.skipped(),
        config.send_sleep
    );
    if config.using_fallback {
        warn!("Fix {} and restart to apply it", config.path.display());
    }
    if config.rules.is_empty() {
        warn!("No usable rules; every window will use profile {}", ProfileIndex::DEFAULT);
    }

    let device = open_device(args.dry_run)?;

    if let Some(index) = args.profile_index {
        return set_profile_once(device.as_ref(), index, &config).await;
    }

    run_daemon(device, config, args.backend, args.print_events).await
}

/// Initialize logging with the specified level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(format!("profile_focusd={level}"))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    Ok(())
}

/// Route panics through the log so they are visible under a service manager.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        error!("Panic: {}", panic);
        default_hook(panic);
    }));
}

/// Put the keyboard back before the panic is reported.
fn install_device_panic_hook(
    device: Arc<dyn DeviceLink>,
    initial_profile: Option<ProfileIndex>,
    delay: Duration,
) {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        lifecycle::on_panic(device.as_ref(), initial_profile, delay);
        previous_hook(panic);
    }));
}

/// Open the keyboard, or a logging stand-in in dry-run mode.
fn open_device(dry_run: bool) -> Result<Arc<dyn DeviceLink>> {
    let device: Arc<dyn DeviceLink> = if dry_run {
        info!("Dry run: device commands will only be logged");
        Arc::new(DryRunDevice::new())
    } else {
        Arc::new(WootingDevice::open().context("Keyboard not connected")?)
    };

    if !device.is_connected() {
        anyhow::bail!("Keyboard not connected");
    }

    Ok(device)
}

/// Send one activation sequence and exit.
async fn set_profile_once(device: &dyn DeviceLink, index: u8, config: &Config) -> Result<()> {
    let profile = ProfileIndex::new(index)?;
    info!("Setting profile {}", profile);

    let result = device::send_profile_sequence(device, profile, config.send_sleep).await;
    device.release();
    result.context("Failed to set profile")
}

/// Run daemon event loop.
async fn run_daemon(
    device: Arc<dyn DeviceLink>,
    config: Config,
    backend_kind: BackendKind,
    print_events: bool,
) -> Result<()> {
    let initial_profile = lifecycle::on_startup(device.as_ref());
    install_device_panic_hook(device.clone(), initial_profile, config.send_sleep);
    let switcher = Arc::new(ProfileSwitcher::new(
        device,
        initial_profile,
        config.send_sleep,
    ));

    let lifecycle = Arc::new(Lifecycle::new(switcher.clone()));
    lifecycle.spawn_signal_handler();

    let result = match backend::connect(backend_kind).await {
        Ok(mut source) => {
            info!("Daemon started, waiting for focus events...");
            daemon::run(
                source.as_mut(),
                &config.rules,
                &switcher,
                &lifecycle.shutdown_token(),
                print_events,
            )
            .await
            .context("Focus backend failed")
        }
        Err(e) => {
            error!("Failed to start focus backend: {}", e);
            for diag in backend::diagnostics() {
                error!("  {}", diag);
            }
            Err(e).context("Focus backend unavailable")
        }
    };

    // Restore runs on every exit path; a signal may already have done it.
    let outcome = lifecycle.on_terminate().await;
    debug!("Shutdown complete: {:?}", outcome);

    result
}
