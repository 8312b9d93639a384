//! Startup profile capture and termination handling.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::device;
use crate::device::DeviceLink;
use crate::device::WOOT_DEV_RESET_ALL;
use crate::domain::ProfileIndex;
use crate::switcher::ProfileSwitcher;
use crate::switcher::SwitchOutcome;

/// Read the profile the keyboard has before the daemon touches it.
///
/// Best effort: an unreadable profile yields `None`, and restore on exit is
/// then skipped.
pub fn on_startup(device: &dyn DeviceLink) -> Option<ProfileIndex> {
    match device.read_active_profile() {
        Ok(profile) => {
            info!("Keyboard is on profile {} at startup", profile);
            Some(profile)
        }
        Err(e) => {
            warn!("Could not read the active profile ({}); it will not be restored on exit", e);
            None
        }
    }
}

/// Put the keyboard back after a panic.
///
/// Runs synchronously inside the panic hook, outside the switcher lock. The
/// startup profile is re-activated when known; otherwise the device is reset.
pub fn on_panic(device: &dyn DeviceLink, initial_profile: Option<ProfileIndex>, delay: Duration) {
    let result = match initial_profile {
        Some(profile) => {
            info!("Restoring startup profile {} after panic", profile);
            device::send_profile_sequence_blocking(device, profile, delay)
        }
        None => {
            info!("Resetting keyboard after panic");
            device.send_feature(WOOT_DEV_RESET_ALL, 0)
        }
    };

    if let Err(e) = result {
        error!("Failed to reset keyboard after panic: {}", e);
    }
}

/// Owns shutdown: cancels the event loop and runs the final restore once.
pub struct Lifecycle {
    switcher: Arc<ProfileSwitcher>,
    shutdown: CancellationToken,
    terminated: OnceCell<SwitchOutcome>,
}

impl Lifecycle {
    /// Create a lifecycle controller for a switcher.
    pub fn new(switcher: Arc<ProfileSwitcher>) -> Self {
        Self {
            switcher,
            shutdown: CancellationToken::new(),
            terminated: OnceCell::new(),
        }
    }

    /// Token cancelled as soon as termination begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop the event loop, restore the startup profile and release the device.
    ///
    /// Safe to call from several places; concurrent callers all wait for the
    /// single restore to finish.
    pub async fn on_terminate(&self) -> SwitchOutcome {
        self.shutdown.cancel();
        *self
            .terminated
            .get_or_init(|| self.switcher.terminate())
            .await
    }

    /// Run [`Self::on_terminate`] when SIGINT or SIGTERM arrives.
    pub fn spawn_signal_handler(self: &Arc<Self>) -> JoinHandle<()> {
        let lifecycle = Arc::clone(self);

        tokio::spawn(async move {
            tokio::select! {
                signal = wait_for_signal() => match signal {
                    Ok(name) => info!("Received {}, shutting down", name),
                    Err(e) => {
                        error!("Failed to listen for shutdown signals: {}", e);
                        return;
                    }
                },
                () = lifecycle.shutdown.cancelled() => return,
            }

            lifecycle.on_terminate().await;
        })
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::SignalKind;
    use tokio::signal::unix::signal;

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "Ctrl+C")
}
