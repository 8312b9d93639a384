//! Keyboard device transport.
//!
//! The switcher talks to the keyboard only through [`DeviceLink`]; the
//! feature-report wire format lives in the transport implementations.

mod wooting;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use thiserror::Error;
use tracing::info;
pub use wooting::WootingDevice;

use crate::domain::ProfileIndex;

// https://gist.github.com/BigBrainAFK/0ba454a1efb43f7cb6301cda8838f432
pub const RELOAD_PROFILE: u8 = 7;
pub const GET_CURRENT_KEYBOARD_PROFILE_INDEX: u8 = 11;
pub const ACTIVATE_PROFILE: u8 = 23;
pub const REFRESH_RGB_COLORS: u8 = 29;
pub const WOOT_DEV_RESET_ALL: u8 = 32;

/// Errors that can occur talking to the keyboard.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Keyboard not connected")]
    NotConnected,

    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("Unexpected response: {0}")]
    BadResponse(String),
}

/// Connection to a single keyboard.
pub trait DeviceLink: Send + Sync {
    /// Whether the keyboard is present and its handle is open.
    fn is_connected(&self) -> bool;

    /// Send one feature command with its profile argument.
    fn send_feature(&self, command: u8, profile_arg: u8) -> Result<(), DeviceError>;

    /// Query the profile the keyboard currently has active.
    fn read_active_profile(&self) -> Result<ProfileIndex, DeviceError>;

    /// Close the handle; later writes fail with [`DeviceError::NotConnected`].
    fn release(&self);
}

/// Send the profile activation sequence.
///
/// Order is fixed: activate, reload colors, reset (load RGB), refresh
/// effects, with `delay` between consecutive commands. Stops at the first
/// failed write.
pub async fn send_profile_sequence(
    device: &dyn DeviceLink,
    profile: ProfileIndex,
    delay: Duration,
) -> Result<(), DeviceError> {
    for (position, (command, arg)) in profile_sequence(profile).into_iter().enumerate() {
        if position > 0 {
            tokio::time::sleep(delay).await;
        }
        device.send_feature(command, arg)?;
    }

    Ok(())
}

/// Blocking variant of [`send_profile_sequence`] for contexts without a
/// runtime, such as a panic hook.
pub fn send_profile_sequence_blocking(
    device: &dyn DeviceLink,
    profile: ProfileIndex,
    delay: Duration,
) -> Result<(), DeviceError> {
    for (position, (command, arg)) in profile_sequence(profile).into_iter().enumerate() {
        if position > 0 {
            std::thread::sleep(delay);
        }
        device.send_feature(command, arg)?;
    }

    Ok(())
}

fn profile_sequence(profile: ProfileIndex) -> [(u8, u8); 4] {
    let index = profile.get();
    [
        (ACTIVATE_PROFILE, index),
        (RELOAD_PROFILE, index),
        (WOOT_DEV_RESET_ALL, 0),
        (REFRESH_RGB_COLORS, index),
    ]
}

/// Device that logs commands instead of writing them.
#[derive(Debug)]
pub struct DryRunDevice {
    released: AtomicBool,
}

impl DryRunDevice {
    /// Create a new dry-run device.
    pub fn new() -> Self {
        Self {
            released: AtomicBool::new(false),
        }
    }
}

impl Default for DryRunDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLink for DryRunDevice {
    fn is_connected(&self) -> bool {
        !self.released.load(Ordering::Relaxed)
    }

    fn send_feature(&self, command: u8, profile_arg: u8) -> Result<(), DeviceError> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        info!("[DRY RUN] Would send feature {} (profile {})", command, profile_arg);
        Ok(())
    }

    fn read_active_profile(&self) -> Result<ProfileIndex, DeviceError> {
        Err(DeviceError::BadResponse(
            "dry run has no active profile".to_string(),
        ))
    }

    fn release(&self) {
        self.released.store(true, Ordering::Relaxed);
    }
}
