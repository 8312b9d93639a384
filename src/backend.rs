//! Focus detection backends.
//!
//! This module provides a generic abstraction for detecting window focus changes
//! across different window systems. The rest of the daemon only ever sees
//! [`FocusSource`] and never branches on the platform.

mod hyprland;
mod x11;

use std::env;

use async_trait::async_trait;
use clap::ValueEnum;
pub use hyprland::HyprlandSource;
use thiserror::Error;
use tracing::info;
pub use x11::X11Source;

/// Backend-agnostic focus event.
///
/// Every field is best effort: protected windows or windows without a title
/// leave the corresponding field empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FocusEvent {
    /// Window class (e.g. the X11 `WM_CLASS` class part, Hyprland class).
    pub window_class: Option<String>,

    /// Window/application name (e.g. the X11 `WM_CLASS` instance part).
    pub window_name: Option<String>,

    /// Window title.
    pub window_title: Option<String>,
}

impl FocusEvent {
    /// Create a new focus event, treating empty strings as absent.
    pub fn new(
        window_class: Option<String>,
        window_name: Option<String>,
        window_title: Option<String>,
    ) -> Self {
        Self {
            window_class: window_class.filter(|s| !s.is_empty()),
            window_name: window_name.filter(|s| !s.is_empty()),
            window_title: window_title.filter(|s| !s.is_empty()),
        }
    }

    /// Returns true if no field carries a usable string.
    pub fn is_empty(&self) -> bool {
        self.window_class.is_none() && self.window_name.is_none() && self.window_title.is_none()
    }
}

/// Trait for focus event sources.
#[async_trait]
pub trait FocusSource: Send {
    /// Get the next focus event.
    ///
    /// Suspends until the window system reports a foreground change. The
    /// sequence never ends on its own; implementations should handle
    /// reconnection internally and only return an error when they cannot.
    async fn next_event(&mut self) -> Result<FocusEvent, FocusError>;
}

/// Errors that can occur in focus detection.
#[derive(Error, Debug)]
pub enum FocusError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Socket path not found: {0}")]
    SocketNotFound(String),

    #[error("Focus source disconnected")]
    Disconnected,

    #[error("No supported window system detected (need Hyprland or X11)")]
    NoBackend,
}

/// Which focus backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BackendKind {
    /// Pick from the environment.
    #[default]
    Auto,
    /// X11 `_NET_ACTIVE_WINDOW` notifications.
    X11,
    /// Hyprland socket2 event stream.
    Hyprland,
}

impl BackendKind {
    /// Resolve `Auto` from the session environment.
    pub fn detect(self) -> Result<Self, FocusError> {
        if self != Self::Auto {
            return Ok(self);
        }

        if env::var_os("HYPRLAND_INSTANCE_SIGNATURE").is_some() {
            Ok(Self::Hyprland)
        } else if env::var_os("DISPLAY").is_some() {
            Ok(Self::X11)
        } else {
            Err(FocusError::NoBackend)
        }
    }
}

/// Connect to the focus backend of the given kind.
pub async fn connect(kind: BackendKind) -> Result<Box<dyn FocusSource>, FocusError> {
    let kind = kind.detect()?;
    info!("Using {:?} focus backend", kind);

    match kind {
        BackendKind::Hyprland => Ok(Box::new(HyprlandSource::connect().await?)),
        BackendKind::X11 => Ok(Box::new(X11Source::connect()?)),
        BackendKind::Auto => Err(FocusError::NoBackend),
    }
}

/// Environment diagnostics for troubleshooting a backend that fails to start.
pub fn diagnostics() -> Vec<String> {
    ["DISPLAY", "XDG_RUNTIME_DIR", "HYPRLAND_INSTANCE_SIGNATURE"]
        .into_iter()
        .map(|var| match env::var(var) {
            Ok(v) => format!("{var}={v}"),
            Err(_) => format!("{var}: NOT SET"),
        })
        .collect()
}
