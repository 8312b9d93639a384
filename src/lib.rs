//! profile-focusd - switch keyboard profiles to follow the focused application.
//!
//! Focus events from the window system are reduced to a single identity,
//! matched against the configured process list, and turned into the minimal
//! sequence of device commands needed to keep the keyboard on the right
//! profile. The profile active at startup is restored on exit.

pub mod backend;
pub mod config;
pub mod daemon;
pub mod device;
pub mod domain;
pub mod lifecycle;
pub mod matcher;
pub mod rules;
pub mod switcher;
