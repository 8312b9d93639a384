//! Debounced profile switching state machine.
//!
//! Rules:
//! - Repeated focus on the same identity does nothing
//! - A new identity with no rule targets the default profile
//! - The device is only written when the target differs from the active profile
//! - After a failed write the device is in doubt and the next write is forced
//! - Once terminating, no new switch starts; the final restore runs exactly once

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::device::DeviceLink;
use crate::device::send_profile_sequence;
use crate::domain::ProfileIndex;
use crate::matcher::MatchResult;

/// Decision for one match result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchDecision {
    /// Same identity as last time.
    Debounced,
    /// New identity, but its profile is already active.
    AlreadyActive(ProfileIndex),
    /// New identity with a different profile: write the device.
    Switch(ProfileIndex),
}

/// What a call into the switcher ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// Shutdown has begun; the event was dropped.
    Ignored,
    Debounced,
    /// No write was needed.
    Unchanged,
    /// The activation sequence was sent.
    Switched(ProfileIndex),
    /// The device rejected a write; state was not advanced.
    Failed,
}

/// Mutable switching state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitcherState {
    /// Last identity seen (empty before the first event).
    pub last_identity: String,

    /// Profile believed active on the device; `None` if unknown.
    pub current_profile: Option<ProfileIndex>,

    /// Profile read at startup, restored on exit; `None` if unreadable.
    pub initial_profile: Option<ProfileIndex>,

    /// A write failed part way; the device may not be on `current_profile`.
    pub in_doubt: bool,
}

impl SwitcherState {
    /// Create state seeded from the profile read at startup.
    pub fn new(initial_profile: Option<ProfileIndex>) -> Self {
        Self {
            last_identity: String::new(),
            current_profile: initial_profile,
            initial_profile,
            in_doubt: false,
        }
    }

    /// Record the identity and decide whether the device needs a write.
    ///
    /// Only `last_identity` changes here; `current_profile` is advanced by
    /// the caller once the write succeeds.
    pub fn decide(&mut self, result: &MatchResult) -> SwitchDecision {
        if result.identity == self.last_identity {
            return SwitchDecision::Debounced;
        }

        debug!(
            "Identity changed: '{}' -> '{}'",
            self.last_identity, result.identity
        );
        self.last_identity.clone_from(&result.identity);

        let target = result.target();
        if self.current_profile == Some(target) && !self.in_doubt {
            SwitchDecision::AlreadyActive(target)
        } else {
            SwitchDecision::Switch(target)
        }
    }
}

/// Single-flight profile switcher for one keyboard.
///
/// All device writes happen while holding the state lock, so a switch and
/// the exit-time restore never interleave on the wire.
pub struct ProfileSwitcher {
    device: Arc<dyn DeviceLink>,
    send_sleep: Duration,
    state: Mutex<SwitcherState>,
    terminating: AtomicBool,
}

impl ProfileSwitcher {
    /// Create a switcher; `initial_profile` is what the keyboard had at startup.
    pub fn new(
        device: Arc<dyn DeviceLink>,
        initial_profile: Option<ProfileIndex>,
        send_sleep: Duration,
    ) -> Self {
        Self {
            device,
            send_sleep,
            state: Mutex::new(SwitcherState::new(initial_profile)),
            terminating: AtomicBool::new(false),
        }
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> SwitcherState {
        self.state.lock().await.clone()
    }

    /// Whether shutdown has begun.
    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::SeqCst)
    }

    /// Apply one match result.
    pub async fn handle(&self, result: &MatchResult) -> SwitchOutcome {
        if self.is_terminating() {
            return SwitchOutcome::Ignored;
        }

        let mut state = self.state.lock().await;

        // Termination may have started while waiting for the lock.
        if self.is_terminating() {
            trace!("Dropping '{}': terminating", result.identity);
            return SwitchOutcome::Ignored;
        }

        match state.decide(result) {
            SwitchDecision::Debounced => {
                trace!("Debounced: '{}'", result.identity);
                SwitchOutcome::Debounced
            }
            SwitchDecision::AlreadyActive(profile) => {
                debug!(
                    "'{}' uses profile {}, already active",
                    result.identity, profile
                );
                SwitchOutcome::Unchanged
            }
            SwitchDecision::Switch(profile) => {
                info!("Switching to profile {} for '{}'", profile, result.identity);
                self.write(&mut state, profile).await
            }
        }
    }

    /// Restore the startup profile and release the device.
    ///
    /// Only the first call does anything; later calls return `Ignored`.
    pub async fn terminate(&self) -> SwitchOutcome {
        if self.terminating.swap(true, Ordering::SeqCst) {
            return SwitchOutcome::Ignored;
        }

        // Waits for an in-flight switch to finish.
        let mut state = self.state.lock().await;

        let outcome = match state.initial_profile {
            None => {
                warn!("Startup profile unknown; not restoring a guessed profile");
                SwitchOutcome::Unchanged
            }
            Some(initial) if state.current_profile == Some(initial) && !state.in_doubt => {
                debug!("Startup profile {} already active", initial);
                SwitchOutcome::Unchanged
            }
            Some(initial) => {
                info!("Restoring startup profile {}", initial);
                self.write(&mut state, initial).await
            }
        };

        self.device.release();
        outcome
    }

    async fn write(&self, state: &mut SwitcherState, profile: ProfileIndex) -> SwitchOutcome {
        match send_profile_sequence(self.device.as_ref(), profile, self.send_sleep).await {
            Ok(()) => {
                state.current_profile = Some(profile);
                state.in_doubt = false;
                SwitchOutcome::Switched(profile)
            }
            Err(e) => {
                error!("Failed to switch to profile {}: {}", profile, e);
                state.in_doubt = true;
                SwitchOutcome::Failed
            }
        }
    }
}
