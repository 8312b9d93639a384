//! End-to-end runs of the daemon loop with a scripted focus source and a
//! recording keyboard.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use profile_focusd::backend::{FocusError, FocusEvent, FocusSource};
use profile_focusd::config::ConfigDocument;
use profile_focusd::daemon;
use profile_focusd::device::{
    ACTIVATE_PROFILE, DeviceError, DeviceLink, REFRESH_RGB_COLORS, RELOAD_PROFILE,
    WOOT_DEV_RESET_ALL,
};
use profile_focusd::domain::ProfileIndex;
use profile_focusd::lifecycle::{self, Lifecycle};
use profile_focusd::rules::ProcessRuleSet;
use profile_focusd::switcher::{ProfileSwitcher, SwitchOutcome};
use tokio_util::sync::CancellationToken;

struct RecordingDevice {
    active: u8,
    sent: Mutex<Vec<(u8, u8)>>,
    released: Mutex<bool>,
}

impl RecordingDevice {
    fn on_profile(active: u8) -> Arc<Self> {
        Arc::new(Self {
            active,
            sent: Mutex::new(Vec::new()),
            released: Mutex::new(false),
        })
    }

    fn sent(&self) -> Vec<(u8, u8)> {
        self.sent.lock().clone()
    }
}

impl DeviceLink for RecordingDevice {
    fn is_connected(&self) -> bool {
        !*self.released.lock()
    }

    fn send_feature(&self, command: u8, profile_arg: u8) -> Result<(), DeviceError> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        self.sent.lock().push((command, profile_arg));
        Ok(())
    }

    fn read_active_profile(&self) -> Result<ProfileIndex, DeviceError> {
        ProfileIndex::new(self.active).map_err(|e| DeviceError::BadResponse(e.to_string()))
    }

    fn release(&self) {
        *self.released.lock() = true;
    }
}

/// Plays back events, then requests shutdown and blocks like a real source.
struct ScriptedSource {
    events: VecDeque<FocusEvent>,
    shutdown: CancellationToken,
}

#[async_trait]
impl FocusSource for ScriptedSource {
    async fn next_event(&mut self) -> Result<FocusEvent, FocusError> {
        if let Some(event) = self.events.pop_front() {
            return Ok(event);
        }
        self.shutdown.cancel();
        std::future::pending().await
    }
}

fn named(name: &str) -> FocusEvent {
    FocusEvent::new(None, Some(name.to_string()), None)
}

fn sequence(profile: u8) -> Vec<(u8, u8)> {
    vec![
        (ACTIVATE_PROFILE, profile),
        (RELOAD_PROFILE, profile),
        (WOOT_DEV_RESET_ALL, 0),
        (REFRESH_RGB_COLORS, profile),
    ]
}

fn rules() -> ProcessRuleSet {
    let document = ConfigDocument::parse(
        r#"{"process_list": [
            {"process_name": "steam_app_1", "profile_index": 1},
            {"process_name": "bad", "profile_index": 9},
            {"process_name": 123, "profile_index": 2}
        ]}"#,
    )
    .unwrap();
    ProcessRuleSet::from_entries(&document.process_list)
}

async fn run_script(device: Arc<RecordingDevice>, events: Vec<FocusEvent>) -> SwitchOutcome {
    let initial = lifecycle::on_startup(device.as_ref());
    let switcher = Arc::new(ProfileSwitcher::new(
        device,
        initial,
        Duration::from_millis(10),
    ));
    let lifecycle = Lifecycle::new(switcher.clone());
    let shutdown = lifecycle.shutdown_token();

    let mut source = ScriptedSource {
        events: events.into(),
        shutdown: shutdown.clone(),
    };
    daemon::run(&mut source, &rules(), &switcher, &shutdown, false)
        .await
        .unwrap();

    lifecycle.on_terminate().await
}

#[tokio::test(start_paused = true)]
async fn test_switch_debounce_default_and_restore() {
    let device = RecordingDevice::on_profile(0);

    let restore = run_script(
        device.clone(),
        vec![named("steam_app_1"), named("steam_app_1"), named("other")],
    )
    .await;

    let mut expected = sequence(1);
    expected.extend(sequence(0));
    assert_eq!(device.sent(), expected);

    // Already back on the startup profile: nothing to restore.
    assert_eq!(restore, SwitchOutcome::Unchanged);
    assert!(!device.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_restore_after_switch_away() {
    let device = RecordingDevice::on_profile(2);

    let restore = run_script(device.clone(), vec![named("steam_app_1")]).await;

    let mut expected = sequence(1);
    expected.extend(sequence(2));
    assert_eq!(device.sent(), expected);
    assert_eq!(restore, SwitchOutcome::Switched(ProfileIndex::new(2).unwrap()));
}

#[tokio::test(start_paused = true)]
async fn test_no_events_still_terminates_cleanly() {
    let device = RecordingDevice::on_profile(3);

    let restore = run_script(device.clone(), Vec::new()).await;

    assert!(device.sent().is_empty());
    assert_eq!(restore, SwitchOutcome::Unchanged);
    assert!(!device.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_events_without_identity_are_ignored() {
    let device = RecordingDevice::on_profile(0);

    run_script(
        device.clone(),
        vec![
            FocusEvent::default(),
            FocusEvent::new(Some(String::new()), Some(String::new()), None),
            named("steam_app_1"),
        ],
    )
    .await;

    let mut expected = sequence(1);
    expected.extend(sequence(0));
    assert_eq!(device.sent(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_title_precedence_in_loop() {
    let device = RecordingDevice::on_profile(0);

    // Name wins over a matching title, so no switch happens.
    run_script(
        device.clone(),
        vec![FocusEvent::new(
            None,
            Some("launcher".to_string()),
            Some("steam_app_1".to_string()),
        )],
    )
    .await;
    assert!(device.sent().is_empty());

    // With only a title, the title is the identity.
    let device = RecordingDevice::on_profile(0);
    run_script(
        device.clone(),
        vec![FocusEvent::new(None, None, Some("steam_app_1".to_string()))],
    )
    .await;
    assert_eq!(device.sent()[..4], sequence(1)[..]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_events_and_terminate_never_interleave() {
    let device = RecordingDevice::on_profile(0);
    let switcher = Arc::new(ProfileSwitcher::new(
        device.clone(),
        ProfileIndex::new(0).ok(),
        Duration::from_millis(10),
    ));
    let lifecycle = Arc::new(Lifecycle::new(switcher.clone()));
    let rules = Arc::new(ProcessRuleSet::from_pairs([
        ("a", ProfileIndex::new(1).unwrap()),
        ("b", ProfileIndex::new(2).unwrap()),
        ("c", ProfileIndex::new(3).unwrap()),
    ]));

    let mut tasks = Vec::new();
    for name in ["a", "b", "c", "a", "b"] {
        let switcher = switcher.clone();
        let rules = rules.clone();
        tasks.push(tokio::spawn(async move {
            daemon::handle_focus_event(&named(name), &rules, &switcher, false).await
        }));
    }
    let terminate = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move { lifecycle.on_terminate().await })
    };

    for task in tasks {
        task.await.unwrap();
    }
    terminate.await.unwrap();

    let sent = device.sent();
    assert_eq!(sent.len() % 4, 0);
    for chunk in sent.chunks(4) {
        let profile = chunk[0].1;
        assert_eq!(chunk, sequence(profile).as_slice());
    }
    // Whatever ran, the last sequence on the wire restores the startup profile.
    if let Some(last) = sent.chunks(4).last() {
        assert_eq!(last[0], (ACTIVATE_PROFILE, 0));
    }
}
