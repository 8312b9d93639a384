//! Daemon event loop: focus events in, profile switches out.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::FocusError;
use crate::backend::FocusEvent;
use crate::backend::FocusSource;
use crate::matcher;
use crate::rules::ProcessRuleSet;
use crate::switcher::ProfileSwitcher;
use crate::switcher::SwitchOutcome;

/// Process focus events one at a time until `shutdown` is cancelled.
///
/// Each switch completes before the next event is read, so device access is
/// single-flight without extra locking on this path.
pub async fn run(
    source: &mut dyn FocusSource,
    rules: &ProcessRuleSet,
    switcher: &ProfileSwitcher,
    shutdown: &CancellationToken,
    print_events: bool,
) -> Result<(), FocusError> {
    debug!("Waiting for focus events...");

    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                debug!("Event loop stopped");
                return Ok(());
            }

            event = source.next_event() => {
                handle_focus_event(&event?, rules, switcher, print_events).await;
            }
        }
    }
}

/// Handle a focus event.
pub async fn handle_focus_event(
    event: &FocusEvent,
    rules: &ProcessRuleSet,
    switcher: &ProfileSwitcher,
    print_events: bool,
) -> SwitchOutcome {
    if print_events {
        println!(
            "[FOCUS] | name={:?} class={:?} title={:?}",
            event.window_name, event.window_class, event.window_title
        );
    }

    let Some(result) = matcher::resolve(event, rules) else {
        debug!("Ignoring focus event without a usable identity");
        return SwitchOutcome::Unchanged;
    };

    switcher.handle(&result).await
}
