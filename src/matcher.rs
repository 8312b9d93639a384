//! Resolve focus events to a single identity and its profile.

use crate::backend::FocusEvent;
use crate::domain::ProfileIndex;
use crate::rules::ProcessRuleSet;

/// Outcome of matching one focus event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Canonical identity used for debouncing and lookup.
    pub identity: String,

    /// Profile of the matching rule, if any.
    pub profile: Option<ProfileIndex>,
}

impl MatchResult {
    /// Profile to activate: the matched one, or the default profile.
    pub fn target(&self) -> ProfileIndex {
        self.profile.unwrap_or(ProfileIndex::DEFAULT)
    }
}

/// Pick the canonical identity of an event.
///
/// Window name first, then class, then title. Exactly one string is chosen so
/// a window exposing several distinguishing strings cannot match two rules.
pub fn identity(event: &FocusEvent) -> Option<&str> {
    [&event.window_name, &event.window_class, &event.window_title]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .find(|s| !s.is_empty())
}

/// Resolve an event against the rule set.
///
/// Returns `None` when the event carries no usable string.
pub fn resolve(event: &FocusEvent, rules: &ProcessRuleSet) -> Option<MatchResult> {
    let identity = identity(event)?;

    Some(MatchResult {
        identity: identity.to_string(),
        profile: rules.lookup(identity),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(class: Option<&str>, name: Option<&str>, title: Option<&str>) -> FocusEvent {
        FocusEvent::new(
            class.map(str::to_string),
            name.map(str::to_string),
            title.map(str::to_string),
        )
    }

    fn rules() -> ProcessRuleSet {
        ProcessRuleSet::from_pairs([
            ("A", ProfileIndex::new(1).unwrap()),
            ("B", ProfileIndex::new(2).unwrap()),
            ("Steam", ProfileIndex::new(3).unwrap()),
        ])
    }

    #[test]
    fn test_name_wins_over_title() {
        let result = resolve(&event(None, Some("A"), Some("B")), &rules()).unwrap();
        assert_eq!(result.identity, "A");
        assert_eq!(result.profile, ProfileIndex::new(1).ok());
    }

    #[test]
    fn test_title_only() {
        let result = resolve(&event(None, None, Some("B")), &rules()).unwrap();
        assert_eq!(result.identity, "B");
        assert_eq!(result.target().get(), 2);
    }

    #[test]
    fn test_class_used_when_name_absent() {
        let result = resolve(&event(Some("Steam"), None, Some("A")), &rules()).unwrap();
        assert_eq!(result.identity, "Steam");
        assert_eq!(result.target().get(), 3);
    }

    #[test]
    fn test_name_without_rule_does_not_fall_through() {
        // The title would match, but the name is the identity.
        let result = resolve(&event(Some("Steam"), Some("other"), Some("A")), &rules()).unwrap();
        assert_eq!(result.identity, "other");
        assert_eq!(result.profile, None);
        assert_eq!(result.target(), ProfileIndex::DEFAULT);
    }

    #[test]
    fn test_empty_strings_are_skipped() {
        let raw = FocusEvent {
            window_class: Some("Steam".to_string()),
            window_name: Some(String::new()),
            window_title: None,
        };
        assert_eq!(identity(&raw), Some("Steam"));
    }

    #[test]
    fn test_no_usable_string() {
        assert!(resolve(&FocusEvent::default(), &rules()).is_none());
    }
}
