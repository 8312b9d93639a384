//! Process rule set: exact-match patterns mapped to device profiles.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::domain::ProfileIndex;
use crate::domain::ProfileIndexError;

/// Field holding the match pattern in each `process_list` entry.
const MATCH_FIELD: &str = "process_name";

/// Field holding the profile slot in each `process_list` entry.
const PROFILE_FIELD: &str = "profile_index";

/// Why a single `process_list` entry was dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NotAnObject,
    MissingPattern,
    PatternNotString,
    MissingProfile,
    ProfileNotNumeric,
    ProfileNotIntegral(f64),
    ProfileOutOfRange(i64),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "entry is not an object"),
            Self::MissingPattern => write!(f, "missing '{MATCH_FIELD}'"),
            Self::PatternNotString => write!(f, "'{MATCH_FIELD}' is not a string"),
            Self::MissingProfile => write!(f, "missing '{PROFILE_FIELD}'"),
            Self::ProfileNotNumeric => write!(f, "'{PROFILE_FIELD}' is not a number"),
            Self::ProfileNotIntegral(v) => {
                write!(f, "'{PROFILE_FIELD}' {v} is not an integer")
            }
            Self::ProfileOutOfRange(v) => {
                write!(f, "'{PROFILE_FIELD}' {v} is outside 0..=3")
            }
        }
    }
}

/// Ordered rules collapsed into an exact-match lookup table.
///
/// Later entries with an identical pattern overwrite earlier ones.
#[derive(Debug, Clone, Default)]
pub struct ProcessRuleSet {
    rules: HashMap<String, ProfileIndex>,
    skipped: usize,
}

impl ProcessRuleSet {
    /// Build a rule set from already-validated pairs, in priority order.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, ProfileIndex)>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for (pattern, profile) in pairs {
            set.insert(pattern.into(), profile);
        }
        set
    }

    /// Build a rule set from the raw `process_list` entries.
    ///
    /// Each entry is validated on its own; invalid entries are skipped with a
    /// warning and never abort the load.
    pub fn from_entries(entries: &[Value]) -> Self {
        let mut set = Self::default();

        for (position, entry) in entries.iter().enumerate() {
            match parse_entry(entry) {
                Ok((pattern, profile)) => set.insert(pattern.to_string(), profile),
                Err(reason) => {
                    warn!("Skipping process_list entry #{}: {}", position, reason);
                    set.skipped += 1;
                }
            }
        }

        set
    }

    /// Exact-string lookup of the profile for an identity.
    pub fn lookup(&self, identity: &str) -> Option<ProfileIndex> {
        self.rules.get(identity).copied()
    }

    /// Number of usable rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no usable rule was loaded.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of entries dropped during load.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn insert(&mut self, pattern: String, profile: ProfileIndex) {
        if let Some(previous) = self.rules.insert(pattern.clone(), profile) {
            warn!(
                "Duplicate process_name '{}': profile {} replaces {}",
                pattern, profile, previous
            );
        } else {
            debug!("Rule: '{}' -> profile {}", pattern, profile);
        }
    }
}

/// Validate one `process_list` entry.
fn parse_entry(entry: &Value) -> Result<(&str, ProfileIndex), SkipReason> {
    let object = entry.as_object().ok_or(SkipReason::NotAnObject)?;

    let pattern = match object.get(MATCH_FIELD) {
        None | Some(Value::Null) => return Err(SkipReason::MissingPattern),
        Some(Value::String(s)) => s.as_str(),
        Some(_) => return Err(SkipReason::PatternNotString),
    };

    let number = match object.get(PROFILE_FIELD) {
        None | Some(Value::Null) => return Err(SkipReason::MissingProfile),
        Some(Value::Number(n)) => n,
        Some(_) => return Err(SkipReason::ProfileNotNumeric),
    };

    let profile = if let Some(i) = number.as_i64() {
        ProfileIndex::try_from(i).map_err(|_| SkipReason::ProfileOutOfRange(i))?
    } else if let Some(u) = number.as_u64() {
        // Only reachable above i64::MAX.
        return Err(SkipReason::ProfileOutOfRange(i64::try_from(u).unwrap_or(i64::MAX)));
    } else {
        let f = number.as_f64().ok_or(SkipReason::ProfileNotNumeric)?;
        ProfileIndex::from_f64(f).map_err(|e| match e {
            ProfileIndexError::OutOfRange(v) => SkipReason::ProfileOutOfRange(v),
            ProfileIndexError::NotIntegral(v) => SkipReason::ProfileNotIntegral(v),
        })?
    };

    Ok((pattern, profile))
}
