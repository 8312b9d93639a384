//! Domain types shared by the matcher, switcher and device transport.

use std::fmt;

use thiserror::Error;

/// Highest profile slot a keyboard exposes.
pub const MAX_PROFILE_INDEX: u8 = 3;

/// Device profile slot (newtype for range safety).
///
/// Index 0 is the default "digital" profile; 1..=3 are the analog profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProfileIndex(u8);

/// Rejected profile value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfileIndexError {
    #[error("profile index {0} is outside 0..={MAX_PROFILE_INDEX}")]
    OutOfRange(i64),

    #[error("profile index {0} is not an integer")]
    NotIntegral(f64),
}

impl ProfileIndex {
    /// The default/digital profile.
    pub const DEFAULT: Self = Self(0);

    /// Create a profile index, rejecting values above [`MAX_PROFILE_INDEX`].
    pub fn new(value: u8) -> Result<Self, ProfileIndexError> {
        if value > MAX_PROFILE_INDEX {
            return Err(ProfileIndexError::OutOfRange(i64::from(value)));
        }
        Ok(Self(value))
    }

    /// Validate an arbitrary JSON number.
    pub fn from_f64(value: f64) -> Result<Self, ProfileIndexError> {
        if value.fract() != 0.0 || !value.is_finite() {
            return Err(ProfileIndexError::NotIntegral(value));
        }
        // Integral and finite, so the cast only saturates for huge magnitudes.
        #[allow(clippy::cast_possible_truncation)]
        let integral = value as i64;
        Self::try_from(integral)
    }

    /// Raw slot number as sent on the wire.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for ProfileIndex {
    type Error = ProfileIndexError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| ProfileIndexError::OutOfRange(value))
            .and_then(Self::new)
    }
}

impl fmt::Display for ProfileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_accepts_valid_range() {
        for i in 0..=MAX_PROFILE_INDEX {
            assert_eq!(ProfileIndex::new(i).unwrap().get(), i);
        }
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert_eq!(
            ProfileIndex::new(4),
            Err(ProfileIndexError::OutOfRange(4))
        );
    }

    #[test]
    fn test_try_from_negative() {
        assert_eq!(
            ProfileIndex::try_from(-1_i64),
            Err(ProfileIndexError::OutOfRange(-1))
        );
        assert_eq!(ProfileIndex::try_from(2_i64).unwrap().get(), 2);
    }

    #[test]
    fn test_from_f64() {
        assert_eq!(ProfileIndex::from_f64(3.0).unwrap().get(), 3);
        assert_eq!(
            ProfileIndex::from_f64(1.5),
            Err(ProfileIndexError::NotIntegral(1.5))
        );
        assert_eq!(
            ProfileIndex::from_f64(9.0),
            Err(ProfileIndexError::OutOfRange(9))
        );
        assert_eq!(
            ProfileIndex::from_f64(-2.0),
            Err(ProfileIndexError::OutOfRange(-2))
        );
    }
}
