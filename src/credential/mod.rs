//! Graphical credential protocol: commitment, constant-time verification,
//! ordered selection and the enrollment/verification flows built on them.

pub mod codec;
pub mod grid;
pub mod selection;
pub mod service;
pub mod store;
pub mod verifier;

pub use codec::commit;
pub use grid::Grid;
pub use selection::{OrderedSelection, Selection, SelectionError, SelectionState, ToggleOutcome};
pub use service::{Challenge, CredentialError, CredentialService};
pub use store::{CredentialStore, MemoryCredentialStore, PgCredentialStore, StoreError};
pub use verifier::verify;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle (URL) to one generated image.
pub type ImageReference = String;

/// Number of images in a graphical password.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RequiredCount {
    Four,
    Six,
}

impl RequiredCount {
    #[must_use]
    pub const fn get(self) -> usize {
        match self {
            Self::Four => 4,
            Self::Six => 6,
        }
    }

    /// Number of images shown in the grid for this password length.
    #[must_use]
    pub const fn grid_size(self) -> usize {
        match self {
            Self::Four => 16,
            Self::Six => 36,
        }
    }

    /// Grid columns; grids are always square.
    #[must_use]
    pub const fn columns(self) -> usize {
        self.get()
    }
}

impl TryFrom<u8> for RequiredCount {
    type Error = SelectionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(Self::Four),
            6 => Ok(Self::Six),
            other => Err(SelectionError::InvalidCount(i64::from(other))),
        }
    }
}

impl TryFrom<i64> for RequiredCount {
    type Error = SelectionError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(Self::Four),
            6 => Ok(Self::Six),
            other => Err(SelectionError::InvalidCount(other)),
        }
    }
}

impl From<RequiredCount> for u8 {
    fn from(value: RequiredCount) -> Self {
        match value {
            RequiredCount::Four => 4,
            RequiredCount::Six => 6,
        }
    }
}

impl fmt::Display for RequiredCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Hex-encoded SHA-256 commitment of an ordered selection.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialDigest(String);

impl CredentialDigest {
    /// Length of the hex encoding.
    pub const HEX_LEN: usize = 64;

    /// Wrap a stored digest, rejecting anything that is not 64 lowercase hex characters.
    ///
    /// # Errors
    /// Returns `StoreError::Corrupt` when the value is malformed.
    pub fn from_hex(value: impl Into<String>) -> Result<Self, StoreError> {
        let value = value.into();
        let well_formed = value.len() == Self::HEX_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(Self(value))
        } else {
            Err(StoreError::Corrupt("credential digest is not 64 hex characters".to_string()))
        }
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against a stored digest.
    #[must_use]
    pub fn matches(&self, stored: &Self) -> bool {
        verifier::verify(&self.0, &stored.0)
    }
}

// Digests are credential material; keep them out of logs.
impl fmt::Debug for CredentialDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CredentialDigest").field(&"***").finish()
    }
}

/// Persisted graphical credential for one subject.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialRecord {
    pub subject_id: String,
    pub required_count: RequiredCount,
    pub theme: String,
    pub digest: CredentialDigest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_count_accepts_four_and_six_only() {
        assert_eq!(RequiredCount::try_from(4u8).ok(), Some(RequiredCount::Four));
        assert_eq!(RequiredCount::try_from(6u8).ok(), Some(RequiredCount::Six));
        assert!(matches!(
            RequiredCount::try_from(5u8),
            Err(SelectionError::InvalidCount(5))
        ));
        assert!(RequiredCount::try_from(0i64).is_err());
    }

    #[test]
    fn grid_size_matches_password_length() {
        assert_eq!(RequiredCount::Four.grid_size(), 16);
        assert_eq!(RequiredCount::Six.grid_size(), 36);
        assert_eq!(RequiredCount::Six.columns() * RequiredCount::Six.columns(), 36);
    }

    #[test]
    fn required_count_serde_uses_integers() {
        let json = serde_json::to_string(&RequiredCount::Six).ok();
        assert_eq!(json.as_deref(), Some("6"));
        let parsed: Result<RequiredCount, _> = serde_json::from_str("7");
        assert!(parsed.is_err());
    }

    #[test]
    fn digest_from_hex_validates_shape() {
        let good = "a".repeat(64);
        assert!(CredentialDigest::from_hex(good).is_ok());
        assert!(CredentialDigest::from_hex("A".repeat(64)).is_err());
        assert!(CredentialDigest::from_hex("ab").is_err());
        assert!(CredentialDigest::from_hex("g".repeat(64)).is_err());
    }

    #[test]
    fn digest_debug_is_redacted() {
        let digest = CredentialDigest::from_bytes(&[0xab; 32]);
        assert_eq!(format!("{digest:?}"), "CredentialDigest(\"***\")");
    }
}
