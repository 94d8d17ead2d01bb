//! Enrollment, credential reset and verification over a credential store.

use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

use super::{
    codec, CredentialRecord, CredentialStore, ImageReference, OrderedSelection, RequiredCount,
    SelectionError, StoreError,
};

const MAX_THEME_LEN: usize = 50;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("theme must be 1-50 characters of letters, numbers, and spaces")]
    InvalidTheme,
    #[error("no graphical password found")]
    NotEnrolled,
    #[error("a graphical password is already set up")]
    AlreadyEnrolled,
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CredentialError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists => Self::AlreadyEnrolled,
            other => Self::Store(other),
        }
    }
}

/// What a client needs to start a verification grid.
#[derive(ToSchema, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    #[schema(value_type = u8)]
    pub required_count: RequiredCount,
    pub theme: String,
    pub grid_size: usize,
}

/// Normalize and validate an enrollment theme.
///
/// # Errors
/// Returns `CredentialError::InvalidTheme` unless the trimmed theme is 1-50
/// characters of ASCII letters, digits, and whitespace.
pub fn validate_theme(theme: &str) -> Result<String, CredentialError> {
    let trimmed = theme.trim();
    let valid = !trimmed.is_empty()
        && trimmed.chars().count() <= MAX_THEME_LEN
        && Regex::new(r"^[a-zA-Z0-9\s]+$").is_ok_and(|regex| regex.is_match(trimmed));
    if valid {
        Ok(trimmed.to_string())
    } else {
        Err(CredentialError::InvalidTheme)
    }
}

#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
}

impl CredentialService {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Create the first credential for a subject.
    ///
    /// # Errors
    /// Fails on an invalid theme, an invalid selection, an existing record, or a
    /// store failure.
    #[instrument(skip(self, selection))]
    pub async fn enroll(
        &self,
        subject_id: &str,
        required_count: RequiredCount,
        theme: &str,
        selection: &OrderedSelection,
    ) -> Result<CredentialRecord, CredentialError> {
        let record = Self::build_record(subject_id, required_count, theme, selection)?;
        self.store.insert(&record).await?;
        info!(required_count = %required_count, "graphical password enrolled");
        Ok(record)
    }

    /// Replace a subject's credential wholesale.
    ///
    /// # Errors
    /// Fails on an invalid theme, an invalid selection, or a store failure.
    #[instrument(skip(self, selection))]
    pub async fn reset(
        &self,
        subject_id: &str,
        required_count: RequiredCount,
        theme: &str,
        selection: &OrderedSelection,
    ) -> Result<CredentialRecord, CredentialError> {
        let record = Self::build_record(subject_id, required_count, theme, selection)?;
        self.store.put(&record).await?;
        info!(required_count = %required_count, "graphical password reset");
        Ok(record)
    }

    /// Grid parameters for a subject's next verification attempt.
    ///
    /// # Errors
    /// Returns `CredentialError::NotEnrolled` when the subject has no record.
    pub async fn challenge(&self, subject_id: &str) -> Result<Challenge, CredentialError> {
        let record = self.record(subject_id).await?;
        Ok(Challenge {
            required_count: record.required_count,
            theme: record.theme,
            grid_size: record.required_count.grid_size(),
        })
    }

    /// Check a submitted ordered pick against the stored commitment.
    ///
    /// A wrong sequence is `Ok(false)`.
    ///
    /// # Errors
    /// Fails when the subject is not enrolled, the pick has the wrong shape for
    /// the stored record, or the store is unavailable.
    #[instrument(skip(self, images))]
    pub async fn verify(
        &self,
        subject_id: &str,
        images: Vec<ImageReference>,
    ) -> Result<bool, CredentialError> {
        let record = self.record(subject_id).await?;
        let selection = OrderedSelection::new(images, record.required_count)?;
        let verified = codec::commit(&selection).matches(&record.digest);
        debug!(verified, "graphical password checked");
        Ok(verified)
    }

    async fn record(&self, subject_id: &str) -> Result<CredentialRecord, CredentialError> {
        self.store
            .get(subject_id)
            .await?
            .ok_or(CredentialError::NotEnrolled)
    }

    fn build_record(
        subject_id: &str,
        required_count: RequiredCount,
        theme: &str,
        selection: &OrderedSelection,
    ) -> Result<CredentialRecord, CredentialError> {
        let theme = validate_theme(theme)?;
        if selection.len() != required_count.get() {
            return Err(SelectionError::WrongLength {
                expected: required_count.get(),
                actual: selection.len(),
            }
            .into());
        }
        Ok(CredentialRecord {
            subject_id: subject_id.to_string(),
            required_count,
            theme,
            digest: codec::commit(selection),
        })
    }
}
