pub mod credentials;
pub use self::credentials::{challenge, enroll, reset, verify};

pub mod health;
pub use self::health::health;

pub mod images;
pub use self::images::generate;

// common functions for the handlers
use axum::http::{HeaderMap, StatusCode};
use tracing::error;

use crate::{
    api::AppState,
    credential::{CredentialError, SelectionError},
    pipeline::GenerationError,
};

pub type HandlerError = (StatusCode, String);

/// Resolve the authenticated subject or fail with 401.
///
/// # Errors
/// Returns `401 Unauthorized` when the gateway did not forward a subject id.
pub fn require_subject(state: &AppState, headers: &HeaderMap) -> Result<String, HandlerError> {
    state.identity.current_subject_id(headers).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            "Authentication required".to_string(),
        )
    })
}

#[must_use]
pub fn generation_error(err: &GenerationError) -> HandlerError {
    let status = match err {
        GenerationError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        GenerationError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        GenerationError::QuotaExhausted => StatusCode::PAYMENT_REQUIRED,
        GenerationError::UpstreamError => StatusCode::BAD_GATEWAY,
    };
    (status, err.user_message())
}

#[must_use]
pub fn credential_error(err: &CredentialError) -> HandlerError {
    match err {
        CredentialError::InvalidTheme => (StatusCode::BAD_REQUEST, err.to_string()),
        CredentialError::NotEnrolled => (StatusCode::NOT_FOUND, err.to_string()),
        CredentialError::AlreadyEnrolled => (StatusCode::CONFLICT, err.to_string()),
        CredentialError::Selection(selection) => selection_error(selection),
        CredentialError::Store(store) => {
            error!("Credential store failure: {}", store);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Credential store unavailable, please try again later".to_string(),
            )
        }
    }
}

#[must_use]
pub fn selection_error(err: &SelectionError) -> HandlerError {
    (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StoreError;

    #[test]
    fn generation_errors_map_to_statuses() {
        let cases = [
            (
                GenerationError::InvalidRequest("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (GenerationError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (GenerationError::QuotaExhausted, StatusCode::PAYMENT_REQUIRED),
            (GenerationError::UpstreamError, StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(generation_error(&err).0, status);
        }
        assert_eq!(
            generation_error(&GenerationError::InvalidRequest("bad".to_string())).1,
            "bad"
        );
    }

    #[test]
    fn credential_errors_map_to_statuses() {
        assert_eq!(
            credential_error(&CredentialError::NotEnrolled).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            credential_error(&CredentialError::AlreadyEnrolled).0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            credential_error(&CredentialError::InvalidTheme).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            credential_error(&CredentialError::Selection(SelectionError::Duplicate {
                position: 2
            }))
            .0,
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let (status, message) = credential_error(&CredentialError::Store(StoreError::Backend(
            "connection refused on 10.0.0.7".to_string(),
        )));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!message.contains("10.0.0.7"));
    }
}
