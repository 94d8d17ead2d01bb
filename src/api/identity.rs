//! Subject resolution for credential endpoints.
//!
//! Primary authentication (email/password, sessions) happens upstream; the
//! gateway in front of this service forwards the authenticated subject id.

use axum::http::{HeaderMap, HeaderName};

pub trait IdentityProvider: Send + Sync {
    /// The authenticated subject of the request, if any.
    fn current_subject_id(&self, headers: &HeaderMap) -> Option<String>;
}

/// Reads the subject id from a header set by a trusted gateway.
#[derive(Clone, Debug)]
pub struct TrustedHeaderIdentity {
    header: HeaderName,
}

impl TrustedHeaderIdentity {
    #[must_use]
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl Default for TrustedHeaderIdentity {
    fn default() -> Self {
        Self::new(HeaderName::from_static("x-subject-id"))
    }
}

impl IdentityProvider for TrustedHeaderIdentity {
    fn current_subject_id(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
            .map(ToString::to_string)
    }
}
