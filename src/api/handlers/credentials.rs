//! Graphical password endpoints for the authenticated subject.
//!
//! The client renders the grid and keeps the selection; these endpoints only see
//! the finalized ordered pick and never store it.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{credential_error, require_subject, selection_error, HandlerError};
use crate::{
    api::AppState,
    credential::{Challenge, CredentialRecord, ImageReference, OrderedSelection, RequiredCount},
};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EnrollRequest {
    /// 4 or 6
    pub required_count: u8,
    pub theme: String,
    /// The ordered pick; first selected image first.
    pub images: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Enrollment {
    pub required_count: u8,
    pub theme: String,
}

impl From<CredentialRecord> for Enrollment {
    fn from(record: CredentialRecord) -> Self {
        Self {
            required_count: record.required_count.into(),
            theme: record.theme,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyRequest {
    pub images: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Verification {
    pub verified: bool,
}

fn missing_payload() -> HandlerError {
    (StatusCode::BAD_REQUEST, "Missing payload".to_string())
}

fn ordered_selection(
    request: EnrollRequest,
) -> Result<(RequiredCount, String, OrderedSelection), HandlerError> {
    let required = RequiredCount::try_from(request.required_count)
        .map_err(|err| selection_error(&err))?;
    let images: Vec<ImageReference> = request.images;
    let selection =
        OrderedSelection::new(images, required).map_err(|err| selection_error(&err))?;
    Ok((required, request.theme, selection))
}

#[utoipa::path(
    get,
    path= "/v1/credentials",
    responses (
        (status = 200, description = "Grid parameters for a verification attempt", body = Challenge),
        (status = 401, description = "No authenticated subject"),
        (status = 404, description = "No graphical password enrolled"),
    ),
    tag= "credentials"
)]
#[instrument(skip(state, headers))]
pub async fn challenge(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HandlerError> {
    let subject = require_subject(&state, &headers)?;

    let challenge = state
        .credentials
        .challenge(&subject)
        .await
        .map_err(|err| credential_error(&err))?;

    Ok(Json(challenge))
}

#[utoipa::path(
    post,
    path= "/v1/credentials",
    request_body = EnrollRequest,
    responses (
        (status = 201, description = "Graphical password enrolled", body = Enrollment),
        (status = 400, description = "Invalid theme or payload"),
        (status = 401, description = "No authenticated subject"),
        (status = 409, description = "A graphical password is already set up"),
        (status = 422, description = "Selection has the wrong shape"),
    ),
    tag= "credentials"
)]
#[instrument(skip(state, headers, payload))]
pub async fn enroll(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<EnrollRequest>>,
) -> Result<impl IntoResponse, HandlerError> {
    let subject = require_subject(&state, &headers)?;
    let Some(Json(request)) = payload else {
        return Err(missing_payload());
    };
    let (required, theme, selection) = ordered_selection(request)?;

    let record = state
        .credentials
        .enroll(&subject, required, &theme, &selection)
        .await
        .map_err(|err| credential_error(&err))?;

    Ok((StatusCode::CREATED, Json(Enrollment::from(record))))
}

#[utoipa::path(
    put,
    path= "/v1/credentials",
    request_body = EnrollRequest,
    responses (
        (status = 200, description = "Graphical password replaced", body = Enrollment),
        (status = 400, description = "Invalid theme or payload"),
        (status = 401, description = "No authenticated subject"),
        (status = 422, description = "Selection has the wrong shape"),
    ),
    tag= "credentials"
)]
#[instrument(skip(state, headers, payload))]
pub async fn reset(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<EnrollRequest>>,
) -> Result<impl IntoResponse, HandlerError> {
    let subject = require_subject(&state, &headers)?;
    let Some(Json(request)) = payload else {
        return Err(missing_payload());
    };
    let (required, theme, selection) = ordered_selection(request)?;

    let record = state
        .credentials
        .reset(&subject, required, &theme, &selection)
        .await
        .map_err(|err| credential_error(&err))?;

    Ok(Json(Enrollment::from(record)))
}

#[utoipa::path(
    post,
    path= "/v1/credentials/verify",
    request_body = VerifyRequest,
    responses (
        (status = 200, description = "Whether the ordered pick matches", body = Verification),
        (status = 401, description = "No authenticated subject"),
        (status = 404, description = "No graphical password enrolled"),
        (status = 422, description = "Selection has the wrong shape"),
    ),
    tag= "credentials"
)]
#[instrument(skip(state, headers, payload))]
pub async fn verify(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<VerifyRequest>>,
) -> Result<impl IntoResponse, HandlerError> {
    let subject = require_subject(&state, &headers)?;
    let Some(Json(request)) = payload else {
        return Err(missing_payload());
    };

    let verified = state
        .credentials
        .verify(&subject, request.images)
        .await
        .map_err(|err| credential_error(&err))?;

    if !verified {
        info!("Graphical password mismatch");
    }

    Ok(Json(Verification { verified }))
}
