use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

use super::generation_error;
use crate::{
    api::AppState,
    pipeline::{GenerationError, GenerationRequest},
};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct GeneratedImages {
    pub images: Vec<String>,
}

#[utoipa::path(
    post,
    path= "/v1/images",
    request_body = GenerationRequest,
    responses (
        (status = 200, description = "Every requested image, in submission order", body = GeneratedImages),
        (status = 400, description = "Theme or count is invalid"),
        (status = 402, description = "Image service credits are exhausted"),
        (status = 429, description = "Image service is rate limiting, try again later"),
        (status = 502, description = "Image service failed"),
    ),
    tag= "images"
)]
#[instrument(skip(state, payload))]
pub async fn generate(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<GenerationRequest>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let Some(Json(request)) = payload else {
        return Err(generation_error(&GenerationError::InvalidRequest(
            "Missing payload".to_string(),
        )));
    };

    let result = state.pipeline.generate(&request).await.map_err(|err| {
        error!("Image generation failed: {}", err);
        generation_error(&err)
    })?;

    Ok(Json(GeneratedImages {
        images: result.into_images(),
    }))
}
