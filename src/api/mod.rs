#![allow(clippy::needless_for_each)]

use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{credential::CredentialService, pipeline::Pipeline};

pub mod handlers;
pub mod identity;

use self::identity::IdentityProvider;

/// Shared, read-only state handed to every handler.
pub struct AppState {
    pub pipeline: Pipeline,
    pub credentials: CredentialService,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    #[must_use]
    pub fn new(
        pipeline: Pipeline,
        credentials: CredentialService,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            pipeline,
            credentials,
            identity,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::images::generate,
        handlers::credentials::challenge,
        handlers::credentials::enroll,
        handlers::credentials::reset,
        handlers::credentials::verify,
    ),
    components(
        schemas(
            handlers::health::Health,
            crate::pipeline::GenerationRequest,
            handlers::images::GeneratedImages,
            crate::credential::Challenge,
            handlers::credentials::EnrollRequest,
            handlers::credentials::Enrollment,
            handlers::credentials::VerifyRequest,
            handlers::credentials::Verification,
        )
    ),
    tags(
        (name = "pictogate", description = "Graphical image-sequence authentication API"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Build the application router with all routes and layers.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_origin(Any);

    Router::new()
        .route("/v1/images", post(handlers::generate))
        .route(
            "/v1/credentials",
            get(handlers::challenge)
                .post(handlers::enroll)
                .put(handlers::reset),
        )
        .route("/v1/credentials/verify", post(handlers::verify))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors),
        )
        .route("/health", get(handlers::health).options(handlers::health))
        .layer(Extension(state))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: Arc<AppState>) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", err);
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        api::identity::TrustedHeaderIdentity,
        credential::{CredentialStore, MemoryCredentialStore, StoreError},
        pipeline::{ImageGenerator, PipelineConfig, UpstreamFailure},
        pipeline::upstream::UpstreamFuture,
    };
    use axum::{
        body::to_bytes,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tower::ServiceExt;

    /// Returns `https://img.test/{n}.png` for variation `n`, or a fixed failure.
    struct FakeGenerator {
        failure: Option<UpstreamFailure>,
        calls: AtomicUsize,
    }

    impl ImageGenerator for FakeGenerator {
        fn generate<'a>(&'a self, prompt: &'a str) -> UpstreamFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = match &self.failure {
                Some(failure) => Err(failure.clone()),
                None => {
                    let variation = prompt
                        .split("variation ")
                        .nth(1)
                        .and_then(|rest| rest.split('.').next())
                        .unwrap_or("0")
                        .to_string();
                    Ok(format!("https://img.test/{variation}.png"))
                }
            };
            Box::pin(async move { result })
        }
    }

    /// Store whose backend is always down.
    struct DownStore;

    impl CredentialStore for DownStore {
        fn get<'a>(
            &'a self,
            _subject_id: &'a str,
        ) -> crate::credential::store::StoreFuture<'a, Option<crate::credential::CredentialRecord>>
        {
            Box::pin(async { Err(StoreError::Backend("down".to_string())) })
        }

        fn put<'a>(
            &'a self,
            _record: &'a crate::credential::CredentialRecord,
        ) -> crate::credential::store::StoreFuture<'a, ()> {
            Box::pin(async { Err(StoreError::Backend("down".to_string())) })
        }

        fn insert<'a>(
            &'a self,
            _record: &'a crate::credential::CredentialRecord,
        ) -> crate::credential::store::StoreFuture<'a, ()> {
            Box::pin(async { Err(StoreError::Backend("down".to_string())) })
        }

        fn ping(&self) -> crate::credential::store::StoreFuture<'_, ()> {
            Box::pin(async { Err(StoreError::Backend("down".to_string())) })
        }

        fn kind(&self) -> &'static str {
            "down"
        }
    }

    fn app_with(failure: Option<UpstreamFailure>, store: Arc<dyn CredentialStore>) -> Router {
        let generator = Arc::new(FakeGenerator {
            failure,
            calls: AtomicUsize::new(0),
        });
        let pipeline = Pipeline::new(
            generator,
            PipelineConfig::new()
                .with_batch_delay(Duration::ZERO)
                .with_backoff_unit(Duration::from_millis(1)),
        );
        router(Arc::new(AppState::new(
            pipeline,
            CredentialService::new(store),
            Arc::new(TrustedHeaderIdentity::default()),
        )))
    }

    fn app() -> Router {
        app_with(None, Arc::new(MemoryCredentialStore::new()))
    }

    fn json_request(method: &str, uri: &str, subject: Option<&str>, body: &Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(subject) = subject {
            builder = builder.header("x-subject-id", subject);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_store_and_app_header() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get("X-App")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("pictogate:")));
        let body = body_json(response).await;
        assert_eq!(body["name"], "pictogate");
        assert_eq!(body["store"], "memory");
        assert_eq!(body["store_status"], "ok");
    }

    #[tokio::test]
    async fn health_is_unavailable_when_store_is_down() {
        let response = app_with(None, Arc::new(DownStore))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["store_status"], "error");
    }

    #[tokio::test]
    async fn request_id_is_generated_and_propagated() {
        let response = app()
            .oneshot(
                json_request("POST", "/v1/images", None, &json!({"theme": "cats", "count": 1})),
            )
            .await
            .unwrap();

        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        assert!(request_id.is_some_and(|id| Ulid::from_string(&id).is_ok()));
    }

    #[tokio::test]
    async fn images_are_returned_in_order() {
        let response = app()
            .oneshot(json_request(
                "POST",
                "/v1/images",
                None,
                &json!({"theme": "farm animals", "count": 7}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let images: Vec<String> = serde_json::from_value(body["images"].clone()).unwrap();
        let expected: Vec<String> = (1..=7).map(|n| format!("https://img.test/{n}.png")).collect();
        assert_eq!(images, expected);
    }

    #[tokio::test]
    async fn image_errors_map_to_statuses() {
        let response = app()
            .oneshot(json_request(
                "POST",
                "/v1/images",
                None,
                &json!({"theme": "   ", "count": 4}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app()
            .oneshot(json_request(
                "POST",
                "/v1/images",
                None,
                &json!({"theme": "cats", "count": 41}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let cases = [
            (UpstreamFailure::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (UpstreamFailure::QuotaExhausted, StatusCode::PAYMENT_REQUIRED),
            (UpstreamFailure::Status(500), StatusCode::BAD_GATEWAY),
            (UpstreamFailure::Malformed, StatusCode::BAD_GATEWAY),
        ];
        for (failure, status) in cases {
            let response = app_with(Some(failure), Arc::new(MemoryCredentialStore::new()))
                .oneshot(json_request(
                    "POST",
                    "/v1/images",
                    None,
                    &json!({"theme": "cats", "count": 3}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), status);
        }
    }

    #[tokio::test]
    async fn upstream_details_are_not_leaked() {
        let response = app_with(
            Some(UpstreamFailure::Transport("dns error for gateway.internal".to_string())),
            Arc::new(MemoryCredentialStore::new()),
        )
        .oneshot(json_request(
            "POST",
            "/v1/images",
            None,
            &json!({"theme": "cats", "count": 1}),
        ))
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let text = body_text(response).await;
        assert!(!text.contains("gateway.internal"));
    }

    #[tokio::test]
    async fn missing_payload_is_bad_request() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/images")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn credential_endpoints_require_subject() {
        let response = app()
            .oneshot(Request::builder().uri("/v1/credentials").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app()
            .oneshot(json_request(
                "POST",
                "/v1/credentials/verify",
                None,
                &json!({"images": ["a", "b", "c", "d"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn enroll_challenge_verify_flow() {
        let app = app();
        let enroll = json!({
            "required_count": 4,
            "theme": "animals",
            "images": ["cat1", "dog2", "bird3", "fish4"]
        });

        let response = app
            .clone()
            .oneshot(json_request("POST", "/v1/credentials", Some("alice"), &enroll))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            body_json(response).await,
            json!({"required_count": 4, "theme": "animals"})
        );

        let response = app
            .clone()
            .oneshot(json_request("POST", "/v1/credentials", Some("alice"), &enroll))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/v1/credentials")
                    .header("x-subject-id", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"required_count": 4, "theme": "animals", "grid_size": 16})
        );

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/v1/credentials/verify",
                Some("alice"),
                &json!({"images": ["cat1", "dog2", "bird3", "fish4"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"verified": true}));

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/v1/credentials/verify",
                Some("alice"),
                &json!({"images": ["cat1", "dog2", "fish4", "bird3"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"verified": false}));

        let response = app
            .oneshot(json_request(
                "POST",
                "/v1/credentials/verify",
                Some("alice"),
                &json!({"images": ["cat1", "dog2"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn reset_replaces_credential() {
        let app = app();
        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/v1/credentials",
                Some("bob"),
                &json!({
                    "required_count": 6,
                    "theme": "ocean life",
                    "images": ["a", "b", "c", "d", "e", "f"]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(json_request(
                "POST",
                "/v1/credentials/verify",
                Some("bob"),
                &json!({"images": ["a", "b", "c", "d", "e", "f"]}),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await, json!({"verified": true}));
    }

    #[tokio::test]
    async fn enroll_validation_errors() {
        let cases = [
            (
                json!({"required_count": 5, "theme": "animals", "images": ["a", "b", "c", "d", "e"]}),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                json!({"required_count": 4, "theme": "animals", "images": ["a", "a", "c", "d"]}),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                json!({"required_count": 4, "theme": "<b>", "images": ["a", "b", "c", "d"]}),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (body, status) in cases {
            let response = app()
                .oneshot(json_request("POST", "/v1/credentials", Some("carol"), &body))
                .await
                .unwrap();
            assert_eq!(response.status(), status, "body {body}");
        }
    }

    #[tokio::test]
    async fn verify_without_enrollment_is_not_found() {
        let response = app()
            .oneshot(json_request(
                "POST",
                "/v1/credentials/verify",
                Some("dave"),
                &json!({"images": ["a", "b", "c", "d"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api-docs/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["paths"]["/v1/credentials/verify"].is_object());
        assert!(body["paths"]["/health"].is_object());
    }
}
