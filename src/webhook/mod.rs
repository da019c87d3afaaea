//! Mutating Admission Webhook for secret injection
//!
//! The API server posts an AdmissionReview for every Pod creation to
//! `POST /mutate`. Opted-in Pods come back with a JSON patch; everything else
//! is admitted unchanged. Reviews posted to any other path are always
//! admitted without a patch.

pub mod pod;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::config::MutationConfig;
use crate::MUTATE_PATH;

pub use pod::{handle, AdmissionError, Route, WebhookError, JSON_CONTENT_TYPE};

/// Shared state for webhook handlers
///
/// Built once at startup and never mutated, so handlers share it without
/// locking.
#[derive(Clone, Debug)]
pub struct WebhookState {
    /// Injected container settings
    pub config: MutationConfig,
}

impl WebhookState {
    /// Create a new webhook state with the given mutation config
    pub fn new(config: MutationConfig) -> Self {
        Self { config }
    }
}

/// Create the webhook router
///
/// - `POST /mutate` - mutate Pods that opt in via labels
/// - `GET /healthz` - liveness probe
/// - anything else - admit without a patch
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(MUTATE_PATH, post(pod::mutate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .fallback(pod::passthrough_handler)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn router() -> Router {
        let config = MutationConfig::new("registry.example.com/secrets-init:1.0");
        webhook_router(Arc::new(WebhookState::new(config)))
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let request = Request::builder()
            .method("GET")
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();

        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn get_on_mutate_is_not_allowed() {
        let request = Request::builder()
            .method("GET")
            .uri("/mutate")
            .body(Body::empty())
            .unwrap();

        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn state_carries_config() {
        let state = WebhookState::new(MutationConfig::new("img"));
        assert_eq!(state.config.image, "img");
    }
}
