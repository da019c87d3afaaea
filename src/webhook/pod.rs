//! Pod Mutation Webhook
//!
//! Handles AdmissionReview requests for Pods, injecting the secrets volume,
//! init container and mounts when the Pod opts in.
//!
//! Transport problems (empty body, wrong content type, unencodable response)
//! are answered with an HTTP error status. Every admission-level problem is
//! answered with HTTP 200 and an AdmissionReview whose response carries the
//! message, because that is the only shape the API server understands.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use k8s_openapi::api::core::v1::Pod;
use kube::core::{
    admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, ConvertAdmissionReviewError},
    DynamicObject, TypeMeta,
};
use tracing::{debug, error, info, warn};

use super::WebhookState;
use crate::config::MutationConfig;
use crate::policy::{self, Outcome};

/// The only content type accepted for AdmissionReview bodies
pub const JSON_CONTENT_TYPE: &str = "application/json";

const POD_KIND: &str = "Pod";
const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";
const ADMISSION_GROUP: &str = "admission.k8s.io/";

/// Transport-level failures, answered with an HTTP error status
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The request carried no body
    #[error("empty body")]
    EmptyBody,

    /// The request body is not declared as JSON
    #[error("invalid Content-Type, expect `application/json`")]
    UnsupportedContentType(String),

    /// The response AdmissionReview could not be encoded
    #[error("could not encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::EmptyBody => StatusCode::BAD_REQUEST,
            WebhookError::UnsupportedContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            WebhookError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

/// Admission-level failures, reported inside the AdmissionReview
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// The body is not an AdmissionReview
    #[error("could not decode admission review: {0}")]
    Decode(#[source] serde_json::Error),

    /// The AdmissionReview has no request
    #[error("invalid admission review: {0}")]
    InvalidReview(#[from] ConvertAdmissionReviewError),

    /// The embedded object is not a valid Pod
    #[error("could not unmarshal pod: {0}")]
    Unmarshal(#[source] serde_json::Error),

    /// The patch could not be serialized
    #[error("could not serialize patch: {0}")]
    Serialization(String),
}

/// Which behaviour a request path maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Mutate opted-in Pods
    Mutate,
    /// Admit everything without a patch
    Passthrough,
}

/// Handle `POST /mutate`
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond(&state, Route::Mutate, &headers, &body)
}

/// Handle reviews posted to any unrecognised path
pub async fn passthrough_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond(&state, Route::Passthrough, &headers, &body)
}

fn respond(state: &WebhookState, route: Route, headers: &HeaderMap, body: &[u8]) -> Response {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

    match handle(&state.config, route, content_type, body) {
        Ok(bytes) => ([(CONTENT_TYPE, JSON_CONTENT_TYPE)], bytes).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Turn a raw AdmissionReview body into a raw AdmissionReview response
///
/// Only transport failures are returned as errors. Decode failures still
/// produce a response envelope, denying the request explicitly.
pub fn handle(
    config: &MutationConfig,
    route: Route,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Vec<u8>, WebhookError> {
    if body.is_empty() {
        warn!("Empty body in admission request");
        return Err(WebhookError::EmptyBody);
    }

    if content_type != Some(JSON_CONTENT_TYPE) {
        warn!(
            content_type = content_type.unwrap_or_default(),
            "Unsupported Content-Type, expect application/json"
        );
        return Err(WebhookError::UnsupportedContentType(
            content_type.unwrap_or_default().to_string(),
        ));
    }

    let review = admit(config, route, body);
    let bytes = serde_json::to_vec(&review).map_err(|e| {
        error!(error = %e, "Failed to encode admission response");
        WebhookError::Encode(e)
    })?;

    Ok(bytes)
}

/// Produce the response AdmissionReview for a non-empty JSON body
fn admit(config: &MutationConfig, route: Route, body: &[u8]) -> AdmissionReview<DynamicObject> {
    let request = match decode(body) {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Failed to decode admission review");
            let raw = RawEnvelope::parse(body);
            let mut response = AdmissionResponse::invalid(e.to_string());
            if let Some(uid) = raw.uid {
                response.uid = uid;
            }
            let mut review = response.into_review();
            if let Some(api_version) = raw.api_version {
                review.types = TypeMeta {
                    api_version,
                    kind: ADMISSION_REVIEW_KIND.to_string(),
                };
            }
            return review;
        }
    };

    let response = match route {
        Route::Mutate => mutate(config, &request),
        Route::Passthrough => {
            debug!(uid = %request.uid, "Review outside the mutate route, allowing unchanged");
            AdmissionResponse::from(&request)
        }
    };

    response.into_review()
}

fn decode(body: &[u8]) -> Result<AdmissionRequest<DynamicObject>, AdmissionError> {
    let review: AdmissionReview<DynamicObject> =
        serde_json::from_slice(body).map_err(AdmissionError::Decode)?;
    Ok(review.try_into()?)
}

/// Correlation fields salvaged from a body that failed to decode as a review
#[derive(Debug, Default, PartialEq)]
struct RawEnvelope {
    uid: Option<String>,
    api_version: Option<String>,
}

impl RawEnvelope {
    fn parse(body: &[u8]) -> Self {
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
            return Self::default();
        };
        let field = |pointer: &str| {
            value
                .pointer(pointer)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        Self {
            uid: field("/request/uid"),
            api_version: field("/apiVersion").filter(|v| v.starts_with(ADMISSION_GROUP)),
        }
    }
}

/// Process a single review on the mutate route
fn mutate(config: &MutationConfig, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let uid = &request.uid;
    let response = AdmissionResponse::from(request);

    info!(
        uid = %uid,
        kind = %request.kind.kind,
        namespace = ?request.namespace,
        operation = ?request.operation,
        user = ?request.user_info.username,
        "AdmissionReview received"
    );

    if request.kind.kind != POD_KIND {
        debug!(uid = %uid, kind = %request.kind.kind, "Not a Pod, allowing unchanged");
        return response;
    }

    let Some(object) = &request.object else {
        debug!(uid = %uid, "No pod object in request, allowing unchanged");
        return response;
    };

    let pod = match pod_from_object(object) {
        Ok(pod) => pod,
        Err(e) => {
            error!(uid = %uid, error = %e, "Could not unmarshal raw object");
            return response.deny(e.to_string());
        }
    };

    match policy::decide(&pod, config) {
        Outcome::NoMutation => response,
        Outcome::Mutate(patch) => {
            let ops = patch.0.len();
            match response.clone().with_patch(patch) {
                Ok(patched) => {
                    info!(
                        uid = %uid,
                        pod = ?pod.metadata.name,
                        patch_ops = ops,
                        "Injecting secrets into pod"
                    );
                    patched
                }
                Err(e) => {
                    let e = AdmissionError::Serialization(e.to_string());
                    error!(uid = %uid, error = %e, "Failed to serialize patch");
                    response.deny(e.to_string())
                }
            }
        }
        Outcome::Failure(message) => {
            error!(uid = %uid, error = %message, "Failed to build patch");
            response.deny(message)
        }
    }
}

fn pod_from_object(object: &DynamicObject) -> Result<Pod, AdmissionError> {
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(AdmissionError::Unmarshal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const UID: &str = "705ab4f5-6393-11e8-b7cc-42010a800002";

    fn config() -> MutationConfig {
        MutationConfig::new("registry.example.com/secrets-init:1.0")
    }

    fn review(kind: &str, object: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": UID,
                "kind": {"group": "", "version": "v1", "kind": kind},
                "resource": {"group": "", "version": "v1", "resource": "pods"},
                "name": "app",
                "namespace": "default",
                "operation": "CREATE",
                "userInfo": {"username": "system:serviceaccount:kube-system:replicaset-controller"},
                "object": object,
                "oldObject": null,
                "dryRun": false
            }
        }))
        .unwrap()
    }

    fn pod_json(labels: Value) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "app", "namespace": "default", "labels": labels},
            "spec": {"containers": [{"name": "app", "image": "nginx:1.27"}]}
        })
    }

    fn run(route: Route, body: &[u8]) -> Value {
        let bytes = handle(&config(), route, Some(JSON_CONTENT_TYPE), body).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// kube serializes the patch bytes as a JSON array of numbers
    fn decoded_patch(response: &Value) -> Value {
        let bytes: Vec<u8> =
            serde_json::from_value(response["response"]["patch"].clone()).expect("patch present");
        serde_json::from_slice(&bytes).unwrap()
    }

    // =========================================================================
    // Transport
    // =========================================================================

    #[test]
    fn empty_body_is_rejected() {
        let err = handle(&config(), Route::Mutate, Some(JSON_CONTENT_TYPE), b"").unwrap_err();
        assert!(matches!(err, WebhookError::EmptyBody));
        assert_eq!(err.to_string(), "empty body");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn wrong_content_type_is_rejected() {
        let body = review("Pod", pod_json(json!({})));
        let err = handle(&config(), Route::Mutate, Some("text/plain"), &body).unwrap_err();
        assert!(matches!(err, WebhookError::UnsupportedContentType(ref ct) if ct == "text/plain"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }

    #[test]
    fn missing_content_type_is_rejected() {
        let body = review("Pod", pod_json(json!({})));
        let err = handle(&config(), Route::Mutate, None, &body).unwrap_err();
        assert!(matches!(err, WebhookError::UnsupportedContentType(_)));
    }

    #[test]
    fn encode_error_maps_to_internal_server_error() {
        let err = WebhookError::Encode(serde_json::from_str::<()>("invalid").unwrap_err());
        assert!(err.to_string().contains("could not encode response"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    // =========================================================================
    // Admission outcomes
    // =========================================================================

    #[test]
    fn unlabelled_pod_is_allowed_without_patch() {
        let response = run(Route::Mutate, &review("Pod", pod_json(json!({"app": "web"}))));

        assert_eq!(response["kind"], "AdmissionReview");
        assert_eq!(response["response"]["uid"], UID);
        assert_eq!(response["response"]["allowed"], true);
        assert!(response["response"].get("patch").is_none());
    }

    #[test]
    fn labelled_pod_gets_json_patch() {
        let body = review("Pod", pod_json(json!({"secrets-injector-key": "db-creds"})));
        let response = run(Route::Mutate, &body);

        assert_eq!(response["response"]["uid"], UID);
        assert_eq!(response["response"]["allowed"], true);
        assert_eq!(response["response"]["patchType"], "JSONPatch");

        let patch = decoded_patch(&response);
        let ops = patch.as_array().unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0]["path"], "/spec/volumes");
        assert_eq!(ops[1]["path"], "/spec/initContainers");
        assert_eq!(ops[2]["path"], "/spec/containers");
    }

    #[test]
    fn other_kinds_are_allowed_unchanged() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cm", "labels": {"secrets-injector-key": "db-creds"}},
            "data": {"k": "v"}
        });
        let response = run(Route::Mutate, &review("ConfigMap", object));

        assert_eq!(response["response"]["allowed"], true);
        assert!(response["response"].get("patch").is_none());
    }

    #[test]
    fn passthrough_route_never_patches() {
        let body = review("Pod", pod_json(json!({"secrets-injector-key": "db-creds"})));
        let response = run(Route::Passthrough, &body);

        assert_eq!(response["response"]["uid"], UID);
        assert_eq!(response["response"]["allowed"], true);
        assert!(response["response"].get("patch").is_none());
    }

    #[test]
    fn malformed_pod_is_denied_with_message() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "app", "labels": {"secrets-injector-key": "db-creds"}},
            "spec": {"containers": "not-a-list"}
        });
        let response = run(Route::Mutate, &review("Pod", object));

        assert_eq!(response["response"]["uid"], UID);
        assert_eq!(response["response"]["allowed"], false);
        let message = response["response"]["status"]["message"].as_str().unwrap();
        assert!(message.contains("could not unmarshal pod"));
    }

    /// Story: garbage bodies still get a well-formed, denying envelope
    #[test]
    fn story_undecodable_body_is_denied_in_envelope() {
        let response = run(Route::Mutate, b"{not json");

        assert!(response["apiVersion"]
            .as_str()
            .unwrap()
            .starts_with("admission.k8s.io/"));
        assert_eq!(response["kind"], "AdmissionReview");
        assert_eq!(response["response"]["allowed"], false);
        let message = response["response"]["status"]["message"].as_str().unwrap();
        assert!(message.contains("could not decode admission review"));
    }

    #[test]
    fn review_without_request_is_denied() {
        let body = br#"{"apiVersion":"admission.k8s.io/v1","kind":"AdmissionReview"}"#;
        let response = run(Route::Mutate, body);

        assert_eq!(response["response"]["allowed"], false);
        assert!(response["response"]["status"]["message"]
            .as_str()
            .unwrap()
            .contains("invalid admission review"));
    }

    #[test]
    fn uid_is_recovered_from_partially_valid_review() {
        let body = serde_json::to_vec(&json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {"uid": UID, "kind": "not-an-object"}
        }))
        .unwrap();
        let response = run(Route::Mutate, &body);

        assert_eq!(response["apiVersion"], "admission.k8s.io/v1");
        assert_eq!(response["response"]["uid"], UID);
        assert_eq!(response["response"]["allowed"], false);
    }

    #[test]
    fn raw_envelope_tolerates_garbage() {
        assert_eq!(RawEnvelope::parse(b"nope"), RawEnvelope::default());
        assert_eq!(RawEnvelope::parse(br#"{"request":{}}"#), RawEnvelope::default());

        let raw = RawEnvelope::parse(
            br#"{"apiVersion":"admission.k8s.io/v1beta1","request":{"uid":"abc"}}"#,
        );
        assert_eq!(raw.uid.as_deref(), Some("abc"));
        assert_eq!(raw.api_version.as_deref(), Some("admission.k8s.io/v1beta1"));

        // Foreign apiVersions are not echoed back
        let raw = RawEnvelope::parse(br#"{"apiVersion":"v1"}"#);
        assert_eq!(raw.api_version, None);
    }

    #[test]
    fn admission_error_messages() {
        let err = AdmissionError::Serialization("boom".to_string());
        assert_eq!(err.to_string(), "could not serialize patch: boom");

        let err = AdmissionError::Unmarshal(serde_json::from_str::<()>("x").unwrap_err());
        assert!(err.to_string().starts_with("could not unmarshal pod"));
    }
}
