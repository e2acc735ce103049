//! HTTP surface for docflow.
//!
//! A compact Axum router delivering upload events to the pipelines:
//!
//! - `POST /events/mask` – Mask PII in the uploaded document and write it under `masked/`.
//! - `POST /events/summarize` – Summarize the uploaded document and write it under `summaries/`.
//! - `GET /metrics` – Observe document, chunk and completion-call counters.
//! - `GET /health` – Liveness probe.
//!
//! Event routes answer with the invocation result (`{"statusCode", "body"}`) and mirror its
//! status code on the HTTP response, so event sources can retry on 500.

use crate::handler::{InvocationApi, InvocationResult, UploadEvent};
use crate::metrics::MetricsSnapshot;
use crate::processing::PipelineKind;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;

/// Build the HTTP router exposing the event API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: InvocationApi + 'static,
{
    Router::new()
        .route("/events/mask", post(mask_event::<S>))
        .route("/events/summarize", post(summarize_event::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/health", get(health))
        .with_state(service)
}

async fn mask_event<S>(
    State(service): State<Arc<S>>,
    Json(event): Json<UploadEvent>,
) -> InvocationResponse
where
    S: InvocationApi,
{
    InvocationResponse(service.handle(PipelineKind::Mask, &event).await)
}

async fn summarize_event<S>(
    State(service): State<Arc<S>>,
    Json(event): Json<UploadEvent>,
) -> InvocationResponse
where
    S: InvocationApi,
{
    InvocationResponse(service.handle(PipelineKind::Summarize, &event).await)
}

/// Return a snapshot of the pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: InvocationApi,
{
    Json(service.metrics_snapshot())
}

async fn health() -> &'static str {
    "ok"
}

struct InvocationResponse(InvocationResult);

impl IntoResponse for InvocationResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::handler::{InvocationApi, InvocationResult, UploadEvent};
    use crate::metrics::MetricsSnapshot;
    use crate::processing::PipelineKind;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Clone)]
    struct StubInvocationService {
        calls: Arc<Mutex<Vec<(PipelineKind, UploadEvent)>>>,
        result: InvocationResult,
    }

    impl StubInvocationService {
        fn new(result: InvocationResult) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                result,
            }
        }

        async fn recorded_calls(&self) -> Vec<(PipelineKind, UploadEvent)> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl InvocationApi for StubInvocationService {
        async fn handle(&self, kind: PipelineKind, event: &UploadEvent) -> InvocationResult {
            self.calls.lock().await.push((kind, event.clone()));
            self.result.clone()
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_processed: 3,
                documents_failed: 1,
                chunks_processed: 7,
                completion_calls: 9,
            }
        }
    }

    fn event_request(path: &str) -> Request<Body> {
        let payload = json!({
            "Records": [{
                "s3": {
                    "bucket": { "name": "uploads" },
                    "object": { "key": "documents/report.pdf" }
                }
            }]
        });
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    #[tokio::test]
    async fn summarize_route_forwards_event() {
        let service = Arc::new(StubInvocationService::new(InvocationResult::success(
            "Summary created successfully!",
        )));
        let app = create_router(service.clone());

        let response = app
            .oneshot(event_request("/events/summarize"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["body"], "Summary created successfully!");

        let calls = service.recorded_calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, PipelineKind::Summarize);
        assert_eq!(calls[0].1.location(), Some(("uploads", "documents/report.pdf")));
    }

    #[tokio::test]
    async fn failed_invocation_maps_to_server_error() {
        let service = Arc::new(StubInvocationService::new(InvocationResult::failure(
            "Error calling OCR service",
        )));
        let app = create_router(service.clone());

        let response = app
            .oneshot(event_request("/events/mask"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert_eq!(json["body"], "Error calling OCR service");
        assert_eq!(service.recorded_calls().await[0].0, PipelineKind::Mask);
    }

    #[tokio::test]
    async fn metrics_route_reports_snapshot() {
        let service = Arc::new(StubInvocationService::new(InvocationResult::success("ok")));
        let app = create_router(service);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["documents_processed"], 3);
        assert_eq!(json["completion_calls"], 9);
    }

    #[tokio::test]
    async fn health_route_answers_ok() {
        let service = Arc::new(StubInvocationService::new(InvocationResult::success("ok")));
        let app = create_router(service);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        assert_eq!(&body[..], b"ok");
    }
}
