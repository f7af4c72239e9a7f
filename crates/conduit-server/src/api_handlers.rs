//! Axum handlers for the instance control plane.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

use conduit_instance_runtime::{
    CompletionAck, ExecutionEngine, InstanceRequest, InstancesResult, LifecycleAction,
    LifecycleDispatcher, RequestContext, RetryEscalationTrigger,
};

use super::api_errors::ApiError;
use super::api_models::{ApiEnvelope, ApiMeta, CompletionRequest, CompletionResponse, InstanceQuery};

pub struct ControlPlaneState<E: ExecutionEngine> {
    pub dispatcher: Arc<LifecycleDispatcher<E>>,
    pub trigger: Arc<RetryEscalationTrigger<E>>,
}

impl<E: ExecutionEngine> ControlPlaneState<E> {
    pub fn new(
        dispatcher: Arc<LifecycleDispatcher<E>>,
        trigger: Arc<RetryEscalationTrigger<E>>,
    ) -> Self {
        Self {
            dispatcher,
            trigger,
        }
    }
}

impl<E: ExecutionEngine> Clone for ControlPlaneState<E> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            trigger: self.trigger.clone(),
        }
    }
}

pub fn build_router<E: ExecutionEngine + 'static>(state: ControlPlaneState<E>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/v1/instances/running/:entity_type/:entity_name",
            get(running_instances::<E>),
        )
        .route(
            "/v1/instances/status/:entity_type/:entity_name",
            get(instance_status::<E>),
        )
        .route(
            "/v1/instances/kill/:entity_type/:entity_name",
            post(kill_instances::<E>),
        )
        .route(
            "/v1/instances/suspend/:entity_type/:entity_name",
            post(suspend_instances::<E>),
        )
        .route(
            "/v1/instances/resume/:entity_type/:entity_name",
            post(resume_instances::<E>),
        )
        .route(
            "/v1/instances/rerun/:entity_type/:entity_name",
            post(rerun_instances::<E>),
        )
        .route(
            "/v1/notifications/completion",
            post(completion_notification::<E>),
        )
        .layer(from_fn(request_log_middleware))
        .with_state(state)
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn request_context(headers: &HeaderMap, rid: &str) -> RequestContext {
    let mut ctx = RequestContext::new(rid);
    if let Some(requester) = header_value(headers, "x-requester") {
        ctx = ctx.with_requester(requester);
    }
    if let Some(forwarded) = header_value(headers, "x-forwarded-for") {
        ctx = ctx.with_remote_addr(forwarded);
    }
    ctx
}

async fn request_log_middleware(
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> axum::response::Response {
    let rid = request_id(&headers);
    log::info!(
        "control_plane_request request_id={} method={} path={}",
        rid,
        request.method(),
        request.uri().path()
    );
    next.run(request).await
}

fn instance_request(
    entity_type: String,
    entity_name: String,
    query: InstanceQuery,
) -> InstanceRequest {
    InstanceRequest {
        entity_type,
        entity_name,
        colo: query.colo.unwrap_or_default(),
        start: query.start,
        end: query.end,
        run_id: query.runid,
        payload: None,
    }
}

/// Decodes a properties payload without rejecting it: invalid UTF-8 sequences
/// become U+FFFD so the request still reaches the audit step.
fn properties_text(body: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    if text.trim().is_empty() {
        return None;
    }
    Some(text.into_owned())
}

fn envelope(rid: String, data: InstancesResult) -> Json<ApiEnvelope<InstancesResult>> {
    Json(ApiEnvelope {
        meta: ApiMeta::ok(),
        request_id: rid,
        data,
    })
}

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn running_instances<E: ExecutionEngine + 'static>(
    State(state): State<ControlPlaneState<E>>,
    Path((entity_type, entity_name)): Path<(String, String)>,
    Query(query): Query<InstanceQuery>,
    headers: HeaderMap,
) -> Result<Json<ApiEnvelope<InstancesResult>>, ApiError> {
    let rid = request_id(&headers);
    let req = instance_request(entity_type, entity_name, query);
    let result = state
        .dispatcher
        .running_instances(&req)
        .map_err(|e| ApiError::from(e).with_request_id(rid.clone()))?;
    Ok(envelope(rid, result))
}

pub async fn instance_status<E: ExecutionEngine + 'static>(
    State(state): State<ControlPlaneState<E>>,
    Path((entity_type, entity_name)): Path<(String, String)>,
    Query(query): Query<InstanceQuery>,
    headers: HeaderMap,
) -> Result<Json<ApiEnvelope<InstancesResult>>, ApiError> {
    let rid = request_id(&headers);
    let req = instance_request(entity_type, entity_name, query);
    let result = state
        .dispatcher
        .status(&req)
        .map_err(|e| ApiError::from(e).with_request_id(rid.clone()))?;
    Ok(envelope(rid, result))
}

fn apply_action<E: ExecutionEngine>(
    state: &ControlPlaneState<E>,
    action: LifecycleAction,
    path: (String, String),
    query: InstanceQuery,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Json<ApiEnvelope<InstancesResult>>, ApiError> {
    let rid = request_id(headers);
    let ctx = request_context(headers, &rid);
    let mut req = instance_request(path.0, path.1, query);
    req.payload = properties_text(&body);
    let result = state
        .dispatcher
        .apply(action, &ctx, &req)
        .map_err(|e| ApiError::from(e).with_request_id(rid.clone()))?;
    Ok(envelope(rid, result))
}

pub async fn kill_instances<E: ExecutionEngine + 'static>(
    State(state): State<ControlPlaneState<E>>,
    Path(path): Path<(String, String)>,
    Query(query): Query<InstanceQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiEnvelope<InstancesResult>>, ApiError> {
    apply_action(&state, LifecycleAction::Kill, path, query, &headers, body)
}

pub async fn suspend_instances<E: ExecutionEngine + 'static>(
    State(state): State<ControlPlaneState<E>>,
    Path(path): Path<(String, String)>,
    Query(query): Query<InstanceQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiEnvelope<InstancesResult>>, ApiError> {
    apply_action(&state, LifecycleAction::Suspend, path, query, &headers, body)
}

pub async fn resume_instances<E: ExecutionEngine + 'static>(
    State(state): State<ControlPlaneState<E>>,
    Path(path): Path<(String, String)>,
    Query(query): Query<InstanceQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiEnvelope<InstancesResult>>, ApiError> {
    apply_action(&state, LifecycleAction::Resume, path, query, &headers, body)
}

pub async fn rerun_instances<E: ExecutionEngine + 'static>(
    State(state): State<ControlPlaneState<E>>,
    Path(path): Path<(String, String)>,
    Query(query): Query<InstanceQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiEnvelope<InstancesResult>>, ApiError> {
    apply_action(&state, LifecycleAction::Rerun, path, query, &headers, body)
}

/// A `FAILED` completion answers 500 after the retry hand-off is queued.
pub async fn completion_notification<E: ExecutionEngine + 'static>(
    State(state): State<ControlPlaneState<E>>,
    headers: HeaderMap,
    Json(req): Json<CompletionRequest>,
) -> Result<(StatusCode, Json<CompletionResponse>), ApiError> {
    let rid = request_id(&headers);
    let notification = req.into_notification(Utc::now());
    match state.trigger.on_completion(&notification) {
        Ok(CompletionAck::Done) => Ok((
            StatusCode::OK,
            Json(CompletionResponse {
                result: CompletionAck::Done.as_str().to_string(),
            }),
        )),
        Err(failed) => Err(ApiError::from(failed).with_request_id(rid)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use chrono::{TimeZone, Utc};
    use conduit_entity::{Entity, EntityType, InMemoryEntityRegistry};
    use conduit_instance_runtime::{
        DelayedRetryQueue, InMemoryAuditLog, InMemoryExecutionEngine, Instance, InstanceStatus,
        LifecycleDispatcher, RetryEscalationTrigger, RetryPolicy, TemplateLogResolver,
    };
    use serde_json::Value;
    use tower::util::ServiceExt;

    use super::{build_router, ControlPlaneState};

    struct TestServer {
        router: Router,
        engine: Arc<InMemoryExecutionEngine>,
        audit: Arc<InMemoryAuditLog>,
        queue: Arc<DelayedRetryQueue<InMemoryExecutionEngine>>,
    }

    fn test_server() -> TestServer {
        let day = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
        let registry = InMemoryEntityRegistry::new();
        registry
            .register(
                Entity::new(EntityType::Process, "demo-process").with_cluster(
                    "east",
                    day(1),
                    Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
                ),
            )
            .unwrap();
        let engine = Arc::new(InMemoryExecutionEngine::with_instances(vec![
            Instance::new(
                EntityType::Process,
                "demo-process",
                "east",
                day(20),
                InstanceStatus::Running,
            )
            .with_workflow_id("wf-20"),
            Instance::new(
                EntityType::Process,
                "demo-process",
                "east",
                day(21),
                InstanceStatus::Failed,
            )
            .with_workflow_id("wf-21"),
        ]));
        let audit = Arc::new(InMemoryAuditLog::new());
        let queue = Arc::new(DelayedRetryQueue::new(RetryPolicy::default()));
        let dispatcher = LifecycleDispatcher::new(
            engine.clone(),
            Arc::new(registry),
            Arc::new(TemplateLogResolver::new("http://logs.test")),
            audit.clone(),
            ["corp"],
        );
        let trigger = RetryEscalationTrigger::new(engine.clone(), queue.clone());
        TestServer {
            router: build_router(ControlPlaneState::new(Arc::new(dispatcher), Arc::new(trigger))),
            engine,
            audit,
            queue,
        }
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let server = test_server();
        let req = Request::builder()
            .method(Method::GET)
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();
        let resp = server.router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn running_instances_returns_envelope() {
        let server = test_server();
        let req = Request::builder()
            .method(Method::GET)
            .uri("/v1/instances/running/process/demo-process?colo=corp")
            .header("x-request-id", "rid-running")
            .body(Body::empty())
            .unwrap();
        let resp = server.router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["request_id"], "rid-running");
        assert_eq!(json["meta"]["status"], "ok");
        assert_eq!(json["data"]["message"], "Running Instances");
        assert_eq!(json["data"]["instances"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn status_includes_log_urls() {
        let server = test_server();
        let req = Request::builder()
            .method(Method::GET)
            .uri("/v1/instances/status/process/demo-process?colo=corp&start=2024-01-20T00:00Z&end=2024-01-22T00:00Z&runid=1")
            .body(Body::empty())
            .unwrap();
        let resp = server.router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        let instances = json["data"]["instances"].as_array().unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(
            instances[1]["log_url"],
            "http://logs.test/east/process/demo-process/2024-01-21T00:00Z/default/1"
        );
    }

    #[tokio::test]
    async fn status_without_start_is_bad_request() {
        let server = test_server();
        let req = Request::builder()
            .method(Method::GET)
            .uri("/v1/instances/status/process/demo-process?colo=corp")
            .header("x-request-id", "rid-missing")
            .body(Body::empty())
            .unwrap();
        let resp = server.router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["request_id"], "rid-missing");
        assert_eq!(json["error"]["code"], "missing_parameter");
        assert_eq!(json["error"]["message"], "Parameter start is empty");
    }

    #[tokio::test]
    async fn kill_records_requester_and_applies_transition() {
        let server = test_server();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/v1/instances/kill/process/demo-process?colo=corp&start=2024-01-20T00:00Z")
            .header("x-request-id", "rid-kill")
            .header("x-requester", "ops-oncall")
            .body(Body::from("reason=maintenance\n"))
            .unwrap();
        let resp = server.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["data"]["message"], "KILL applied to 1 instance(s)");

        assert_eq!(server.engine.snapshot()[0].status, InstanceStatus::Killed);
        let records = server.audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].request_id, "rid-kill");
        assert_eq!(records[0].requester.as_deref(), Some("ops-oncall"));
    }

    #[tokio::test]
    async fn non_utf8_payload_is_still_audited_and_applied() {
        let server = test_server();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/v1/instances/kill/process/demo-process?colo=corp&start=2024-01-20T00:00Z")
            .header("x-request-id", "rid-latin1")
            .body(Body::from(vec![b'r', b'=', 0xE9, b'\n']))
            .unwrap();
        let resp = server.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["request_id"], "rid-latin1");
        assert_eq!(json["data"]["message"], "KILL applied to 1 instance(s)");

        let records = server.audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].request_id, "rid-latin1");
    }

    #[tokio::test]
    async fn non_utf8_payload_with_bad_dates_gets_error_envelope() {
        let server = test_server();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/v1/instances/suspend/process/demo-process?colo=corp&start=2024-03-05T00:00Z&end=2024-03-06T00:00Z")
            .header("x-request-id", "rid-bad-dates")
            .body(Body::from(vec![0xFF, 0xFE, b'=', b'x']))
            .unwrap();
        let resp = server.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["request_id"], "rid-bad-dates");
        assert_eq!(json["error"]["code"], "end_after_window");
        assert_eq!(server.audit.records().len(), 1);
    }

    #[test]
    fn properties_text_replaces_invalid_sequences() {
        assert_eq!(
            super::properties_text(&[b'r', b'=', 0xE9]).as_deref(),
            Some("r=\u{FFFD}")
        );
        assert_eq!(super::properties_text(b"  \n"), None);
        assert_eq!(super::properties_text(b""), None);
    }

    #[tokio::test]
    async fn cluster_entities_are_rejected() {
        let server = test_server();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/v1/instances/rerun/cluster/east?colo=corp&start=soon")
            .body(Body::empty())
            .unwrap();
        let resp = server.router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["error"]["code"], "invalid_entity_type");
        assert!(server.audit.records().is_empty());
    }

    #[tokio::test]
    async fn unknown_colo_is_bad_request() {
        let server = test_server();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/v1/instances/suspend/process/demo-process?colo=elsewhere&start=2024-01-20T00:00Z")
            .body(Body::empty())
            .unwrap();
        let resp = server.router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["error"]["code"], "unknown_colo");
    }

    #[tokio::test]
    async fn completion_notifications_ack_or_fail() {
        let server = test_server();
        let succeeded = Request::builder()
            .method(Method::POST)
            .uri("/v1/notifications/completion")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "process": "demo-process",
                    "nominal_time": "2024-01-20T00:00Z",
                    "status": "SUCCEEDED",
                    "workflow_id": "wf-20",
                    "run_id": "0"
                })
                .to_string(),
            ))
            .unwrap();
        let resp = server.router.clone().oneshot(succeeded).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!({ "result": "DONE" }));
        assert_eq!(server.queue.pending(), 0);

        let failed = Request::builder()
            .method(Method::POST)
            .uri("/v1/notifications/completion")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "process": "demo-process",
                    "nominal_time": "2024-01-21T00:00Z",
                    "status": "failed",
                    "workflow_id": "wf-21",
                    "run_id": "0"
                })
                .to_string(),
            ))
            .unwrap();
        let resp = server.router.clone().oneshot(failed).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert_eq!(json["error"]["code"], "instance_run_failed");
        assert_eq!(json["error"]["message"], "demo-process:2024-01-21T00:00Z Failed");
        assert_eq!(server.queue.pending(), 1);
    }
}
