//! Web服务器

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use visitflow_core::Result;
use visitflow_workflow::VisitCoordinator;

use crate::auth::caller_middleware;
use crate::handlers::{
    api_root, doctor_queue, get_record, health, join_queue, pending_requests, process_request,
    queue_stats, queue_status, respond_triage, set_priority, start_triage, triage_summary,
    update_notes, update_status, visit_history,
};

/// 处理器共享状态
pub type AppState = Arc<VisitCoordinator>;

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, coordinator: AppState) -> Self {
        let app = create_app(coordinator);
        Self { addr, app }
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app).await?;

        Ok(())
    }
}

/// 构建完整路由
pub fn create_app(state: AppState) -> Router {
    Router::new()
        // 根路径
        .route("/", get(api_root))

        // 健康检查
        .route("/health", get(health))

        // 需要调用方身份的路由
        .nest("/api/queue", queue_routes())
        .nest("/api/triage", triage_routes())

        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

/// 排队路由
fn queue_routes() -> Router<AppState> {
    Router::new()
        .route("/request", post(join_queue))
        .route("/status", get(queue_status))
        .route("/pending", get(pending_requests))
        .route("/doctor-queue", get(doctor_queue))
        .route("/history", get(visit_history))
        .route("/stats", get(queue_stats))
        .route("/records/:id", get(get_record))
        .route("/:id/process", put(process_request))
        .route("/:id/status", put(update_status))
        .route("/:id/notes", put(update_notes))
        .route("/:id/priority", put(set_priority))
        .route_layer(middleware::from_fn(caller_middleware))
}

/// 分诊路由
fn triage_routes() -> Router<AppState> {
    Router::new()
        .route("/start/:id", post(start_triage))
        .route("/respond/:id", post(respond_triage))
        .route("/summary/:id", get(triage_summary))
        .route_layer(middleware::from_fn(caller_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{USER_ID_HEADER, USER_ROLE_HEADER};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;
    use visitflow_store::InMemoryVisitStore;

    fn app() -> Router {
        let store = Arc::new(InMemoryVisitStore::new());
        create_app(Arc::new(VisitCoordinator::new(store)))
    }

    fn request(method: Method, uri: &str, caller: Option<(Uuid, &str)>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = caller {
            builder = builder
                .header(USER_ID_HEADER, id.to_string())
                .header(USER_ROLE_HEADER, role);
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health_needs_no_identity() {
        let app = app();
        let (status, body) = send(&app, request(Method::GET, "/health", None, None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let app = app();
        let (status, body) =
            send(&app, request(Method::POST, "/api/queue/request", None, None)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "unauthorized");
    }

    #[tokio::test]
    async fn test_join_twice_conflicts() {
        let app = app();
        let patient = Uuid::new_v4();

        let (status, body) = send(
            &app,
            request(Method::POST, "/api/queue/request", Some((patient, "patient")), None),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "pending");

        let (status, body) = send(
            &app,
            request(Method::POST, "/api/queue/request", Some((patient, "patient")), None),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "conflict");
    }

    #[tokio::test]
    async fn test_role_gating() {
        let app = app();
        let (status, _) = send(
            &app,
            request(Method::GET, "/api/queue/pending", Some((Uuid::new_v4(), "patient")), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            request(Method::GET, "/api/queue/pending", Some((Uuid::new_v4(), "helpdesk")), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_status_without_visit_is_not_found() {
        let app = app();
        let (status, _) = send(
            &app,
            request(Method::GET, "/api/queue/status", Some((Uuid::new_v4(), "patient")), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_full_visit_over_http() {
        let app = app();
        let patient = Uuid::new_v4();
        let staff = Uuid::new_v4();
        let doctor = Uuid::new_v4();

        let (_, record) = send(
            &app,
            request(Method::POST, "/api/queue/request", Some((patient, "patient")), None),
        )
        .await;
        let id = record["id"].as_str().unwrap().to_string();

        // 非法决定
        let (status, _) = send(
            &app,
            request(
                Method::PUT,
                &format!("/api/queue/{}/process", id),
                Some((staff, "staff")),
                Some(json!({ "status": "maybe" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            request(
                Method::PUT,
                &format!("/api/queue/{}/process", id),
                Some((staff, "staff")),
                Some(json!({
                    "status": "approved",
                    "roomNumber": "101",
                    "doctorId": doctor.to_string()
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "approved");
        assert_eq!(body["roomNumber"], "101");
        assert_eq!(body["assignedDoctorId"], doctor.to_string());

        let (_, body) = send(
            &app,
            request(Method::GET, "/api/queue/status", Some((patient, "patient")), None),
        )
        .await;
        assert_eq!(body["position"], 1);
        assert_eq!(body["queueEntry"]["status"], "approved");

        let (status, body) = send(
            &app,
            request(
                Method::POST,
                &format!("/api/triage/start/{}", id),
                Some((patient, "patient")),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["question"]["text"].is_string());

        let mut last = Value::Null;
        for answer in ["Headache", "1-3 days", "Moderate", "No", "None of the above"] {
            let (status, body) = send(
                &app,
                request(
                    Method::POST,
                    &format!("/api/triage/respond/{}", id),
                    Some((patient, "patient")),
                    Some(json!({ "answer": answer })),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            last = body;
        }
        assert_eq!(last["isComplete"], true);
        assert_eq!(last["summary"]["primarySymptom"], "Headache");

        let (status, _) = send(
            &app,
            request(
                Method::POST,
                &format!("/api/triage/respond/{}", id),
                Some((patient, "patient")),
                Some(json!({ "answer": "again" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);

        let (_, queue) = send(
            &app,
            request(Method::GET, "/api/queue/doctor-queue", Some((doctor, "doctor")), None),
        )
        .await;
        assert_eq!(queue.as_array().unwrap().len(), 1);

        // 医生不能把状态改回 waiting
        let (status, _) = send(
            &app,
            request(
                Method::PUT,
                &format!("/api/queue/{}/status", id),
                Some((doctor, "doctor")),
                Some(json!({ "status": "waiting" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        for next in ["with_doctor", "completed"] {
            let (status, body) = send(
                &app,
                request(
                    Method::PUT,
                    &format!("/api/queue/{}/status", id),
                    Some((doctor, "doctor")),
                    Some(json!({ "status": next })),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], next);
        }

        let (status, body) = send(
            &app,
            request(
                Method::GET,
                &format!("/api/triage/summary/{}", id),
                Some((doctor, "doctor")),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symptoms"].as_array().unwrap().len(), 5);

        let (_, history) = send(
            &app,
            request(Method::GET, "/api/queue/history", Some((patient, "patient")), None),
        )
        .await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert!(history[0]["consultationEndTime"].is_string());

        let (status, stats) = send(
            &app,
            request(Method::GET, "/api/queue/stats", Some((staff, "staff")), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["totalRecords"], 1);
        assert_eq!(stats["activeVisits"], 0);
        assert_eq!(stats["countsByStatus"]["completed"], 1);
    }
}
