//! HTTP处理器

use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use visitflow_core::{Caller, VisitStatus};
use visitflow_workflow::{Decision, ProcessRequest, TriageStep};

type ApiResult<T> = Result<T, ApiError>;

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "VisitFlow API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "queue": "/api/queue",
            "triage": "/api/triage"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 审核请求体
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessBody {
    pub status: String,
    pub room_number: Option<String>,
    pub doctor_id: Option<Uuid>,
}

/// 状态更新请求体
#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

/// 分诊回答请求体
#[derive(Debug, Deserialize)]
pub struct AnswerBody {
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct NotesBody {
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct PriorityBody {
    pub priority: u8,
}

/// 加入队列（患者）
pub async fn join_queue(
    State(coordinator): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<impl IntoResponse> {
    let record = coordinator.join_queue(&caller).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// 查询排队状态（患者）
pub async fn queue_status(
    State(coordinator): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<impl IntoResponse> {
    let status = coordinator.get_status(&caller).await?;
    Ok(Json(json!({
        "queueEntry": status.record,
        "position": status.position
    })))
}

/// 待审核列表（服务台）
pub async fn pending_requests(
    State(coordinator): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(coordinator.list_pending(&caller).await?))
}

/// 批准或拒绝（服务台）
pub async fn process_request(
    State(coordinator): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(record_id): Path<Uuid>,
    Json(body): Json<ProcessBody>,
) -> ApiResult<impl IntoResponse> {
    let decision: Decision = body.status.parse()?;
    let request = ProcessRequest {
        decision,
        room_number: body.room_number,
        doctor_id: body.doctor_id,
    };

    Ok(Json(coordinator.process(&caller, record_id, request).await?))
}

/// 医生队列
pub async fn doctor_queue(
    State(coordinator): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(coordinator.doctor_queue(&caller).await?))
}

/// 更新就诊状态（医生）
pub async fn update_status(
    State(coordinator): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(record_id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> ApiResult<impl IntoResponse> {
    let status: VisitStatus = body.status.parse()?;
    Ok(Json(
        coordinator
            .update_consultation_status(&caller, record_id, status)
            .await?,
    ))
}

/// 更新备注（服务台）
pub async fn update_notes(
    State(coordinator): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(record_id): Path<Uuid>,
    Json(body): Json<NotesBody>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(coordinator.update_notes(&caller, record_id, &body.notes).await?))
}

/// 调整优先级（服务台）
pub async fn set_priority(
    State(coordinator): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(record_id): Path<Uuid>,
    Json(body): Json<PriorityBody>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(coordinator.set_priority(&caller, record_id, body.priority).await?))
}

/// 就诊历史（患者）
pub async fn visit_history(
    State(coordinator): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(coordinator.visit_history(&caller).await?))
}

/// 队列统计（服务台）
pub async fn queue_stats(
    State(coordinator): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(coordinator.queue_stats(&caller).await?))
}

/// 按ID查看记录（服务台、医生）
pub async fn get_record(
    State(coordinator): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(record_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(coordinator.get_record(&caller, record_id).await?))
}

/// 开始分诊（患者）
pub async fn start_triage(
    State(coordinator): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(record_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let question = coordinator.start_triage(&caller, record_id).await?;
    Ok(Json(json!({ "question": question })))
}

/// 提交分诊回答（患者）
pub async fn respond_triage(
    State(coordinator): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(record_id): Path<Uuid>,
    Json(body): Json<AnswerBody>,
) -> ApiResult<impl IntoResponse> {
    let step = coordinator
        .submit_triage_answer(&caller, record_id, &body.answer)
        .await?;

    let body = match step {
        TriageStep::Next { question } => json!({
            "question": question,
            "isComplete": false,
            "summary": null
        }),
        TriageStep::Complete { summary } => json!({
            "question": null,
            "isComplete": true,
            "summary": summary
        }),
    };
    Ok(Json(body))
}

/// 查看分诊摘要
pub async fn triage_summary(
    State(coordinator): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(record_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let report = coordinator.get_triage_summary(&caller, record_id).await?;
    Ok(Json(json!({
        "symptoms": report.symptom_history,
        "summary": report.summary
    })))
}
