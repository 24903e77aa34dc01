//! HTTP错误映射

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use visitflow_core::VisitFlowError;

/// 接口层错误
#[derive(Debug)]
pub enum ApiError {
    /// 缺少或无法解析调用方身份
    Unauthorized(String),
    Core(VisitFlowError),
}

impl From<VisitFlowError> for ApiError {
    fn from(err: VisitFlowError) -> Self {
        ApiError::Core(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Core(err) => match err {
                VisitFlowError::Validation(_) => StatusCode::BAD_REQUEST,
                VisitFlowError::Forbidden(_) => StatusCode::FORBIDDEN,
                VisitFlowError::NotFound(_) => StatusCode::NOT_FOUND,
                VisitFlowError::Conflict(_) => StatusCode::CONFLICT,
                VisitFlowError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                VisitFlowError::InvalidState(_) => StatusCode::PRECONDITION_FAILED,
                VisitFlowError::Config(_)
                | VisitFlowError::Database(_)
                | VisitFlowError::Io(_)
                | VisitFlowError::Serialization(_)
                | VisitFlowError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Core(err) => err.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            ApiError::Unauthorized(msg) => msg.clone(),
            // 内部错误不向调用方暴露细节
            ApiError::Core(err) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!("Request failed: {}", err);
                "Server error".to_string()
            }
            ApiError::Core(err) => err.to_string(),
        };

        let body = Json(json!({
            "error": true,
            "kind": self.kind(),
            "message": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
