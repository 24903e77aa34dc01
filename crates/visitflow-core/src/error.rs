//! 错误定义模块

use thiserror::Error;

/// VisitFlow系统统一错误类型
#[derive(Error, Debug)]
pub enum VisitFlowError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("冲突: {0}")]
    Conflict(String),

    #[error("权限错误: {0}")]
    Forbidden(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效状态: {0}")]
    InvalidState(String),

    #[error("无效状态转换: 从 {from} 经 {event}")]
    InvalidTransition { from: String, event: String },

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl VisitFlowError {
    /// 错误类别的稳定标识，供外部接口区分错误类型
    pub fn kind(&self) -> &'static str {
        match self {
            VisitFlowError::Config(_) => "config",
            VisitFlowError::Database(_) => "database",
            VisitFlowError::Io(_) => "io",
            VisitFlowError::Serialization(_) => "serialization",
            VisitFlowError::Validation(_) => "validation_error",
            VisitFlowError::Conflict(_) => "conflict",
            VisitFlowError::Forbidden(_) => "forbidden",
            VisitFlowError::NotFound(_) => "not_found",
            VisitFlowError::InvalidState(_) => "invalid_state",
            VisitFlowError::InvalidTransition { .. } => "invalid_transition",
            VisitFlowError::Internal(_) => "internal",
        }
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for VisitFlowError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => VisitFlowError::NotFound("row not found".to_string()),
            other => VisitFlowError::Database(other.to_string()),
        }
    }
}

/// VisitFlow系统统一结果类型
pub type Result<T> = std::result::Result<T, VisitFlowError>;
