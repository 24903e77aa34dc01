//! 调用方身份提取
//!
//! 认证由上游网关完成，这里只解析其写入的身份请求头，
//! 并把 `Caller` 放入请求扩展供处理器使用。

use crate::error::ApiError;
use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use uuid::Uuid;
use visitflow_core::{Caller, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// 从请求头解析调用方
pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, ApiError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let id = header(USER_ID_HEADER)
        .ok_or_else(|| ApiError::Unauthorized("Missing caller identity".to_string()))?;
    let id = Uuid::parse_str(id)
        .map_err(|_| ApiError::Unauthorized("Invalid caller identity".to_string()))?;

    let role = header(USER_ROLE_HEADER)
        .ok_or_else(|| ApiError::Unauthorized("Missing caller role".to_string()))?;
    let role: Role = role
        .parse()
        .map_err(|_| ApiError::Unauthorized(format!("Unknown caller role: {}", role)))?;

    Ok(Caller::new(id, role))
}

/// 身份中间件
pub async fn caller_middleware(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let caller = match caller_from_headers(request.headers()) {
        Ok(caller) => caller,
        Err(err) => {
            tracing::warn!("Rejected request to {}: {:?}", request.uri(), err);
            return Err(err);
        }
    };

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}
