//! # VisitFlow Web模块
//!
//! 以HTTP接口暴露就诊流程协调器的各项操作。
//! 调用方身份由上游认证层通过请求头传入。

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

pub use auth::{caller_middleware, USER_ID_HEADER, USER_ROLE_HEADER};
pub use error::ApiError;
pub use server::{create_app, AppState, WebServer};
