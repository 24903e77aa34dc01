//! # VisitFlow存储模块
//!
//! 负责就诊记录的持久化，提供按ID读写、按患者/状态/医生查询，
//! 以及基于状态与版本号的条件写入（乐观并发控制）。

pub mod memory;
#[cfg(feature = "postgres")]
pub mod models;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod store;

// 重新导出主要类型
pub use memory::InMemoryVisitStore;
#[cfg(feature = "postgres")]
pub use postgres::PgVisitStore;
pub use store::{Expected, SharedVisitStore, VisitFilter, VisitStore};
