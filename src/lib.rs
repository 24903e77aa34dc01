//! # VisitFlow
//!
//! 根包仅用于演示程序，重新导出各子模块的主要入口。

pub use visitflow_core as core;
pub use visitflow_store as store;
pub use visitflow_workflow as workflow;
