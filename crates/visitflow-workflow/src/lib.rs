//! # VisitFlow工作流模块
//!
//! 提供就诊流程的核心逻辑，包括：
//! - 就诊状态机：管理就诊记录从排队到就诊完成的状态转换
//! - 分诊引擎：按固定决策表生成症状问题并汇总分诊摘要
//! - 排队位置服务：按请求时间计算同状态队列中的名次
//! - 就诊流程协调器：角色校验、单一活跃就诊约束与原子状态写入
//! - 队列统计：各状态数量与平均等待时间

pub mod coordinator;
pub mod position;
pub mod state_machine;
pub mod stats;
pub mod triage;

// 重新导出主要类型
pub use coordinator::{Decision, ProcessRequest, QueueStatus, TriageReport, VisitCoordinator};
pub use position::PositionService;
pub use state_machine::{Actor, VisitEvent, VisitStateMachine};
pub use stats::QueueStats;
pub use triage::{PrimarySymptom, TriageEngine, TriageStep, MAX_TRIAGE_ANSWERS};
