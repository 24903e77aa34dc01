//! 就诊状态机
//!
//! 管理就诊记录的完整生命周期状态转换

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use visitflow_core::{Result, VisitFlowError, VisitStatus};

/// 就诊状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VisitEvent {
    Join,
    Approve,
    Reject,
    StartTriage,
    SubmitAnswer,
    CompleteTriage,
    StartConsultation,
    CompleteConsultation,
}

impl fmt::Display for VisitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VisitEvent::Join => "join",
            VisitEvent::Approve => "approve",
            VisitEvent::Reject => "reject",
            VisitEvent::StartTriage => "start_triage",
            VisitEvent::SubmitAnswer => "submit_answer",
            VisitEvent::CompleteTriage => "complete_triage",
            VisitEvent::StartConsultation => "start_consultation",
            VisitEvent::CompleteConsultation => "complete_consultation",
        };
        f.write_str(name)
    }
}

/// 触发转换的执行者
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Patient,
    Staff,
    Doctor,
}

const PATIENT: &[Actor] = &[Actor::Patient];
const STAFF: &[Actor] = &[Actor::Staff];
const DOCTOR: &[Actor] = &[Actor::Doctor];

/// 状态机转换规则
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: Option<VisitStatus>,
    pub event: VisitEvent,
    pub to: VisitStatus,
    pub actors: &'static [Actor],
}

/// 就诊状态机
#[derive(Debug)]
pub struct VisitStateMachine {
    transitions: HashMap<(Option<VisitStatus>, VisitEvent), StateTransition>,
}

impl VisitStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        use VisitEvent::*;
        use VisitStatus::*;

        // 定义状态转换规则
        let rules: [(Option<VisitStatus>, VisitEvent, VisitStatus, &'static [Actor]); 8] = [
            (None, Join, Pending, PATIENT),
            (Some(Pending), Approve, Approved, STAFF),
            (Some(Pending), Reject, Rejected, STAFF),
            (Some(Approved), StartTriage, InTriage, PATIENT),
            (Some(InTriage), SubmitAnswer, InTriage, PATIENT),
            (Some(InTriage), CompleteTriage, Waiting, PATIENT),
            (Some(Waiting), StartConsultation, WithDoctor, DOCTOR),
            (Some(WithDoctor), CompleteConsultation, Completed, DOCTOR),
        ];

        let transitions = rules
            .into_iter()
            .map(|(from, event, to, actors)| {
                ((from, event), StateTransition { from, event, to, actors })
            })
            .collect();

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: Option<VisitStatus>, event: VisitEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: Option<VisitStatus>, event: VisitEvent) -> Result<VisitStatus> {
        match self.transitions.get(&(from, event)) {
            Some(rule) => Ok(rule.to),
            None => Err(VisitFlowError::InvalidTransition {
                from: from.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()),
                event: event.to_string(),
            }),
        }
    }

    /// 校验从 `from` 到 `to` 的状态变化，返回对应事件
    pub fn validate(&self, from: Option<VisitStatus>, to: VisitStatus) -> Result<VisitEvent> {
        self.transitions
            .values()
            .find(|rule| rule.from == from && rule.to == to)
            .map(|rule| rule.event)
            .ok_or_else(|| VisitFlowError::InvalidTransition {
                from: from.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()),
                event: format!("to_{}", to),
            })
    }

    /// 执行者是否有权触发该事件
    pub fn permits(&self, event: VisitEvent, actor: Actor) -> bool {
        self.transitions
            .values()
            .any(|rule| rule.event == event && rule.actors.contains(&actor))
    }

    /// 当前状态是否正是该事件已执行后的结果（重复提交）
    pub fn already_applied(&self, current: VisitStatus, event: VisitEvent) -> bool {
        self.transitions
            .values()
            .any(|rule| rule.event == event && rule.to == current && rule.from != Some(current))
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current_state: VisitStatus) -> Vec<VisitEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == Some(current_state))
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for VisitStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
