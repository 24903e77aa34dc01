//! 核心数据模型定义

use crate::error::{Result, VisitFlowError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 就诊状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Pending,    // 待审核
    Approved,   // 已批准
    InTriage,   // 分诊中
    Waiting,    // 候诊
    WithDoctor, // 就诊中
    Completed,  // 已完成
    Rejected,   // 已拒绝
}

impl VisitStatus {
    /// 全部状态
    pub const ALL: [VisitStatus; 7] = [
        VisitStatus::Pending,
        VisitStatus::Approved,
        VisitStatus::InTriage,
        VisitStatus::Waiting,
        VisitStatus::WithDoctor,
        VisitStatus::Completed,
        VisitStatus::Rejected,
    ];

    /// 活跃状态集合，同一患者至多一条记录处于其中
    pub const ACTIVE: [VisitStatus; 5] = [
        VisitStatus::Pending,
        VisitStatus::Approved,
        VisitStatus::InTriage,
        VisitStatus::Waiting,
        VisitStatus::WithDoctor,
    ];

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VisitStatus::Completed | VisitStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::Pending => "pending",
            VisitStatus::Approved => "approved",
            VisitStatus::InTriage => "in_triage",
            VisitStatus::Waiting => "waiting",
            VisitStatus::WithDoctor => "with_doctor",
            VisitStatus::Completed => "completed",
            VisitStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisitStatus {
    type Err = VisitFlowError;

    fn from_str(s: &str) -> Result<Self> {
        VisitStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| VisitFlowError::Validation(format!("Invalid status: {}", s)))
    }
}

/// 调用方角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// 患者 - 发起排队与分诊
    Patient,
    /// 服务台工作人员 - 审核排队请求
    #[serde(alias = "helpdesk")]
    Staff,
    /// 医生 - 处理候诊队列
    Doctor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Staff => "staff",
            Role::Doctor => "doctor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = VisitFlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "staff" | "helpdesk" => Ok(Role::Staff),
            "doctor" => Ok(Role::Doctor),
            other => Err(VisitFlowError::Validation(format!("Unknown role: {}", other))),
        }
    }
}

/// 已认证的调用方身份（由外部认证层提供）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn patient(id: Uuid) -> Self {
        Self::new(id, Role::Patient)
    }

    pub fn staff(id: Uuid) -> Self {
        Self::new(id, Role::Staff)
    }

    pub fn doctor(id: Uuid) -> Self {
        Self::new(id, Role::Doctor)
    }

    /// 要求调用方具有指定角色
    pub fn require_role(&self, role: Role) -> Result<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(VisitFlowError::Forbidden(format!(
                "Operation requires role {}, caller has role {}",
                role, self.role
            )))
        }
    }
}

/// 优先级，1最高，5最低
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const HIGHEST: u8 = 1;
    pub const LOWEST: u8 = 5;

    pub fn new(value: u8) -> Result<Self> {
        if (Self::HIGHEST..=Self::LOWEST).contains(&value) {
            Ok(Self(value))
        } else {
            Err(VisitFlowError::Validation(format!(
                "Priority must be between {} and {}, got {}",
                Self::HIGHEST,
                Self::LOWEST,
                value
            )))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(3)
    }
}

impl TryFrom<u8> for Priority {
    type Error = VisitFlowError;

    fn try_from(value: u8) -> Result<Self> {
        Priority::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

/// 分诊问答条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymptomEntry {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

/// 分诊问题
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub text: String,
    pub options: Vec<String>,
}

impl Question {
    pub fn new(text: &str, options: &[&str]) -> Self {
        Self {
            text: text.to_string(),
            options: options.iter().map(|option| option.to_string()).collect(),
        }
    }
}

/// 分诊摘要，键集合固定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TriageSummary {
    pub primary_symptom: String,
    pub duration: String,
    pub severity: String,
    pub recommended_action: String,
    pub full_symptom_history: String,
}

impl TriageSummary {
    /// 固定键名，按输出顺序排列
    pub const KEYS: [&'static str; 5] = [
        "primarySymptom",
        "duration",
        "severity",
        "recommendedAction",
        "fullSymptomHistory",
    ];

    /// 按键名读取摘要字段
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "primarySymptom" => Some(&self.primary_symptom),
            "duration" => Some(&self.duration),
            "severity" => Some(&self.severity),
            "recommendedAction" => Some(&self.recommended_action),
            "fullSymptomHistory" => Some(&self.full_symptom_history),
            _ => None,
        }
    }

    /// 转换为有序键值映射
    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        Self::KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value.to_string())))
            .collect()
    }
}

/// 就诊记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub status: VisitStatus,
    pub assigned_doctor_id: Option<Uuid>,
    pub room_number: Option<String>,
    pub priority: Priority,
    pub request_time: DateTime<Utc>,
    pub approval_time: Option<DateTime<Utc>>,
    pub triage_start_time: Option<DateTime<Utc>>,
    pub triage_end_time: Option<DateTime<Utc>>,
    pub consultation_start_time: Option<DateTime<Utc>>,
    pub consultation_end_time: Option<DateTime<Utc>>,
    pub symptom_history: Vec<SymptomEntry>,
    pub triage_summary: Option<TriageSummary>,
    pub notes: Option<String>,
    /// 存储插入序号，请求时间相同时用于稳定排序
    pub sequence: u64,
    /// 乐观并发版本号，每次成功写入后递增
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl VisitRecord {
    /// 创建新的待审核记录，序号由存储层分配
    pub fn new(patient_id: Uuid, request_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            status: VisitStatus::Pending,
            assigned_doctor_id: None,
            room_number: None,
            priority: Priority::default(),
            request_time,
            approval_time: None,
            triage_start_time: None,
            triage_end_time: None,
            consultation_start_time: None,
            consultation_end_time: None,
            symptom_history: Vec::new(),
            triage_summary: None,
            notes: None,
            sequence: 0,
            version: 0,
            updated_at: request_time,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// 队列排序键
    pub fn queue_key(&self) -> (DateTime<Utc>, u64) {
        (self.request_time, self.sequence)
    }
}
