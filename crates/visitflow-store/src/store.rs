//! 就诊记录存储接口

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use visitflow_core::{Result, VisitRecord, VisitStatus};

/// 条件写入的前置条件：记录当前状态与版本号必须与读取时一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expected {
    pub id: Uuid,
    pub status: VisitStatus,
    pub version: u64,
}

impl Expected {
    /// 以读取到的记录作为前置条件
    pub fn of(record: &VisitRecord) -> Self {
        Self {
            id: record.id,
            status: record.status,
            version: record.version,
        }
    }
}

/// 就诊记录查询过滤器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisitFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub statuses: Option<Vec<VisitStatus>>,
    /// 为真时按请求时间倒序
    pub newest_first: bool,
}

impl VisitFilter {
    pub fn by_status(statuses: &[VisitStatus]) -> Self {
        Self {
            statuses: Some(statuses.to_vec()),
            ..Default::default()
        }
    }

    pub fn by_patient(patient_id: Uuid) -> Self {
        Self {
            patient_id: Some(patient_id),
            ..Default::default()
        }
    }

    pub fn by_doctor(doctor_id: Uuid, statuses: &[VisitStatus]) -> Self {
        Self {
            doctor_id: Some(doctor_id),
            statuses: Some(statuses.to_vec()),
            ..Default::default()
        }
    }

    /// 判断记录是否满足过滤条件
    pub fn matches(&self, record: &VisitRecord) -> bool {
        if let Some(patient_id) = self.patient_id {
            if record.patient_id != patient_id {
                return false;
            }
        }

        if let Some(doctor_id) = self.doctor_id {
            if record.assigned_doctor_id != Some(doctor_id) {
                return false;
            }
        }

        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&record.status) {
                return false;
            }
        }

        true
    }
}

/// 就诊记录存储
///
/// 所有修改都必须经过 `insert_if_no_active` 或 `compare_and_swap`，
/// 两者在存储内部原子完成检查与写入。
#[async_trait]
pub trait VisitStore: Send + Sync + std::fmt::Debug {
    /// 插入新记录；若该患者已有活跃记录则返回 `Conflict`。
    /// 存储负责分配插入序号并将版本号置为1。
    async fn insert_if_no_active(&self, record: VisitRecord) -> Result<VisitRecord>;

    /// 按ID读取，不存在时返回 `NotFound`
    async fn get(&self, id: Uuid) -> Result<VisitRecord>;

    /// 查找患者当前的活跃记录
    async fn find_active_by_patient(&self, patient_id: Uuid) -> Result<Option<VisitRecord>>;

    /// 按过滤器查询，默认按 (request_time, sequence) 升序
    async fn query(&self, filter: &VisitFilter) -> Result<Vec<VisitRecord>>;

    /// 统计同一状态下排在指定位置之前的记录数
    async fn count_ahead(
        &self,
        status: VisitStatus,
        request_time: DateTime<Utc>,
        sequence: u64,
    ) -> Result<u64>;

    /// 条件写入：仅当记录当前状态与版本号符合 `expected` 时写入 `updated`，
    /// 否则返回 `Conflict`。成功后版本号递增。
    async fn compare_and_swap(&self, expected: Expected, updated: VisitRecord) -> Result<VisitRecord>;
}

/// 共享存储句柄
pub type SharedVisitStore = Arc<dyn VisitStore>;
