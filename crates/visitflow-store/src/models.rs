//! 数据库模型

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;
use visitflow_core::{Priority, Result, TriageSummary, VisitFlowError, VisitRecord};

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库就诊记录表
#[derive(Debug, FromRow)]
pub struct DbVisitRecord {
    pub id: Uuid,
    pub sequence: i64,
    pub patient_id: Uuid,
    pub status: String, // 存储为字符串，转换为VisitStatus枚举
    pub assigned_doctor_id: Option<Uuid>,
    pub room_number: Option<String>,
    pub priority: i16,
    pub request_time: DateTime<Utc>,
    pub approval_time: Option<DateTime<Utc>>,
    pub triage_start_time: Option<DateTime<Utc>>,
    pub triage_end_time: Option<DateTime<Utc>>,
    pub consultation_start_time: Option<DateTime<Utc>>,
    pub consultation_end_time: Option<DateTime<Utc>>,
    pub symptom_history: String, // JSON数组
    pub triage_summary: Option<String>, // JSON对象
    pub notes: Option<String>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbVisitRecord> for VisitRecord {
    type Error = VisitFlowError;

    fn try_from(row: DbVisitRecord) -> Result<Self> {
        let priority = u8::try_from(row.priority)
            .map_err(|_| VisitFlowError::Database(format!("Invalid priority {}", row.priority)))
            .and_then(Priority::new)?;

        let triage_summary = match row.triage_summary {
            Some(json) => Some(serde_json::from_str::<TriageSummary>(&json)?),
            None => None,
        };

        Ok(VisitRecord {
            id: row.id,
            patient_id: row.patient_id,
            status: row.status.parse()?,
            assigned_doctor_id: row.assigned_doctor_id,
            room_number: row.room_number,
            priority,
            request_time: row.request_time,
            approval_time: row.approval_time,
            triage_start_time: row.triage_start_time,
            triage_end_time: row.triage_end_time,
            consultation_start_time: row.consultation_start_time,
            consultation_end_time: row.consultation_end_time,
            symptom_history: serde_json::from_str(&row.symptom_history)?,
            triage_summary,
            notes: row.notes,
            sequence: row.sequence as u64,
            version: row.version as u64,
            updated_at: row.updated_at,
        })
    }
}

/// 写入模型 - 预先序列化JSON列
#[derive(Debug)]
pub struct VisitRow {
    pub symptom_history: String,
    pub triage_summary: Option<String>,
    pub priority: i16,
}

impl VisitRow {
    pub fn from_record(record: &VisitRecord) -> Result<Self> {
        let triage_summary = match &record.triage_summary {
            Some(summary) => Some(serde_json::to_string(summary)?),
            None => None,
        };

        Ok(Self {
            symptom_history: serde_json::to_string(&record.symptom_history)?,
            triage_summary,
            priority: i16::from(record.priority.value()),
        })
    }
}
