//! 队列统计

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use visitflow_core::{VisitRecord, VisitStatus};

/// 队列统计信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub total_records: u64,
    pub active_visits: u64,
    pub counts_by_status: BTreeMap<VisitStatus, u64>,
    /// 从请求到审核的平均等待秒数
    pub average_approval_wait_seconds: Option<f64>,
    /// 从分诊结束到开始就诊的平均等待秒数
    pub average_consultation_wait_seconds: Option<f64>,
}

impl QueueStats {
    pub fn from_records(records: &[VisitRecord]) -> Self {
        let mut counts_by_status: BTreeMap<VisitStatus, u64> =
            VisitStatus::ALL.iter().map(|status| (*status, 0)).collect();

        for record in records {
            *counts_by_status.entry(record.status).or_insert(0) += 1;
        }

        let active_visits = records.iter().filter(|r| r.is_active()).count() as u64;

        Self {
            total_records: records.len() as u64,
            active_visits,
            counts_by_status,
            average_approval_wait_seconds: average_gap(
                records.iter().map(|r| (Some(r.request_time), r.approval_time)),
            ),
            average_consultation_wait_seconds: average_gap(
                records
                    .iter()
                    .map(|r| (r.triage_end_time, r.consultation_start_time)),
            ),
        }
    }

    pub fn count(&self, status: VisitStatus) -> u64 {
        self.counts_by_status.get(&status).copied().unwrap_or(0)
    }
}

fn average_gap<I>(pairs: I) -> Option<f64>
where
    I: Iterator<Item = (Option<DateTime<Utc>>, Option<DateTime<Utc>>)>,
{
    let gaps: Vec<f64> = pairs
        .filter_map(|(start, end)| match (start, end) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        })
        .collect();

    if gaps.is_empty() {
        None
    } else {
        Some(gaps.iter().sum::<f64>() / gaps.len() as f64)
    }
}
