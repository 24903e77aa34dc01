//! 排队位置服务
//!
//! 计算记录在同状态队列中的名次，排序只看请求时间，
//! 请求时间相同时按插入顺序。优先级字段不参与排序。

use visitflow_core::{Result, VisitRecord, VisitStatus};
use visitflow_store::SharedVisitStore;

#[derive(Debug, Clone)]
pub struct PositionService {
    store: SharedVisitStore,
}

impl PositionService {
    pub fn new(store: SharedVisitStore) -> Self {
        Self { store }
    }

    /// 1起始的名次；待审核记录没有名次
    pub async fn position(&self, record: &VisitRecord) -> Result<Option<u32>> {
        if record.status == VisitStatus::Pending {
            return Ok(None);
        }

        let ahead = self
            .store
            .count_ahead(record.status, record.request_time, record.sequence)
            .await?;

        Ok(Some(u32::try_from(ahead).unwrap_or(u32::MAX - 1) + 1))
    }
}
