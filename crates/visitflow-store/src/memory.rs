//! 内存就诊记录存储

use crate::store::{Expected, VisitFilter, VisitStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;
use visitflow_core::{Result, VisitFlowError, VisitRecord, VisitStatus};

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<Uuid, VisitRecord>,
    next_sequence: u64,
}

/// 基于读写锁的内存存储
#[derive(Debug, Default)]
pub struct InMemoryVisitStore {
    state: RwLock<MemoryState>,
}

impl InMemoryVisitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录总数（包括历史记录）
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl VisitStore for InMemoryVisitStore {
    async fn insert_if_no_active(&self, mut record: VisitRecord) -> Result<VisitRecord> {
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .records
            .values()
            .find(|r| r.patient_id == record.patient_id && r.is_active())
        {
            return Err(VisitFlowError::Conflict(format!(
                "Patient {} already has an active visit {}",
                record.patient_id, existing.id
            )));
        }

        if state.records.contains_key(&record.id) {
            return Err(VisitFlowError::Conflict(format!(
                "Visit {} already exists",
                record.id
            )));
        }

        state.next_sequence += 1;
        record.sequence = state.next_sequence;
        record.version = 1;

        state.records.insert(record.id, record.clone());
        tracing::debug!("Stored visit {} with sequence {}", record.id, record.sequence);
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<VisitRecord> {
        self.state
            .read()
            .await
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| VisitFlowError::NotFound(format!("Visit {} not found", id)))
    }

    async fn find_active_by_patient(&self, patient_id: Uuid) -> Result<Option<VisitRecord>> {
        Ok(self
            .state
            .read()
            .await
            .records
            .values()
            .find(|r| r.patient_id == patient_id && r.is_active())
            .cloned())
    }

    async fn query(&self, filter: &VisitFilter) -> Result<Vec<VisitRecord>> {
        let state = self.state.read().await;
        let mut items: Vec<VisitRecord> = state
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        items.sort_by_key(|r| r.queue_key());
        if filter.newest_first {
            items.reverse();
        }

        Ok(items)
    }

    async fn count_ahead(
        &self,
        status: VisitStatus,
        request_time: DateTime<Utc>,
        sequence: u64,
    ) -> Result<u64> {
        let state = self.state.read().await;
        let key = (request_time, sequence);
        let count = state
            .records
            .values()
            .filter(|r| r.status == status && r.queue_key() < key)
            .count();
        Ok(count as u64)
    }

    async fn compare_and_swap(&self, expected: Expected, mut updated: VisitRecord) -> Result<VisitRecord> {
        if updated.id != expected.id {
            return Err(VisitFlowError::Internal(format!(
                "Update for visit {} submitted against visit {}",
                updated.id, expected.id
            )));
        }

        let mut state = self.state.write().await;
        let current = state
            .records
            .get_mut(&expected.id)
            .ok_or_else(|| VisitFlowError::NotFound(format!("Visit {} not found", expected.id)))?;

        if current.status != expected.status || current.version != expected.version {
            tracing::warn!(
                "Rejected stale write to visit {}: expected {}@v{}, found {}@v{}",
                expected.id,
                expected.status,
                expected.version,
                current.status,
                current.version
            );
            return Err(VisitFlowError::Conflict(format!(
                "Visit {} was modified concurrently (now {})",
                expected.id, current.status
            )));
        }

        updated.sequence = current.sequence;
        updated.version = current.version + 1;
        *current = updated.clone();
        Ok(updated)
    }
}
