//! 就诊流程协调器
//!
//! 协调状态机、分诊引擎、排队位置服务与存储的核心入口。
//! 每个操作先校验调用方角色，再读取记录、校验状态转换，
//! 最后以 (状态, 版本号) 为前置条件一次性写入全部字段。

use crate::{
    position::PositionService,
    state_machine::{Actor, VisitEvent, VisitStateMachine},
    stats::QueueStats,
    triage::{TriageEngine, TriageStep},
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;
use visitflow_core::{
    Caller, Clock, Priority, Question, Result, Role, SymptomEntry,
    SystemClock, TriageSummary, VisitFlowError, VisitRecord, VisitStatus,
};
use visitflow_store::{Expected, SharedVisitStore, VisitFilter};

/// 服务台审核决定
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl FromStr for Decision {
    type Err = VisitFlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "approved" => Ok(Decision::Approved),
            "rejected" => Ok(Decision::Rejected),
            other => Err(VisitFlowError::Validation(format!("Invalid status: {}", other))),
        }
    }
}

/// 审核请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub decision: Decision,
    pub room_number: Option<String>,
    pub doctor_id: Option<Uuid>,
}

impl ProcessRequest {
    pub fn approve(room_number: &str, doctor_id: Uuid) -> Self {
        Self {
            decision: Decision::Approved,
            room_number: Some(room_number.to_string()),
            doctor_id: Some(doctor_id),
        }
    }

    pub fn reject() -> Self {
        Self {
            decision: Decision::Rejected,
            room_number: None,
            doctor_id: None,
        }
    }
}

/// 患者排队状态
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub record: VisitRecord,
    pub position: Option<u32>,
}

/// 分诊记录与摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageReport {
    pub symptom_history: Vec<SymptomEntry>,
    pub summary: Option<TriageSummary>,
}

/// 就诊流程协调器
#[derive(Debug)]
pub struct VisitCoordinator {
    store: SharedVisitStore,
    clock: Arc<dyn Clock>,
    state_machine: VisitStateMachine,
    triage: TriageEngine,
    positions: PositionService,
}

impl VisitCoordinator {
    /// 使用系统时钟创建协调器
    pub fn new(store: SharedVisitStore) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: SharedVisitStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            positions: PositionService::new(store.clone()),
            store,
            clock,
            state_machine: VisitStateMachine::new(),
            triage: TriageEngine::new(),
        }
    }

    /// 患者加入队列
    pub async fn join_queue(&self, caller: &Caller) -> Result<VisitRecord> {
        caller.require_role(Role::Patient)?;
        let status = self.state_machine.transition(None, VisitEvent::Join)?;

        let mut record = VisitRecord::new(caller.id, self.clock.now());
        record.status = status;

        let record = self.store.insert_if_no_active(record).await?;
        tracing::info!("Patient {} joined queue with visit {}", caller.id, record.id);
        Ok(record)
    }

    /// 患者查询当前活跃就诊及排队位置
    pub async fn get_status(&self, caller: &Caller) -> Result<QueueStatus> {
        caller.require_role(Role::Patient)?;

        let record = self
            .store
            .find_active_by_patient(caller.id)
            .await?
            .ok_or_else(|| VisitFlowError::NotFound("No active queue entry found".to_string()))?;

        let position = self.positions.position(&record).await?;
        Ok(QueueStatus { record, position })
    }

    /// 待审核请求，按请求时间升序
    pub async fn list_pending(&self, caller: &Caller) -> Result<Vec<VisitRecord>> {
        caller.require_role(Role::Staff)?;
        self.store
            .query(&VisitFilter::by_status(&[VisitStatus::Pending]))
            .await
    }

    /// 服务台批准或拒绝排队请求
    pub async fn process(
        &self,
        caller: &Caller,
        record_id: Uuid,
        request: ProcessRequest,
    ) -> Result<VisitRecord> {
        caller.require_role(Role::Staff)?;

        let assignment = match request.decision {
            Decision::Approved => Some(Self::validate_assignment(&request)?),
            Decision::Rejected => None,
        };
        let event = match request.decision {
            Decision::Approved => VisitEvent::Approve,
            Decision::Rejected => VisitEvent::Reject,
        };

        let current = self.store.get(record_id).await?;
        // 审核只针对待审核记录，其余状态一律视为已处理
        if current.status != VisitStatus::Pending {
            tracing::warn!("Visit {} already processed ({})", record_id, current.status);
            return Err(VisitFlowError::Conflict(format!(
                "Visit {} already processed ({})",
                record_id, current.status
            )));
        }
        let now = self.clock.now();

        let updated = self
            .apply(&current, event, Actor::Staff, |record| {
                record.approval_time = Some(now);
                if let Some((room_number, doctor_id)) = assignment {
                    record.room_number = Some(room_number);
                    record.assigned_doctor_id = Some(doctor_id);
                }
            })
            .await?;

        tracing::info!(
            "Visit {} {} by staff {}",
            record_id,
            updated.status,
            caller.id
        );
        Ok(updated)
    }

    /// 医生的候诊与就诊中队列，按请求时间升序
    pub async fn doctor_queue(&self, caller: &Caller) -> Result<Vec<VisitRecord>> {
        caller.require_role(Role::Doctor)?;
        self.store
            .query(&VisitFilter::by_doctor(
                caller.id,
                &[VisitStatus::Waiting, VisitStatus::WithDoctor],
            ))
            .await
    }

    /// 医生更新就诊状态
    pub async fn update_consultation_status(
        &self,
        caller: &Caller,
        record_id: Uuid,
        status: VisitStatus,
    ) -> Result<VisitRecord> {
        caller.require_role(Role::Doctor)?;

        if !matches!(
            status,
            VisitStatus::Waiting | VisitStatus::WithDoctor | VisitStatus::Completed
        ) {
            return Err(VisitFlowError::Validation(format!("Invalid status: {}", status)));
        }

        let current = self.store.get(record_id).await?;
        if current.assigned_doctor_id != Some(caller.id) {
            return Err(VisitFlowError::Forbidden(format!(
                "Visit {} is not assigned to doctor {}",
                record_id, caller.id
            )));
        }

        let now = self.clock.now();
        let updated = match status {
            VisitStatus::WithDoctor => {
                self.apply(&current, VisitEvent::StartConsultation, Actor::Doctor, |record| {
                    record.consultation_start_time = Some(now);
                })
                .await?
            }
            VisitStatus::Completed => {
                self.apply(&current, VisitEvent::CompleteConsultation, Actor::Doctor, |record| {
                    record.consultation_end_time = Some(now);
                })
                .await?
            }
            // 医生不能将记录退回候诊
            _ => {
                return Err(VisitFlowError::InvalidTransition {
                    from: current.status.to_string(),
                    event: format!("to_{}", status),
                })
            }
        };

        tracing::info!(
            "Doctor {} moved visit {} to {}",
            caller.id,
            record_id,
            updated.status
        );
        Ok(updated)
    }

    /// 开始分诊，返回第一题
    pub async fn start_triage(&self, caller: &Caller, record_id: Uuid) -> Result<Question> {
        caller.require_role(Role::Patient)?;

        let current = self.store.get(record_id).await?;
        Self::require_owner(caller, &current)?;

        let now = self.clock.now();
        self.apply(&current, VisitEvent::StartTriage, Actor::Patient, |record| {
            record.triage_start_time = Some(now);
            record.symptom_history.clear();
        })
        .await?;

        tracing::info!("Triage started for visit {}", record_id);
        Ok(self.triage.start_session())
    }

    /// 提交分诊回答，返回下一题或分诊摘要
    pub async fn submit_triage_answer(
        &self,
        caller: &Caller,
        record_id: Uuid,
        answer: &str,
    ) -> Result<TriageStep> {
        caller.require_role(Role::Patient)?;

        let current = self.store.get(record_id).await?;
        Self::require_owner(caller, &current)?;

        if current.status != VisitStatus::InTriage {
            return Err(VisitFlowError::InvalidState(format!(
                "Visit {} has no active triage session (status {})",
                record_id, current.status
            )));
        }

        let now = self.clock.now();
        let mut history = current.symptom_history.clone();
        let step = self.triage.submit(&mut history, answer, now)?;

        let updated = match &step {
            TriageStep::Next { .. } => {
                self.apply(&current, VisitEvent::SubmitAnswer, Actor::Patient, |record| {
                    record.symptom_history = history;
                })
                .await?
            }
            TriageStep::Complete { summary } => {
                let summary = summary.clone();
                self.apply(&current, VisitEvent::CompleteTriage, Actor::Patient, |record| {
                    record.symptom_history = history;
                    record.triage_end_time = Some(now);
                    record.triage_summary = Some(summary);
                })
                .await?
            }
        };

        tracing::debug!(
            "Visit {} recorded triage answer {} of {}",
            record_id,
            updated.symptom_history.len(),
            crate::triage::MAX_TRIAGE_ANSWERS
        );
        if step.is_complete() {
            tracing::info!("Triage completed for visit {}, now waiting", record_id);
        }
        Ok(step)
    }

    /// 查看分诊记录：医生、服务台或记录所属患者
    pub async fn get_triage_summary(&self, caller: &Caller, record_id: Uuid) -> Result<TriageReport> {
        let record = self.store.get(record_id).await?;

        if caller.role == Role::Patient {
            Self::require_owner(caller, &record)?;
        }

        Ok(TriageReport {
            symptom_history: record.symptom_history,
            summary: record.triage_summary,
        })
    }

    /// 服务台更新备注，空字符串清除备注
    pub async fn update_notes(&self, caller: &Caller, record_id: Uuid, notes: &str) -> Result<VisitRecord> {
        caller.require_role(Role::Staff)?;

        let current = self.store.get(record_id).await?;
        let notes = notes.trim();
        let mut updated = current.clone();
        updated.notes = if notes.is_empty() {
            None
        } else {
            Some(notes.to_string())
        };
        updated.updated_at = self.clock.now();

        let updated = self.store.compare_and_swap(Expected::of(&current), updated).await?;
        tracing::info!("Staff {} updated notes on visit {}", caller.id, record_id);
        Ok(updated)
    }

    /// 服务台调整优先级，仅限活跃记录；不影响排队顺序
    pub async fn set_priority(&self, caller: &Caller, record_id: Uuid, priority: u8) -> Result<VisitRecord> {
        caller.require_role(Role::Staff)?;
        let priority = Priority::new(priority)?;

        let current = self.store.get(record_id).await?;
        if !current.is_active() {
            return Err(VisitFlowError::InvalidState(format!(
                "Visit {} is already {}",
                record_id, current.status
            )));
        }

        let mut updated = current.clone();
        updated.priority = priority;
        updated.updated_at = self.clock.now();

        let updated = self.store.compare_and_swap(Expected::of(&current), updated).await?;
        tracing::info!(
            "Staff {} set priority {} on visit {}",
            caller.id,
            priority.value(),
            record_id
        );
        Ok(updated)
    }

    /// 患者的全部就诊记录，最新在前
    pub async fn visit_history(&self, caller: &Caller) -> Result<Vec<VisitRecord>> {
        caller.require_role(Role::Patient)?;
        self.store
            .query(&VisitFilter {
                patient_id: Some(caller.id),
                newest_first: true,
                ..Default::default()
            })
            .await
    }

    /// 队列统计（服务台）
    pub async fn queue_stats(&self, caller: &Caller) -> Result<QueueStats> {
        caller.require_role(Role::Staff)?;
        let records = self.store.query(&VisitFilter::default()).await?;
        Ok(QueueStats::from_records(&records))
    }

    /// 按ID查看记录（服务台或医生）
    pub async fn get_record(&self, caller: &Caller, record_id: Uuid) -> Result<VisitRecord> {
        if caller.role == Role::Patient {
            return Err(VisitFlowError::Forbidden(
                "Patients cannot look up visits by id".to_string(),
            ));
        }
        self.store.get(record_id).await
    }

    /// 校验转换后在记录副本上应用修改，并以读取时的状态与版本号为条件写入
    async fn apply<F>(
        &self,
        current: &VisitRecord,
        event: VisitEvent,
        actor: Actor,
        mutate: F,
    ) -> Result<VisitRecord>
    where
        F: FnOnce(&mut VisitRecord),
    {
        if !self.state_machine.permits(event, actor) {
            return Err(VisitFlowError::Forbidden(format!(
                "{:?} may not trigger {}",
                actor, event
            )));
        }

        let next_status = match self.state_machine.transition(Some(current.status), event) {
            Ok(status) => status,
            Err(_) if self.state_machine.already_applied(current.status, event) => {
                tracing::warn!("Duplicate {} on visit {} ignored", event, current.id);
                return Err(VisitFlowError::Conflict(format!(
                    "Visit {} already processed ({})",
                    current.id, current.status
                )));
            }
            Err(err) => {
                tracing::warn!(
                    "Rejected {} on visit {} in status {}",
                    event,
                    current.id,
                    current.status
                );
                return Err(err);
            }
        };

        let mut updated = current.clone();
        updated.status = next_status;
        mutate(&mut updated);
        updated.updated_at = self.clock.now();

        self.store.compare_and_swap(Expected::of(current), updated).await
    }

    fn validate_assignment(request: &ProcessRequest) -> Result<(String, Uuid)> {
        let room_number = request
            .room_number
            .as_deref()
            .map(str::trim)
            .filter(|room| !room.is_empty());

        match (room_number, request.doctor_id) {
            (Some(room), Some(doctor_id)) => Ok((room.to_string(), doctor_id)),
            _ => Err(VisitFlowError::Validation(
                "Room number and doctor are required for approval".to_string(),
            )),
        }
    }

    fn require_owner(caller: &Caller, record: &VisitRecord) -> Result<()> {
        if record.patient_id == caller.id {
            Ok(())
        } else {
            Err(VisitFlowError::Forbidden(format!(
                "Visit {} does not belong to patient {}",
                record.id, caller.id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use visitflow_core::ManualClock;
    use visitflow_store::{InMemoryVisitStore, VisitStore};

    struct Fixture {
        coordinator: Arc<VisitCoordinator>,
        clock: Arc<ManualClock>,
        store: Arc<InMemoryVisitStore>,
        staff: Caller,
        doctor: Caller,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryVisitStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        ));
        let coordinator = Arc::new(VisitCoordinator::with_clock(store.clone(), clock.clone()));
        Fixture {
            coordinator,
            clock,
            store,
            staff: Caller::staff(Uuid::new_v4()),
            doctor: Caller::doctor(Uuid::new_v4()),
        }
    }

    impl Fixture {
        async fn approved_visit(&self, patient: &Caller) -> VisitRecord {
            let record = self.coordinator.join_queue(patient).await.unwrap();
            self.coordinator
                .process(&self.staff, record.id, ProcessRequest::approve("101", self.doctor.id))
                .await
                .unwrap()
        }

        async fn waiting_visit(&self, patient: &Caller) -> VisitRecord {
            let record = self.approved_visit(patient).await;
            self.coordinator.start_triage(patient, record.id).await.unwrap();
            for answer in ["Other", "No", "No", "No", "No"] {
                self.coordinator
                    .submit_triage_answer(patient, record.id, answer)
                    .await
                    .unwrap();
            }
            self.store.get(record.id).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_second_join_conflicts() {
        let fx = fixture();
        let patient = Caller::patient(Uuid::new_v4());

        fx.coordinator.join_queue(&patient).await.unwrap();
        let result = fx.coordinator.join_queue(&patient).await;

        assert!(matches!(result, Err(VisitFlowError::Conflict(_))));
        assert_eq!(fx.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_role_gating() {
        let fx = fixture();
        let patient = Caller::patient(Uuid::new_v4());
        let record = fx.coordinator.join_queue(&patient).await.unwrap();

        assert!(matches!(
            fx.coordinator.join_queue(&fx.staff).await,
            Err(VisitFlowError::Forbidden(_))
        ));
        assert!(matches!(
            fx.coordinator.list_pending(&patient).await,
            Err(VisitFlowError::Forbidden(_))
        ));
        assert!(matches!(
            fx.coordinator
                .process(&fx.doctor, record.id, ProcessRequest::approve("101", fx.doctor.id))
                .await,
            Err(VisitFlowError::Forbidden(_))
        ));
        assert!(matches!(
            fx.coordinator.doctor_queue(&fx.staff).await,
            Err(VisitFlowError::Forbidden(_))
        ));

        // 失败的请求不修改记录
        assert_eq!(fx.store.get(record.id).await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_approval_requires_room_and_doctor() {
        let fx = fixture();
        let patient = Caller::patient(Uuid::new_v4());
        let record = fx.coordinator.join_queue(&patient).await.unwrap();

        let request = ProcessRequest {
            decision: Decision::Approved,
            room_number: Some("101".to_string()),
            doctor_id: None,
        };
        let result = fx.coordinator.process(&fx.staff, record.id, request).await;
        assert!(matches!(result, Err(VisitFlowError::Validation(_))));

        let request = ProcessRequest {
            decision: Decision::Approved,
            room_number: Some("  ".to_string()),
            doctor_id: Some(fx.doctor.id),
        };
        let result = fx.coordinator.process(&fx.staff, record.id, request).await;
        assert!(matches!(result, Err(VisitFlowError::Validation(_))));

        let stored = fx.store.get(record.id).await.unwrap();
        assert_eq!(stored.status, VisitStatus::Pending);
        assert!(stored.approval_time.is_none());
    }

    #[tokio::test]
    async fn test_approval_accepts_free_form_room_labels() {
        let fx = fixture();

        for room in ["Room 101", "ER/3", "Cardiology-Wing-B-12"] {
            let patient = Caller::patient(Uuid::new_v4());
            let record = fx.coordinator.join_queue(&patient).await.unwrap();

            let approved = fx
                .coordinator
                .process(&fx.staff, record.id, ProcessRequest::approve(room, fx.doctor.id))
                .await
                .unwrap();
            assert_eq!(approved.status, VisitStatus::Approved);
            assert_eq!(approved.room_number.as_deref(), Some(room));
        }

        // 首尾空白会被去除
        let patient = Caller::patient(Uuid::new_v4());
        let record = fx.coordinator.join_queue(&patient).await.unwrap();
        let approved = fx
            .coordinator
            .process(&fx.staff, record.id, ProcessRequest::approve("  Room 7 ", fx.doctor.id))
            .await
            .unwrap();
        assert_eq!(approved.room_number.as_deref(), Some("Room 7"));
    }

    #[tokio::test]
    async fn test_processing_a_visit_past_pending_conflicts() {
        let fx = fixture();
        let patient = Caller::patient(Uuid::new_v4());
        let record = fx.approved_visit(&patient).await;
        fx.coordinator.start_triage(&patient, record.id).await.unwrap();

        for request in [
            ProcessRequest::approve("202", fx.doctor.id),
            ProcessRequest::reject(),
        ] {
            let result = fx.coordinator.process(&fx.staff, record.id, request).await;
            assert!(matches!(result, Err(VisitFlowError::Conflict(_))));
        }

        let stored = fx.store.get(record.id).await.unwrap();
        assert_eq!(stored.status, VisitStatus::InTriage);
        assert_eq!(stored.room_number.as_deref(), Some("101"));
    }

    #[tokio::test]
    async fn test_process_unknown_record() {
        let fx = fixture();
        let result = fx
            .coordinator
            .process(&fx.staff, Uuid::new_v4(), ProcessRequest::reject())
            .await;
        assert!(matches!(result, Err(VisitFlowError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejection_is_terminal_and_frees_patient() {
        let fx = fixture();
        let patient = Caller::patient(Uuid::new_v4());
        let record = fx.coordinator.join_queue(&patient).await.unwrap();

        let rejected = fx
            .coordinator
            .process(&fx.staff, record.id, ProcessRequest::reject())
            .await
            .unwrap();
        assert_eq!(rejected.status, VisitStatus::Rejected);
        assert!(rejected.approval_time.is_some());
        assert!(rejected.assigned_doctor_id.is_none());

        let result = fx
            .coordinator
            .process(&fx.staff, record.id, ProcessRequest::approve("101", fx.doctor.id))
            .await;
        assert!(matches!(result, Err(VisitFlowError::Conflict(_))));

        assert!(fx.coordinator.join_queue(&patient).await.is_ok());
        assert_eq!(fx.coordinator.visit_history(&patient).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sequential_double_approval_conflicts() {
        let fx = fixture();
        let patient = Caller::patient(Uuid::new_v4());
        let record = fx.approved_visit(&patient).await;

        let result = fx
            .coordinator
            .process(&fx.staff, record.id, ProcessRequest::approve("202", Uuid::new_v4()))
            .await;
        assert!(matches!(result, Err(VisitFlowError::Conflict(_))));

        let stored = fx.store.get(record.id).await.unwrap();
        assert_eq!(stored.room_number.as_deref(), Some("101"));
        assert_eq!(stored.assigned_doctor_id, Some(fx.doctor.id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_double_approval_has_one_winner() {
        let fx = fixture();
        let patient = Caller::patient(Uuid::new_v4());
        let record_id = fx.coordinator.join_queue(&patient).await.unwrap().id;

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let coordinator = fx.coordinator.clone();
                let staff = fx.staff;
                let doctor_id = fx.doctor.id;
                tokio::spawn(async move {
                    coordinator
                        .process(&staff, record_id, ProcessRequest::approve("101", doctor_id))
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(VisitFlowError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error {:?}", other),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);
    }

    /// 读取后在屏障处会合的存储，保证两个请求基于同一版本写入
    #[derive(Debug)]
    struct LockstepStore {
        inner: Arc<InMemoryVisitStore>,
        barrier: tokio::sync::Barrier,
    }

    #[async_trait::async_trait]
    impl VisitStore for LockstepStore {
        async fn insert_if_no_active(&self, record: VisitRecord) -> Result<VisitRecord> {
            self.inner.insert_if_no_active(record).await
        }

        async fn get(&self, id: Uuid) -> Result<VisitRecord> {
            let record = self.inner.get(id).await?;
            self.barrier.wait().await;
            Ok(record)
        }

        async fn find_active_by_patient(&self, patient_id: Uuid) -> Result<Option<VisitRecord>> {
            self.inner.find_active_by_patient(patient_id).await
        }

        async fn query(&self, filter: &VisitFilter) -> Result<Vec<VisitRecord>> {
            self.inner.query(filter).await
        }

        async fn count_ahead(
            &self,
            status: VisitStatus,
            request_time: chrono::DateTime<Utc>,
            sequence: u64,
        ) -> Result<u64> {
            self.inner.count_ahead(status, request_time, sequence).await
        }

        async fn compare_and_swap(&self, expected: Expected, updated: VisitRecord) -> Result<VisitRecord> {
            self.inner.compare_and_swap(expected, updated).await
        }
    }

    #[tokio::test]
    async fn test_double_submitted_answer_records_once() {
        let fx = fixture();
        let patient = Caller::patient(Uuid::new_v4());
        let record = fx.approved_visit(&patient).await;
        fx.coordinator.start_triage(&patient, record.id).await.unwrap();

        let lockstep = VisitCoordinator::with_clock(
            Arc::new(LockstepStore {
                inner: fx.store.clone(),
                barrier: tokio::sync::Barrier::new(2),
            }),
            fx.clock.clone(),
        );

        let (first, second) = tokio::join!(
            lockstep.submit_triage_answer(&patient, record.id, "Fever"),
            lockstep.submit_triage_answer(&patient, record.id, "Fever"),
        );

        let results = [first, second];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(VisitFlowError::Conflict(_))))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);

        let stored = fx.store.get(record.id).await.unwrap();
        assert_eq!(stored.symptom_history.len(), 1);
        assert_eq!(stored.status, VisitStatus::InTriage);
    }

    #[tokio::test]
    async fn test_full_visit_scenario() {
        let fx = fixture();
        let patient = Caller::patient(Uuid::new_v4());

        let record = fx.coordinator.join_queue(&patient).await.unwrap();
        let t0 = record.request_time;
        assert_eq!(record.status, VisitStatus::Pending);
        assert_eq!(fx.coordinator.get_status(&patient).await.unwrap().position, None);

        fx.clock.advance(Duration::minutes(5));
        let approved = fx
            .coordinator
            .process(&fx.staff, record.id, ProcessRequest::approve("101", fx.doctor.id))
            .await
            .unwrap();
        assert_eq!(approved.approval_time, Some(t0 + Duration::minutes(5)));

        let first = fx.coordinator.start_triage(&patient, record.id).await.unwrap();
        assert_eq!(first.text, "What is your main symptom today?");

        let step = fx
            .coordinator
            .submit_triage_answer(&patient, record.id, "Fever")
            .await
            .unwrap();
        match step {
            TriageStep::Next { question } => {
                assert_eq!(question.text, "How long have you had the fever?")
            }
            other => panic!("unexpected step {:?}", other),
        }

        let mut last = fx
            .coordinator
            .submit_triage_answer(&patient, record.id, "1-3 days")
            .await
            .unwrap();
        for _ in 0..3 {
            assert!(!last.is_complete());
            last = fx
                .coordinator
                .submit_triage_answer(&patient, record.id, "No")
                .await
                .unwrap();
        }
        assert!(last.is_complete());

        let waiting = fx.store.get(record.id).await.unwrap();
        assert_eq!(waiting.status, VisitStatus::Waiting);
        assert!(waiting.triage_end_time.is_some());
        let summary = waiting.triage_summary.clone().unwrap();
        assert_eq!(summary.primary_symptom, "Fever");
        assert_eq!(summary.duration, "1-3 days");
        assert_eq!(waiting.symptom_history.len(), 5);

        let queue = fx.coordinator.doctor_queue(&fx.doctor).await.unwrap();
        assert_eq!(queue.len(), 1);

        fx.clock.advance(Duration::minutes(10));
        let with_doctor = fx
            .coordinator
            .update_consultation_status(&fx.doctor, record.id, VisitStatus::WithDoctor)
            .await
            .unwrap();
        assert_eq!(with_doctor.status, VisitStatus::WithDoctor);
        assert!(with_doctor.consultation_start_time.is_some());

        fx.clock.advance(Duration::minutes(15));
        let completed = fx
            .coordinator
            .update_consultation_status(&fx.doctor, record.id, VisitStatus::Completed)
            .await
            .unwrap();
        assert_eq!(completed.status, VisitStatus::Completed);
        assert_eq!(
            completed.consultation_end_time,
            Some(t0 + Duration::minutes(30))
        );
        assert_eq!(completed.triage_summary, Some(summary));

        assert!(fx.coordinator.doctor_queue(&fx.doctor).await.unwrap().is_empty());
        assert!(matches!(
            fx.coordinator.get_status(&patient).await,
            Err(VisitFlowError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_second_patient_reports_position_two() {
        let fx = fixture();
        let first = Caller::patient(Uuid::new_v4());
        let second = Caller::patient(Uuid::new_v4());

        let a = fx.coordinator.join_queue(&first).await.unwrap();
        fx.clock.advance(Duration::seconds(1));
        let b = fx.coordinator.join_queue(&second).await.unwrap();

        // 审核顺序与请求顺序相反，名次仍按请求时间
        fx.coordinator
            .process(&fx.staff, b.id, ProcessRequest::approve("102", fx.doctor.id))
            .await
            .unwrap();
        fx.coordinator
            .process(&fx.staff, a.id, ProcessRequest::approve("101", fx.doctor.id))
            .await
            .unwrap();

        assert_eq!(fx.coordinator.get_status(&first).await.unwrap().position, Some(1));
        assert_eq!(fx.coordinator.get_status(&second).await.unwrap().position, Some(2));
    }

    #[tokio::test]
    async fn test_pending_list_is_fifo() {
        let fx = fixture();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let patient = Caller::patient(Uuid::new_v4());
            ids.push(fx.coordinator.join_queue(&patient).await.unwrap().id);
            fx.clock.advance(Duration::seconds(1));
        }

        let pending: Vec<Uuid> = fx
            .coordinator
            .list_pending(&fx.staff)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(pending, ids);
    }

    #[tokio::test]
    async fn test_triage_requires_owner_and_active_session() {
        let fx = fixture();
        let patient = Caller::patient(Uuid::new_v4());
        let stranger = Caller::patient(Uuid::new_v4());
        let record = fx.approved_visit(&patient).await;

        assert!(matches!(
            fx.coordinator.start_triage(&stranger, record.id).await,
            Err(VisitFlowError::Forbidden(_))
        ));
        assert!(matches!(
            fx.coordinator.submit_triage_answer(&patient, record.id, "Fever").await,
            Err(VisitFlowError::InvalidState(_))
        ));

        fx.coordinator.start_triage(&patient, record.id).await.unwrap();
        assert!(matches!(
            fx.coordinator.start_triage(&patient, record.id).await,
            Err(VisitFlowError::Conflict(_))
        ));
        assert!(matches!(
            fx.coordinator.submit_triage_answer(&stranger, record.id, "Fever").await,
            Err(VisitFlowError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_start_triage_before_approval_is_invalid() {
        let fx = fixture();
        let patient = Caller::patient(Uuid::new_v4());
        let record = fx.coordinator.join_queue(&patient).await.unwrap();

        let result = fx.coordinator.start_triage(&patient, record.id).await;
        assert!(matches!(result, Err(VisitFlowError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_no_sixth_question() {
        let fx = fixture();
        let patient = Caller::patient(Uuid::new_v4());
        let record = fx.waiting_visit(&patient).await;

        assert_eq!(record.status, VisitStatus::Waiting);
        let result = fx
            .coordinator
            .submit_triage_answer(&patient, record.id, "Yes")
            .await;
        assert!(matches!(result, Err(VisitFlowError::InvalidState(_))));
        assert_eq!(fx.store.get(record.id).await.unwrap().symptom_history.len(), 5);
    }

    #[tokio::test]
    async fn test_consultation_requires_assigned_doctor() {
        let fx = fixture();
        let patient = Caller::patient(Uuid::new_v4());
        let record = fx.waiting_visit(&patient).await;
        let other_doctor = Caller::doctor(Uuid::new_v4());

        assert!(matches!(
            fx.coordinator
                .update_consultation_status(&other_doctor, record.id, VisitStatus::WithDoctor)
                .await,
            Err(VisitFlowError::Forbidden(_))
        ));
        assert!(matches!(
            fx.coordinator
                .update_consultation_status(&fx.doctor, record.id, VisitStatus::Completed)
                .await,
            Err(VisitFlowError::InvalidTransition { .. })
        ));
        assert!(matches!(
            fx.coordinator
                .update_consultation_status(&fx.doctor, record.id, VisitStatus::Waiting)
                .await,
            Err(VisitFlowError::InvalidTransition { .. })
        ));
        assert!(matches!(
            fx.coordinator
                .update_consultation_status(&fx.doctor, record.id, VisitStatus::Approved)
                .await,
            Err(VisitFlowError::Validation(_))
        ));

        fx.coordinator
            .update_consultation_status(&fx.doctor, record.id, VisitStatus::WithDoctor)
            .await
            .unwrap();
        assert!(matches!(
            fx.coordinator
                .update_consultation_status(&fx.doctor, record.id, VisitStatus::WithDoctor)
                .await,
            Err(VisitFlowError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_triage_summary_visibility() {
        let fx = fixture();
        let patient = Caller::patient(Uuid::new_v4());
        let stranger = Caller::patient(Uuid::new_v4());
        let record = fx.waiting_visit(&patient).await;

        let report = fx.coordinator.get_triage_summary(&patient, record.id).await.unwrap();
        assert_eq!(report.symptom_history.len(), 5);
        assert!(report.summary.is_some());

        assert!(fx.coordinator.get_triage_summary(&fx.doctor, record.id).await.is_ok());
        assert!(fx.coordinator.get_triage_summary(&fx.staff, record.id).await.is_ok());
        assert!(matches!(
            fx.coordinator.get_triage_summary(&stranger, record.id).await,
            Err(VisitFlowError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_notes_and_priority() {
        let fx = fixture();
        let patient = Caller::patient(Uuid::new_v4());
        let record = fx.coordinator.join_queue(&patient).await.unwrap();

        let updated = fx
            .coordinator
            .update_notes(&fx.staff, record.id, "Wheelchair access")
            .await
            .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("Wheelchair access"));
        assert_eq!(updated.status, VisitStatus::Pending);

        let cleared = fx.coordinator.update_notes(&fx.staff, record.id, "").await.unwrap();
        assert!(cleared.notes.is_none());

        let updated = fx.coordinator.set_priority(&fx.staff, record.id, 1).await.unwrap();
        assert_eq!(updated.priority.value(), 1);
        assert!(matches!(
            fx.coordinator.set_priority(&fx.staff, record.id, 7).await,
            Err(VisitFlowError::Validation(_))
        ));
        assert!(matches!(
            fx.coordinator.update_notes(&patient, record.id, "hi").await,
            Err(VisitFlowError::Forbidden(_))
        ));

        fx.coordinator
            .process(&fx.staff, record.id, ProcessRequest::reject())
            .await
            .unwrap();
        assert!(matches!(
            fx.coordinator.set_priority(&fx.staff, record.id, 2).await,
            Err(VisitFlowError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_queue_stats() {
        let fx = fixture();
        fx.approved_visit(&Caller::patient(Uuid::new_v4())).await;
        fx.coordinator
            .join_queue(&Caller::patient(Uuid::new_v4()))
            .await
            .unwrap();

        let stats = fx.coordinator.queue_stats(&fx.staff).await.unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.active_visits, 2);
        assert_eq!(stats.count(VisitStatus::Pending), 1);
        assert_eq!(stats.count(VisitStatus::Approved), 1);
    }
}
