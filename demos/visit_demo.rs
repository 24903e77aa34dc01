//! 就诊流程演示
//!
//! 使用内存存储走完一次完整就诊：排队、审核、分诊、候诊、就诊。

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use visitflow::core::{Caller, VisitStatus};
use visitflow::store::InMemoryVisitStore;
use visitflow::workflow::{ProcessRequest, TriageStep, VisitCoordinator};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let store = Arc::new(InMemoryVisitStore::new());
    let coordinator = VisitCoordinator::new(store);

    let patient = Caller::patient(Uuid::new_v4());
    let staff = Caller::staff(Uuid::new_v4());
    let doctor = Caller::doctor(Uuid::new_v4());

    // 1. 患者加入队列
    let record = coordinator.join_queue(&patient).await?;
    info!("患者 {} 加入队列，记录 {}", patient.id, record.id);

    let status = coordinator.get_status(&patient).await?;
    info!("当前状态: {}，位置: {:?}", status.record.status, status.position);

    // 2. 服务台批准并分配诊室
    coordinator
        .process(&staff, record.id, ProcessRequest::approve("A-101", doctor.id))
        .await?;
    let status = coordinator.get_status(&patient).await?;
    info!("审核通过，位置: {:?}", status.position);

    // 3. 分诊问答
    let mut question = coordinator.start_triage(&patient, record.id).await?;
    let answers = ["Fever", "1-3 days", "Yes", "No", "No"];
    for answer in answers {
        info!("问: {}  答: {}", question.text, answer);
        match coordinator
            .submit_triage_answer(&patient, record.id, answer)
            .await?
        {
            TriageStep::Next { question: next } => question = next,
            TriageStep::Complete { summary } => {
                info!("分诊摘要:\n{}", serde_json::to_string_pretty(&summary)?);
                break;
            }
        }
    }

    // 4. 医生接诊
    let queue = coordinator.doctor_queue(&doctor).await?;
    info!("医生队列中有 {} 位患者", queue.len());

    coordinator
        .update_consultation_status(&doctor, record.id, VisitStatus::WithDoctor)
        .await?;
    let done = coordinator
        .update_consultation_status(&doctor, record.id, VisitStatus::Completed)
        .await?;
    info!("就诊结束，最终状态: {}", done.status);

    let history = coordinator.visit_history(&patient).await?;
    info!("患者共有 {} 条就诊记录", history.len());

    Ok(())
}
