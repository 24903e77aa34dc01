//! PostgreSQL就诊记录存储

use crate::models::{DbVisitRecord, VisitRow};
use crate::store::{Expected, VisitFilter, VisitStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;
use visitflow_core::{Result, VisitFlowError, VisitRecord, VisitStatus};

const SELECT_COLUMNS: &str = "id, sequence, patient_id, status, assigned_doctor_id, room_number, \
    priority, request_time, approval_time, triage_start_time, triage_end_time, \
    consultation_start_time, consultation_end_time, symptom_history, triage_summary, \
    notes, version, updated_at";

const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL存储
#[derive(Debug, Clone)]
pub struct PgVisitStore {
    pool: PgPool,
}

impl PgVisitStore {
    /// 建立连接池
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        tracing::info!("Connected to PostgreSQL with up to {} connections", max_connections);
        Ok(Self { pool })
    }

    /// 创建数据库表与索引
    pub async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visit_records (
                id UUID PRIMARY KEY,
                sequence BIGSERIAL NOT NULL,
                patient_id UUID NOT NULL,
                status VARCHAR(32) NOT NULL,
                assigned_doctor_id UUID,
                room_number VARCHAR(32),
                priority SMALLINT NOT NULL DEFAULT 3 CHECK (priority BETWEEN 1 AND 5),
                request_time TIMESTAMP WITH TIME ZONE NOT NULL,
                approval_time TIMESTAMP WITH TIME ZONE,
                triage_start_time TIMESTAMP WITH TIME ZONE,
                triage_end_time TIMESTAMP WITH TIME ZONE,
                consultation_start_time TIMESTAMP WITH TIME ZONE,
                consultation_end_time TIMESTAMP WITH TIME ZONE,
                symptom_history TEXT NOT NULL DEFAULT '[]',
                triage_summary TEXT,
                notes TEXT,
                version BIGINT NOT NULL DEFAULT 1,
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // 同一患者至多一条活跃记录
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS visit_records_one_active_per_patient
            ON visit_records (patient_id)
            WHERE status IN ('pending', 'approved', 'in_triage', 'waiting', 'with_doctor')
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS visit_records_status_time \
             ON visit_records (status, request_time, sequence)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS visit_records_doctor_status \
             ON visit_records (assigned_doctor_id, status)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Visit record tables ready");
        Ok(())
    }

    fn map_insert_error(err: sqlx::Error, record: &VisitRecord) -> VisitFlowError {
        let unique_violation = err
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code == UNIQUE_VIOLATION)
            .unwrap_or(false);

        if unique_violation {
            VisitFlowError::Conflict(format!(
                "Patient {} already has an active visit",
                record.patient_id
            ))
        } else {
            VisitFlowError::from(err)
        }
    }
}

#[async_trait]
impl VisitStore for PgVisitStore {
    async fn insert_if_no_active(&self, record: VisitRecord) -> Result<VisitRecord> {
        let row = VisitRow::from_record(&record)?;

        let sql = format!(
            "INSERT INTO visit_records (id, patient_id, status, assigned_doctor_id, room_number, \
             priority, request_time, approval_time, triage_start_time, triage_end_time, \
             consultation_start_time, consultation_end_time, symptom_history, triage_summary, \
             notes, version, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, 1, $16) \
             RETURNING {}",
            SELECT_COLUMNS
        );

        let inserted: DbVisitRecord = sqlx::query_as(&sql)
            .bind(record.id)
            .bind(record.patient_id)
            .bind(record.status.as_str())
            .bind(record.assigned_doctor_id)
            .bind(&record.room_number)
            .bind(row.priority)
            .bind(record.request_time)
            .bind(record.approval_time)
            .bind(record.triage_start_time)
            .bind(record.triage_end_time)
            .bind(record.consultation_start_time)
            .bind(record.consultation_end_time)
            .bind(&row.symptom_history)
            .bind(&row.triage_summary)
            .bind(&record.notes)
            .bind(record.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::map_insert_error(e, &record))?;

        VisitRecord::try_from(inserted)
    }

    async fn get(&self, id: Uuid) -> Result<VisitRecord> {
        let sql = format!("SELECT {} FROM visit_records WHERE id = $1", SELECT_COLUMNS);
        let row: Option<DbVisitRecord> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => VisitRecord::try_from(row),
            None => Err(VisitFlowError::NotFound(format!("Visit {} not found", id))),
        }
    }

    async fn find_active_by_patient(&self, patient_id: Uuid) -> Result<Option<VisitRecord>> {
        let active: Vec<String> = VisitStatus::ACTIVE.iter().map(|s| s.as_str().to_string()).collect();
        let sql = format!(
            "SELECT {} FROM visit_records WHERE patient_id = $1 AND status = ANY($2) LIMIT 1",
            SELECT_COLUMNS
        );

        let row: Option<DbVisitRecord> = sqlx::query_as(&sql)
            .bind(patient_id)
            .bind(active)
            .fetch_optional(&self.pool)
            .await?;

        row.map(VisitRecord::try_from).transpose()
    }

    async fn query(&self, filter: &VisitFilter) -> Result<Vec<VisitRecord>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM visit_records WHERE TRUE", SELECT_COLUMNS));

        if let Some(patient_id) = filter.patient_id {
            builder.push(" AND patient_id = ").push_bind(patient_id);
        }

        if let Some(doctor_id) = filter.doctor_id {
            builder.push(" AND assigned_doctor_id = ").push_bind(doctor_id);
        }

        if let Some(statuses) = &filter.statuses {
            let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            builder.push(" AND status = ANY(").push_bind(statuses).push(")");
        }

        if filter.newest_first {
            builder.push(" ORDER BY request_time DESC, sequence DESC");
        } else {
            builder.push(" ORDER BY request_time ASC, sequence ASC");
        }

        let rows: Vec<DbVisitRecord> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(VisitRecord::try_from).collect()
    }

    async fn count_ahead(
        &self,
        status: VisitStatus,
        request_time: DateTime<Utc>,
        sequence: u64,
    ) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM visit_records \
             WHERE status = $1 AND (request_time < $2 OR (request_time = $2 AND sequence < $3))",
        )
        .bind(status.as_str())
        .bind(request_time)
        .bind(sequence as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    async fn compare_and_swap(&self, expected: Expected, updated: VisitRecord) -> Result<VisitRecord> {
        if updated.id != expected.id {
            return Err(VisitFlowError::Internal(format!(
                "Update for visit {} submitted against visit {}",
                updated.id, expected.id
            )));
        }

        let row = VisitRow::from_record(&updated)?;
        let sql = format!(
            "UPDATE visit_records SET status = $1, assigned_doctor_id = $2, room_number = $3, \
             priority = $4, approval_time = $5, triage_start_time = $6, triage_end_time = $7, \
             consultation_start_time = $8, consultation_end_time = $9, symptom_history = $10, \
             triage_summary = $11, notes = $12, updated_at = $13, version = version + 1 \
             WHERE id = $14 AND status = $15 AND version = $16 \
             RETURNING {}",
            SELECT_COLUMNS
        );

        let written: Option<DbVisitRecord> = sqlx::query_as(&sql)
            .bind(updated.status.as_str())
            .bind(updated.assigned_doctor_id)
            .bind(&updated.room_number)
            .bind(row.priority)
            .bind(updated.approval_time)
            .bind(updated.triage_start_time)
            .bind(updated.triage_end_time)
            .bind(updated.consultation_start_time)
            .bind(updated.consultation_end_time)
            .bind(&row.symptom_history)
            .bind(&row.triage_summary)
            .bind(&updated.notes)
            .bind(updated.updated_at)
            .bind(expected.id)
            .bind(expected.status.as_str())
            .bind(expected.version as i64)
            .fetch_optional(&self.pool)
            .await?;

        match written {
            Some(row) => VisitRecord::try_from(row),
            None => {
                // 区分记录不存在与并发修改
                let current = self.get(expected.id).await?;
                tracing::warn!(
                    "Rejected stale write to visit {}: expected {}@v{}, found {}@v{}",
                    expected.id,
                    expected.status,
                    expected.version,
                    current.status,
                    current.version
                );
                Err(VisitFlowError::Conflict(format!(
                    "Visit {} was modified concurrently (now {})",
                    expected.id, current.status
                )))
            }
        }
    }
}
