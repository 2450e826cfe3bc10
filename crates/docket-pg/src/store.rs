use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docket_core::domain::{
    StoreError, Task, TaskHistory, TaskId, TaskType, TaskTypeId, reclaim_cutoff,
};
use docket_core::ports::{ClaimSpec, Claimed, Insertion, TaskFilter, TaskStore};
use docket_core::scheduling::SchedulingStrategy;
use sqlx::PgConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::store_error;
use crate::ordering::order_by;
use crate::rows::{self, HISTORY_COLUMNS, TASK_COLUMNS, TASK_TYPE_COLUMNS, db_int, db_revision};

/// PostgreSQL-backed store. Cloning shares the pool.
#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn append_history(conn: &mut PgConnection, history: &TaskHistory) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO task_history (id, task_id, status_change, worker_id, message, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(history.id.to_ulid_string())
    .bind(history.task_id.to_ulid_string())
    .bind(history.status_change.as_str())
    .bind(history.worker_id.as_deref())
    .bind(history.message.as_deref())
    .bind(history.timestamp)
    .execute(conn)
    .await
    .map_err(store_error)?;
    Ok(())
}

async fn find_open_duplicate(
    conn: &mut PgConnection,
    dedup_key: &str,
) -> Result<Option<Task>, StoreError> {
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks \
         WHERE dedup_key = $1 AND status IN ('pending', 'claimed')"
    );
    let row = sqlx::query(&sql)
        .bind(dedup_key)
        .fetch_optional(conn)
        .await
        .map_err(store_error)?;
    row.as_ref().map(rows::task).transpose()
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn upsert_task_type(&self, candidate: TaskType) -> Result<TaskType, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO task_types (id, name, version, parameter_schema, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, TRUE, $5, $6)
            ON CONFLICT (name) DO UPDATE
            SET version = EXCLUDED.version,
                parameter_schema = EXCLUDED.parameter_schema,
                active = TRUE,
                updated_at = EXCLUDED.updated_at
            RETURNING {TASK_TYPE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(candidate.id.to_ulid_string())
            .bind(&candidate.name)
            .bind(&candidate.version)
            .bind(&candidate.parameter_schema)
            .bind(candidate.created_at)
            .bind(candidate.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;
        rows::task_type(&row)
    }

    async fn set_task_type_active(
        &self,
        name: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskType>, StoreError> {
        let sql = format!(
            "UPDATE task_types SET active = $2, updated_at = $3 WHERE name = $1 \
             RETURNING {TASK_TYPE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .bind(active)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.as_ref().map(rows::task_type).transpose()
    }

    async fn task_type_by_name(&self, name: &str) -> Result<Option<TaskType>, StoreError> {
        let sql = format!("SELECT {TASK_TYPE_COLUMNS} FROM task_types WHERE name = $1");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.as_ref().map(rows::task_type).transpose()
    }

    async fn task_type(&self, id: TaskTypeId) -> Result<Option<TaskType>, StoreError> {
        let sql = format!("SELECT {TASK_TYPE_COLUMNS} FROM task_types WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.to_ulid_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.as_ref().map(rows::task_type).transpose()
    }

    async fn list_task_types(&self, active_only: bool) -> Result<Vec<TaskType>, StoreError> {
        let sql = format!(
            "SELECT {TASK_TYPE_COLUMNS} FROM task_types \
             WHERE active OR NOT $1 ORDER BY name"
        );
        let found = sqlx::query(&sql)
            .bind(active_only)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        found.iter().map(rows::task_type).collect()
    }

    async fn insert_task(&self, task: Task, history: TaskHistory) -> Result<Insertion, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO tasks (id, task_type_id, task_type, status, parameters, dedup_key,
                               priority, attempts, max_attempts, created_at, revision)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (dedup_key) WHERE status IN ('pending', 'claimed') DO NOTHING
            "#,
        )
        .bind(task.id.to_ulid_string())
        .bind(task.task_type_id.to_ulid_string())
        .bind(&task.task_type)
        .bind(task.status.as_str())
        .bind(&task.parameters)
        .bind(&task.dedup_key)
        .bind(task.priority)
        .bind(db_int(task.attempts, "attempts")?)
        .bind(db_int(task.max_attempts, "max_attempts")?)
        .bind(task.created_at)
        .bind(db_revision(task.revision)?)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        if inserted.rows_affected() == 0 {
            // the holder may have finished in between; the retry inserts afresh
            let existing = find_open_duplicate(&mut tx, &task.dedup_key)
                .await?
                .ok_or_else(|| {
                    StoreError::Conflict(format!("dedup key {} changed hands", task.dedup_key))
                })?;
            tx.commit().await.map_err(store_error)?;
            tracing::debug!(
                task_id = %existing.id,
                dedup_key = %task.dedup_key,
                "insert skipped; open duplicate exists"
            );
            return Ok(Insertion::Existing(existing));
        }

        append_history(&mut tx, &history).await?;
        tx.commit().await.map_err(store_error)?;
        Ok(Insertion::Created(task))
    }

    async fn claim_task(
        &self,
        spec: &ClaimSpec,
        strategy: &dyn SchedulingStrategy,
    ) -> Result<Option<Claimed>, StoreError> {
        let cutoff = reclaim_cutoff(spec.now, spec.claim_timeout);
        let batch = i64::try_from(spec.candidate_batch).unwrap_or(i64::MAX).max(1);

        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // rows locked by a concurrent claim are skipped, not waited on
        let sql = format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE task_type_id = $1
              AND (status = 'pending' OR (status = 'claimed' AND claimed_at < $2))
            ORDER BY {order}
            LIMIT $3
            FOR UPDATE SKIP LOCKED
            "#,
            order = order_by(strategy.sort()),
        );
        let found = sqlx::query(&sql)
            .bind(spec.task_type_id.to_ulid_string())
            .bind(cutoff)
            .bind(batch)
            .fetch_all(&mut *tx)
            .await
            .map_err(store_error)?;
        let candidates = found.iter().map(rows::task).collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(
            task_type_id = %spec.task_type_id,
            worker_id = %spec.worker_id,
            candidates = candidates.len(),
            "claim candidates locked"
        );

        let Some(mut task) = strategy.select(&candidates).cloned() else {
            tx.rollback().await.map_err(store_error)?;
            return Ok(None);
        };

        let expected_revision = task.revision;
        let previous_worker = task.claimed_by.clone();
        let Some(transition) = task.claim(&spec.worker_id, spec.now, spec.claim_timeout) else {
            tx.rollback().await.map_err(store_error)?;
            return Ok(None);
        };

        let updated = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2,
                claimed_by = $3,
                claimed_at = $4,
                attempts = $5,
                progress = NULL,
                progress_message = NULL,
                revision = $6
            WHERE id = $1
              AND revision = $7
            "#,
        )
        .bind(task.id.to_ulid_string())
        .bind(task.status.as_str())
        .bind(task.claimed_by.as_deref())
        .bind(task.claimed_at)
        .bind(db_int(task.attempts, "attempts")?)
        .bind(db_revision(task.revision)?)
        .bind(db_revision(expected_revision)?)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "task {} changed while being claimed",
                task.id
            )));
        }

        let history = TaskHistory::new(spec.history_id, task.id, transition, spec.now)
            .by_worker(spec.worker_id.clone());
        append_history(&mut tx, &history).await?;
        tx.commit().await.map_err(store_error)?;

        Ok(Some(Claimed {
            task,
            transition,
            previous_worker,
        }))
    }

    async fn update_task(
        &self,
        expected_revision: u64,
        task: &Task,
        history: &TaskHistory,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let updated = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2,
                result = $3,
                error_message = $4,
                attempts = $5,
                claimed_by = $6,
                claimed_at = $7,
                completed_at = $8,
                progress = $9,
                progress_message = $10,
                revision = $11
            WHERE id = $1
              AND revision = $12
            "#,
        )
        .bind(task.id.to_ulid_string())
        .bind(task.status.as_str())
        .bind(task.result.as_ref())
        .bind(task.error_message.as_deref())
        .bind(db_int(task.attempts, "attempts")?)
        .bind(task.claimed_by.as_deref())
        .bind(task.claimed_at)
        .bind(task.completed_at)
        .bind(task.progress.map(i16::from))
        .bind(task.progress_message.as_deref())
        .bind(db_revision(task.revision)?)
        .bind(db_revision(expected_revision)?)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "task {} changed concurrently (expected revision {expected_revision})",
                task.id
            )));
        }

        append_history(&mut tx, history).await?;
        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.to_ulid_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.as_ref().map(rows::task).transpose()
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let sql = format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE ($1::text IS NULL OR task_type_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#
        );
        let found = sqlx::query(&sql)
            .bind(filter.task_type_id.map(|id| id.to_ulid_string()))
            .bind(filter.status.map(|status| status.as_str()))
            .bind(i64::try_from(filter.limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        found.iter().map(rows::task).collect()
    }

    async fn task_history(&self, id: TaskId) -> Result<Vec<TaskHistory>, StoreError> {
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM task_history WHERE task_id = $1 ORDER BY seq"
        );
        let found = sqlx::query(&sql)
            .bind(id.to_ulid_string())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        found.iter().map(rows::history).collect()
    }
}
