//! SQLite-backed job store.

use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use slidecast_models::{Job, JobId, JobStatus, NewJob};

use crate::config::DbConfig;
use crate::error::{DbError, DbResult};
use crate::metrics::record_operation;
use crate::store::{check_update, JobStore, StatusUpdate};

const CREATE_JOBS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    title         TEXT NOT NULL,
    text_content  TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending'
                  CHECK (status IN ('pending', 'processing', 'done', 'failed')),
    video_path    TEXT,
    error_message TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
)
"#;

const CREATE_STATUS_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs (status)";

const SELECT_JOB: &str = "SELECT id, title, text_content, status, video_path, error_message, \
                          created_at, updated_at FROM jobs";

/// Row shape of the `jobs` table.
#[derive(Debug, FromRow)]
struct JobRow {
    id: i64,
    title: String,
    text_content: String,
    status: String,
    video_path: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = DbError;

    fn try_from(row: JobRow) -> DbResult<Self> {
        let status = JobStatus::from_str(&row.status)
            .map_err(|e| DbError::Corrupt(format!("job {}: {}", row.id, e)))?;

        Ok(Job {
            id: JobId(row.id),
            title: row.title,
            text_content: row.text_content,
            status,
            video_path: row.video_path,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A [`JobStore`] persisted in a SQLite database.
///
/// Status writes are compare-and-set on the previous status, so concurrent
/// writers from several connections cannot both leave the same state.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Connect using `config`, creating the database file and schema if needed.
    pub async fn connect(config: &DbConfig) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        let filename = options.get_filename();
        if let Some(parent) = filename.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DbError::Sqlx(sqlx::Error::Io(e)))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.bootstrap().await?;

        info!(
            max_connections = config.max_connections,
            "Connected job store at {}",
            config.database_url
        );
        Ok(store)
    }

    /// Wrap an existing pool. The schema is created if missing.
    pub async fn from_pool(pool: SqlitePool) -> DbResult<Self> {
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    async fn bootstrap(&self) -> DbResult<()> {
        sqlx::query(CREATE_JOBS_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_STATUS_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    /// Check database connectivity.
    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch(&self, id: JobId) -> DbResult<Job> {
        let row: Option<JobRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_JOB))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or(DbError::NotFound(id))?.try_into()
    }

    async fn write_status(&self, id: JobId, update: StatusUpdate) -> DbResult<Job> {
        let current = self.fetch(id).await?;
        check_update(&current, &update)?;

        let result = sqlx::query(
            "UPDATE jobs SET status = ?, video_path = ?, error_message = ?, updated_at = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(update.status.as_str())
        .bind(update.video_path.as_deref())
        .bind(update.error_message.as_deref())
        .bind(Utc::now())
        .bind(id.get())
        .bind(current.status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Another writer moved the job between our read and write.
            let latest = self.fetch(id).await?;
            debug!(job_id = %id, from = %latest.status, to = %update.status, "Lost status race");
            return Err(DbError::InvalidTransition {
                id,
                from: latest.status,
                to: update.status,
            });
        }

        self.fetch(id).await
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, new_job: NewJob) -> DbResult<Job> {
        let started = Instant::now();
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO jobs (title, text_content, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&new_job.title)
        .bind(&new_job.text_content)
        .bind(JobStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        record_operation("create", result.is_ok(), started);
        let id = JobId(result?.last_insert_rowid());
        debug!(job_id = %id, "Created job");

        // Reload so timestamps carry the stored precision.
        self.fetch(id).await
    }

    async fn get(&self, id: JobId) -> DbResult<Job> {
        let started = Instant::now();
        let result = self.fetch(id).await;
        record_operation("get", result.is_ok() || matches!(result, Err(DbError::NotFound(_))), started);
        result
    }

    async fn update_status(&self, id: JobId, update: StatusUpdate) -> DbResult<Job> {
        let started = Instant::now();
        let result = self.write_status(id, update).await;
        record_operation("update_status", result.is_ok(), started);
        result
    }

    async fn list_by_status(&self, status: JobStatus) -> DbResult<Vec<Job>> {
        let started = Instant::now();
        let rows: Result<Vec<JobRow>, sqlx::Error> =
            sqlx::query_as(&format!("{} WHERE status = ? ORDER BY id", SELECT_JOB))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await;

        record_operation("list_by_status", rows.is_ok(), started);
        rows?.into_iter().map(Job::try_from).collect()
    }
}
