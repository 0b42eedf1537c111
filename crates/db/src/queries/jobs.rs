//! Job store queries: insert, read, patch and the conditional claim.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobline_core::{Job, JobPatch, JobSource, JobStatus, JobView, NewJob, SourceError};
use sqlx::Row;
use tracing::debug;

use crate::{Database, DbError, DbResult};

const JOB_COLUMNS: &str = "id, owner_id, job_type, status, story_id, storyboard_id, payload, \
     snapshot, progress_version, error_message, created_at, started_at, finished_at, updated_at";

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

/// Filters for listing one owner's jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub story_id: Option<String>,
    pub limit: Option<i64>,
}

struct JobRow(Job);

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for JobRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let payload: String = row.try_get("payload")?;
        let snapshot: String = row.try_get("snapshot")?;
        Ok(Self(Job {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            job_type: row.try_get("job_type")?,
            status: status
                .parse::<JobStatus>()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            story_id: row.try_get("story_id")?,
            storyboard_id: row.try_get("storyboard_id")?,
            payload: serde_json::from_str(&payload).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            snapshot: serde_json::from_str(&snapshot)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            progress_version: row.try_get("progress_version")?,
            error_message: row.try_get("error_message")?,
            created_at: from_millis(row.try_get("created_at")?),
            started_at: row.try_get::<Option<i64>, _>("started_at")?.map(from_millis),
            finished_at: row.try_get::<Option<i64>, _>("finished_at")?.map(from_millis),
            updated_at: from_millis(row.try_get("updated_at")?),
        }))
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

impl Database {
    /// Insert a new job with `status = queued` and `progress_version = 0`.
    pub async fn insert_job(&self, new_job: &NewJob) -> DbResult<Job> {
        let now = now_millis();
        let payload = serde_json::to_string(&new_job.payload)?;
        let snapshot = serde_json::to_string(&new_job.snapshot)?;

        let result = sqlx::query(
            "INSERT INTO jobs (id, owner_id, job_type, status, story_id, storyboard_id, payload,
                               snapshot, progress_version, created_at, updated_at)
             VALUES (?, ?, ?, 'queued', ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&new_job.id)
        .bind(&new_job.owner_id)
        .bind(&new_job.job_type)
        .bind(&new_job.story_id)
        .bind(&new_job.storyboard_id)
        .bind(&payload)
        .bind(&snapshot)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(DbError::DuplicateId(new_job.id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        debug!(job_id = %new_job.id, job_type = %new_job.job_type, "job enqueued");
        Ok(Job {
            id: new_job.id.clone(),
            owner_id: new_job.owner_id.clone(),
            job_type: new_job.job_type.clone(),
            status: JobStatus::Queued,
            story_id: new_job.story_id.clone(),
            storyboard_id: new_job.storyboard_id.clone(),
            payload: new_job.payload.clone(),
            snapshot: new_job.snapshot.clone(),
            progress_version: 0,
            error_message: None,
            created_at: from_millis(now),
            started_at: None,
            finished_at: None,
            updated_at: from_millis(now),
        })
    }

    /// Read a job by id. No side effects.
    pub async fn get_job(&self, job_id: &str) -> DbResult<Job> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
                .bind(job_id)
                .fetch_optional(self.pool())
                .await?;
        row.map(|r| r.0)
            .ok_or_else(|| DbError::NotFound(job_id.to_string()))
    }

    /// Apply a patch to a running job and bump `progress_version` by one in
    /// the same statement. Returns the new version.
    ///
    /// Only the worker holding the claim calls this. Terminal and unclaimed
    /// jobs are rejected untouched.
    pub async fn update_job(&self, job_id: &str, patch: &JobPatch) -> DbResult<i64> {
        if patch.status == JobStatus::Queued {
            return Err(DbError::InvalidPatch(
                "a job cannot be moved back to queued".to_string(),
            ));
        }

        let snapshot = patch
            .snapshot
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let error_message = match patch.status {
            JobStatus::Error => Some(
                patch
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "job failed".to_string()),
            ),
            _ => None,
        };
        let terminal = patch.status.is_terminal();
        let now = now_millis();

        // Terminal writes stamp the outcome into object snapshots so the
        // snapshot never disagrees with the row's status.
        let version: Option<(i64,)> = sqlx::query_as(
            "UPDATE jobs
             SET status = ?1,
                 snapshot = CASE
                     WHEN NOT ?4 THEN COALESCE(?2, snapshot)
                     WHEN NOT json_valid(COALESCE(?2, snapshot)) THEN COALESCE(?2, snapshot)
                     WHEN json_type(COALESCE(?2, snapshot)) <> 'object' THEN COALESCE(?2, snapshot)
                     WHEN ?1 = 'error' THEN json_set(
                         COALESCE(?2, snapshot),
                         '$.status', 'error',
                         '$.stage', 'error',
                         '$.errorMessage', ?3
                     )
                     ELSE json_set(COALESCE(?2, snapshot), '$.status', ?1)
                 END,
                 error_message = ?3,
                 finished_at = CASE WHEN ?4 THEN ?5 ELSE finished_at END,
                 updated_at = ?5,
                 progress_version = progress_version + 1
             WHERE id = ?6 AND status = 'running'
             RETURNING progress_version",
        )
        .bind(patch.status.as_str())
        .bind(snapshot)
        .bind(error_message)
        .bind(terminal)
        .bind(now)
        .bind(job_id)
        .fetch_optional(self.pool())
        .await?;

        match version {
            Some((v,)) => Ok(v),
            None => Err(self.explain_rejected_update(job_id).await?),
        }
    }

    async fn explain_rejected_update(&self, job_id: &str) -> DbResult<DbError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT status FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(self.pool())
            .await?;
        let Some((status,)) = row else {
            return Ok(DbError::NotFound(job_id.to_string()));
        };
        let status = status
            .parse::<JobStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(if status.is_terminal() {
            DbError::JobFinalized {
                id: job_id.to_string(),
                status,
            }
        } else {
            DbError::NotClaimed(job_id.to_string())
        })
    }

    /// Claim the oldest queued job of `job_type`.
    ///
    /// The write is conditioned on the row still being `queued`, so under N
    /// concurrent callers exactly one wins a given row. Losing the race is not
    /// an error: it returns `None`, same as an empty queue.
    pub async fn claim_next_job(&self, job_type: &str) -> DbResult<Option<Job>> {
        let candidate: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM jobs
             WHERE job_type = ? AND status = 'queued'
             ORDER BY created_at ASC, rowid ASC
             LIMIT 1",
        )
        .bind(job_type)
        .fetch_optional(self.pool())
        .await?;

        let Some((candidate_id,)) = candidate else {
            return Ok(None);
        };

        let now = now_millis();
        let claimed: Option<JobRow> = sqlx::query_as(&format!(
            "UPDATE jobs
             SET status = 'running',
                 started_at = ?,
                 updated_at = ?,
                 progress_version = progress_version + 1,
                 snapshot = CASE
                     WHEN NOT json_valid(snapshot) THEN snapshot
                     WHEN json_type(snapshot) = 'object'
                         THEN json_set(snapshot, '$.status', 'running')
                     ELSE snapshot
                 END
             WHERE id = ? AND status = 'queued'
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(now)
        .bind(now)
        .bind(&candidate_id)
        .fetch_optional(self.pool())
        .await?;

        match claimed {
            Some(JobRow(job)) => {
                debug!(job_id = %job.id, job_type, version = job.progress_version, "job claimed");
                Ok(Some(job))
            }
            None => {
                debug!(job_id = %candidate_id, job_type, "claim conflict, another worker won");
                Ok(None)
            }
        }
    }

    /// List one owner's jobs, newest first.
    pub async fn list_jobs_for_owner(&self, owner_id: &str, filter: &JobFilter) -> DbResult<Vec<Job>> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        let status = filter.status.map(|s| s.as_str());

        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE owner_id = ?
               AND (? IS NULL OR status = ?)
               AND (? IS NULL OR story_id = ?)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?"
        ))
        .bind(owner_id)
        .bind(status)
        .bind(status)
        .bind(&filter.story_id)
        .bind(&filter.story_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Running jobs whose claim is older than `older_than`.
    ///
    /// Nothing reclaims these: a worker that died mid-task leaves its job
    /// `running`. This only surfaces them for operators.
    pub async fn find_stalled_jobs(&self, older_than: Duration) -> DbResult<Vec<Job>> {
        let cutoff = now_millis() - older_than.as_millis() as i64;
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE status = 'running' AND started_at < ?
             ORDER BY started_at ASC"
        ))
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

/// In-process reads. Callers here are trusted, so no owner check.
#[async_trait]
impl JobSource for Database {
    async fn fetch_job(&self, job_id: &str) -> Result<JobView, SourceError> {
        match self.get_job(job_id).await {
            Ok(job) => Ok(job.view()),
            Err(DbError::NotFound(id)) => Err(SourceError::NotFound(id)),
            Err(e) => Err(SourceError::Transient(e.to_string())),
        }
    }
}
