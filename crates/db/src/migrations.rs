/// Inline SQL migrations for the jobline database schema.
///
/// We use simple inline migrations rather than sqlx migration files
/// because the schema is small and self-contained. Entries are append-only:
/// the index in this slice is the migration version.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: jobs table
    r#"
CREATE TABLE IF NOT EXISTS jobs (
    id               TEXT PRIMARY KEY,
    owner_id         TEXT NOT NULL,
    job_type         TEXT NOT NULL,
    status           TEXT NOT NULL DEFAULT 'queued'
                     CHECK (status IN ('queued', 'running', 'done', 'error')),
    payload          TEXT NOT NULL DEFAULT '{}',
    snapshot         TEXT NOT NULL DEFAULT '{}',
    progress_version INTEGER NOT NULL DEFAULT 0,
    error_message    TEXT,
    created_at       INTEGER NOT NULL,
    started_at       INTEGER,
    finished_at      INTEGER,
    updated_at       INTEGER NOT NULL
);
"#,
    // Migration 2: claim lookup (oldest queued job of a type)
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs(job_type, status, created_at);"#,
    // Migration 3: per-owner listing
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_owner ON jobs(owner_id, created_at DESC);"#,
    // Migration 4: story association
    r#"ALTER TABLE jobs ADD COLUMN story_id TEXT;"#,
    // Migration 5: storyboard association
    r#"ALTER TABLE jobs ADD COLUMN storyboard_id TEXT;"#,
    // Migration 6: per-story lookup
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_story ON jobs(story_id);"#,
];
