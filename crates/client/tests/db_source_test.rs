//! Waiting on a job in-process, straight against the store.

use std::time::Duration;

use jobline_client::{wait_for_job, WaitError, WaitOptions};
use jobline_core::{JobPatch, JobStatus, NewJob};
use jobline_db::Database;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn fast_options() -> WaitOptions {
    WaitOptions {
        timeout: Duration::from_secs(5),
        min_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(50),
        ..WaitOptions::default()
    }
}

#[tokio::test]
async fn test_wait_on_database_until_done() {
    let db = Database::new_in_memory().await.unwrap();
    let job = db
        .insert_job(&NewJob::new("user-1", "generate_outline", json!({})))
        .await
        .unwrap();

    let worker_db = db.clone();
    let job_id = job.id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        worker_db.claim_next_job("generate_outline").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        worker_db
            .update_job(&job_id, &JobPatch::done(json!({ "outline": ["intro"] })))
            .await
            .unwrap();
    });

    let view = wait_for_job(&db, &job.id, &fast_options(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(view.status, JobStatus::Done);
    assert_eq!(view.snapshot, json!({ "outline": ["intro"], "status": "done" }));
}

#[tokio::test]
async fn test_wait_on_missing_job() {
    let db = Database::new_in_memory().await.unwrap();
    let err = wait_for_job(&db, "nope", &fast_options(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WaitError::NotFound(_)));
}
