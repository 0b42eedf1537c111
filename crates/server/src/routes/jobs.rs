// crates/server/src/routes/jobs.rs
//! API routes for durable jobs.
//!
//! - POST /jobs: enqueue a job, 202 with its id
//! - GET  /jobs: caller's jobs, newest first
//! - GET  /jobs/{id}: polling read of one job
//! - GET  /jobs/{id}/events: SSE progress stream

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::routing::get;
use axum::{Json, Router};
use jobline_core::{EnqueuedJob, Job, JobStatus, JobView, NewJob};
use jobline_db::{DbError, JobFilter};
use serde::Deserialize;
use serde_json::Value;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::jobs::{job_events, last_event_id};
use crate::metrics::record_enqueued;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub story_id: Option<String>,
    #[serde(default)]
    pub storyboard_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub story_id: Option<String>,
    pub limit: Option<i64>,
}

/// Load a job the caller owns: 404 when absent, 403 when someone else's.
async fn load_owned_job(state: &AppState, user: &AuthUser, job_id: &str) -> ApiResult<Job> {
    let job = state.db.get_job(job_id).await.map_err(|e| match e {
        DbError::NotFound(id) => ApiError::JobNotFound(id),
        other => ApiError::Database(other),
    })?;
    if !job.is_owned_by(user.id()) {
        return Err(ApiError::Forbidden(job_id.to_string()));
    }
    Ok(job)
}

/// POST /api/jobs: persist a queued job and kick its worker loops.
async fn enqueue_job(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<EnqueueRequest>,
) -> ApiResult<(StatusCode, Json<EnqueuedJob>)> {
    if body.job_type.trim().is_empty() {
        return Err(ApiError::BadRequest("job type is required".to_string()));
    }
    if !state.handlers.contains(&body.job_type) {
        return Err(ApiError::UnknownJobType(body.job_type));
    }

    let payload = body.payload.unwrap_or_else(|| Value::Object(Default::default()));
    let new_job = NewJob::new(user.id(), body.job_type.as_str(), payload)
        .with_story(body.story_id, body.storyboard_id);
    let job = state.db.insert_job(&new_job).await?;

    record_enqueued(&job.job_type);
    state.kicks.kick(&job.job_type);
    tracing::info!(job_id = %job.id, job_type = %job.job_type, owner_id = %job.owner_id, "Job enqueued");

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueuedJob {
            job_id: job.id,
            status: JobStatus::Queued,
        }),
    ))
}

/// GET /api/jobs: the caller's jobs.
async fn list_jobs(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let filter = JobFilter {
        status,
        story_id: query.story_id,
        limit: query.limit,
    };
    let jobs = state.db.list_jobs_for_owner(user.id(), &filter).await?;
    Ok(Json(jobs))
}

/// GET /api/jobs/{id}: current view of one job.
///
/// Also kicks every loop, so a poller nudges work along even if the
/// enqueue-time kick was missed.
async fn get_job(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobView>> {
    state.kicks.kick_all();
    let job = load_owned_job(&state, &user, &job_id).await?;
    Ok(Json(job.view()))
}

/// GET /api/jobs/{id}/events: SSE progress, resumable via `Last-Event-ID`.
async fn job_events_stream(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    state.kicks.kick_all();
    let job = load_owned_job(&state, &user, &job_id).await?;
    let cursor = last_event_id(&headers);
    tracing::debug!(job_id = %job_id, cursor = ?cursor, "Progress stream opened");

    let stream = job_events(
        state.db.clone(),
        job,
        user.0,
        cursor,
        state.config.stream.clone(),
        state.shutdown.clone(),
    );
    Ok(Sse::new(stream))
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs).post(enqueue_job))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/events", get(job_events_stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::test_support::test_app;

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn get_as(uri: &str, user: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_as(uri: &str, user: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-user-id", user)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_returns_202() {
        let t = test_app().await;
        let (status, body) = send(
            t.app.clone(),
            post_as(
                "/api/jobs",
                "user-1",
                json!({ "type": "echo", "payload": { "text": "hi" }, "storyId": "s-1" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "queued");
        let job_id = body["jobId"].as_str().unwrap();

        let job = t.state.db.get_job(job_id).await.unwrap();
        assert_eq!(job.owner_id, "user-1");
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.payload, json!({ "text": "hi" }));
        assert_eq!(job.story_id.as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn test_enqueue_unknown_type_is_400() {
        let t = test_app().await;
        let (status, body) = send(
            t.app.clone(),
            post_as("/api/jobs", "user-1", json!({ "type": "render_movie" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unknown job type");
    }

    #[tokio::test]
    async fn test_enqueue_requires_identity() {
        let t = test_app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/jobs")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "type": "echo" }).to_string()))
            .unwrap();
        let (status, _) = send(t.app.clone(), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_get_job_statuses() {
        let t = test_app().await;
        let job = t
            .state
            .db
            .insert_job(&NewJob::new("user-1", "echo", json!({})))
            .await
            .unwrap();
        let uri = format!("/api/jobs/{}", job.id);

        let (status, body) = send(t.app.clone(), get_as(&uri, Some("user-1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "id": job.id,
                "type": "echo",
                "status": "queued",
                "snapshot": { "status": "queued" }
            })
        );

        let (status, _) = send(t.app.clone(), get_as(&uri, Some("user-2"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(t.app.clone(), get_as(&uri, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(t.app.clone(), get_as("/api/jobs/missing", Some("user-1"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_failed_job_includes_error_message() {
        let t = test_app().await;
        let job = t
            .state
            .db
            .insert_job(&NewJob::new("user-1", "echo", json!({})))
            .await
            .unwrap();
        t.state.db.claim_next_job("echo").await.unwrap();
        t.state
            .db
            .update_job(&job.id, &jobline_core::JobPatch::failed("no video url"))
            .await
            .unwrap();

        let (status, body) =
            send(t.app.clone(), get_as(&format!("/api/jobs/{}", job.id), Some("user-1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert_eq!(body["errorMessage"], "no video url");
    }

    #[tokio::test]
    async fn test_list_jobs_scoped_to_caller() {
        let t = test_app().await;
        for owner in ["user-1", "user-1", "user-2"] {
            t.state
                .db
                .insert_job(&NewJob::new(owner, "echo", json!({})))
                .await
                .unwrap();
        }

        let (status, body) = send(t.app.clone(), get_as("/api/jobs", Some("user-1"))).await;
        assert_eq!(status, StatusCode::OK);
        let jobs = body.as_array().unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j["ownerId"] == "user-1"));

        let (status, body) =
            send(t.app.clone(), get_as("/api/jobs?status=done&limit=5", Some("user-1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());

        let (status, _) =
            send(t.app.clone(), get_as("/api/jobs?status=cancelled", Some("user-1"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_events_route_checks_access_before_streaming() {
        let t = test_app().await;
        let job = t
            .state
            .db
            .insert_job(&NewJob::new("user-1", "echo", json!({})))
            .await
            .unwrap();
        let uri = format!("/api/jobs/{}/events", job.id);

        let (status, _) = send(t.app.clone(), get_as(&uri, Some("user-2"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(t.app.clone(), get_as(&uri, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) =
            send(t.app.clone(), get_as("/api/jobs/missing/events", Some("user-1"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
