//! Handlers for status and XML ingestion endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/status` | Job counts per status; fails if the store is unreachable |
//! | `POST` | `/xml/upload` | Raw XML body, `?file_name=`; 201 + job, or 200 + job for a byte-identical file |
//! | `GET`  | `/xml/status/:job_id` | Single job |
//! | `GET`  | `/xml/jobs` | Most recent jobs, `?limit=` (default 50) |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use bytes::Bytes;
use fiscal_core::{
  job::{IngestJob, JobCounts, JobStatus},
  store::FiscalStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

const DEFAULT_JOB_LIMIT: usize = 50;
const MAX_JOB_LIMIT: usize = 1000;

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusBody {
  pub status: String,
  pub jobs:   JobCounts,
}

/// `GET /status`
pub async fn status<S: FiscalStore>(
  State(state): State<ApiState<S>>,
) -> Result<Json<StatusBody>, ApiError> {
  let jobs = state.store.job_counts().await.map_err(ApiError::store)?;
  Ok(Json(StatusBody { status: "ok".to_owned(), jobs }))
}

// ─── Upload ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct UploadParams {
  /// Recorded on the job. Defaults to `upload.xml`.
  pub file_name: Option<String>,
}

/// `POST /xml/upload[?file_name=...]`, body is the XML file.
pub async fn upload<S: FiscalStore>(
  State(state): State<ApiState<S>>,
  Query(params): Query<UploadParams>,
  body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
  if body.is_empty() {
    return Err(ApiError::BadRequest("request body is empty".into()));
  }
  let file_name = params
    .file_name
    .filter(|name| !name.trim().is_empty())
    .unwrap_or_else(|| "upload.xml".to_owned());

  let job = state.pipeline.ingest(&file_name, &body).await?;
  let status = match job.status {
    JobStatus::Duplicate => StatusCode::OK,
    _ => StatusCode::CREATED,
  };
  Ok((status, Json(job)))
}

// ─── Jobs ────────────────────────────────────────────────────────────────────

/// `GET /xml/status/:job_id`
pub async fn job_status<S: FiscalStore>(
  State(state): State<ApiState<S>>,
  Path(job_id): Path<Uuid>,
) -> Result<Json<IngestJob>, ApiError> {
  let job = state
    .store
    .get_job(job_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("job {job_id} not found")))?;
  Ok(Json(job))
}

#[derive(Debug, Deserialize, Default)]
pub struct JobsParams {
  pub limit: Option<usize>,
}

/// `GET /xml/jobs[?limit=...]`
pub async fn jobs<S: FiscalStore>(
  State(state): State<ApiState<S>>,
  Query(params): Query<JobsParams>,
) -> Result<Json<Vec<IngestJob>>, ApiError> {
  let limit = params.limit.unwrap_or(DEFAULT_JOB_LIMIT).min(MAX_JOB_LIMIT);
  let jobs = state.store.list_jobs(limit).await.map_err(ApiError::store)?;
  Ok(Json(jobs))
}
