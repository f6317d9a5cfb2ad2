//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use fiscal_core::{
  job::IngestJob,
  store::{StoreError, StoreErrorKind},
};
use fiscal_pipeline::PipelineError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("unprocessable: {0}")]
  Unprocessable(String),

  /// An upload that failed a pipeline stage. The failed job is echoed back
  /// so the client can look it up later.
  #[error("{message}")]
  Rejected {
    status:  StatusCode,
    message: String,
    job:     Box<IngestJob>,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Map a store failure by its kind.
  pub fn store<E: StoreError>(err: E) -> Self {
    match err.kind() {
      StoreErrorKind::NotFound => Self::NotFound(err.to_string()),
      StoreErrorKind::Duplicate => Self::Conflict(err.to_string()),
      StoreErrorKind::ReferentialIntegrity | StoreErrorKind::Invalid => {
        Self::Unprocessable(err.to_string())
      }
      StoreErrorKind::Internal => Self::Store(Box::new(err)),
    }
  }
}

fn kind_status(kind: StoreErrorKind) -> StatusCode {
  match kind {
    StoreErrorKind::Duplicate => StatusCode::CONFLICT,
    StoreErrorKind::NotFound => StatusCode::NOT_FOUND,
    StoreErrorKind::ReferentialIntegrity | StoreErrorKind::Invalid => {
      StatusCode::UNPROCESSABLE_ENTITY
    }
    StoreErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl From<PipelineError> for ApiError {
  fn from(err: PipelineError) -> Self {
    match err {
      PipelineError::StageFailure { stage, error, job } => {
        // Codec failures carry no store kind.
        let status = error
          .store_kind()
          .map_or(StatusCode::UNPROCESSABLE_ENTITY, kind_status);
        Self::Rejected {
          status,
          message: format!("{stage} stage failed: {error}"),
          job,
        }
      }
      other @ (PipelineError::Ledger(_) | PipelineError::Io { .. }) => {
        Self::Store(Box::new(other))
      }
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, json!({ "error": m })),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, json!({ "error": m })),
      ApiError::Unprocessable(m) => {
        (StatusCode::UNPROCESSABLE_ENTITY, json!({ "error": m }))
      }
      ApiError::Rejected { status, message, job } => {
        (status, json!({ "error": message, "job": job }))
      }
      ApiError::Store(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": e.to_string() }))
      }
    };
    (status, Json(body)).into_response()
  }
}
