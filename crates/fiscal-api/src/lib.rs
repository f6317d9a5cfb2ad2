//! JSON REST API for the fiscal document warehouse.
//!
//! Exposes an axum [`Router`] backed by any [`fiscal_core::store::FiscalStore`]
//! and the [`Pipeline`] that writes into it. TLS and transport concerns are
//! the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api/v1", fiscal_api::api_router(pipeline.clone()))
//! ```

pub mod analytics;
pub mod documents;
pub mod error;
pub mod ingest;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use fiscal_core::store::FiscalStore;
use fiscal_pipeline::Pipeline;

pub use error::ApiError;

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:    Arc<S>,
  pub pipeline: Pipeline<S>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      pipeline: self.pipeline.clone(),
    }
  }
}

/// Build a fully-materialised API router around `pipeline` and its store.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(pipeline: Pipeline<S>) -> Router<()>
where
  S: FiscalStore + 'static,
{
  let state = ApiState {
    store: Arc::clone(pipeline.store()),
    pipeline,
  };

  Router::new()
    .route("/status", get(ingest::status::<S>))
    // Ingestion
    .route("/xml/upload", post(ingest::upload::<S>))
    .route("/xml/status/{job_id}", get(ingest::job_status::<S>))
    .route("/xml/jobs", get(ingest::jobs::<S>))
    // Documents
    .route("/documents", get(documents::list::<S>))
    .route("/documents/nfe/{key}", get(documents::nfe::<S>))
    .route("/documents/nfse/{id}", get(documents::nfse::<S>))
    // Analytics
    .route("/analytics/suppliers", get(analytics::suppliers::<S>))
    .route("/analytics/products", get(analytics::products::<S>))
    .route("/analytics/taxes", get(analytics::taxes::<S>))
    .with_state(state)
}
