//! Error types for `fiscal-pipeline`.

use std::path::PathBuf;

use fiscal_core::{
  job::{IngestJob, Stage},
  store::{StoreError, StoreErrorKind},
};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a stage rejected its input.
#[derive(Debug, Error)]
pub enum StageError {
  #[error(transparent)]
  Xml(#[from] fiscal_xml::Error),

  #[error("{source}")]
  Store {
    kind:   StoreErrorKind,
    #[source]
    source: BoxError,
  },
}

impl StageError {
  pub(crate) fn store<E: StoreError>(err: E) -> Self {
    Self::Store { kind: err.kind(), source: Box::new(err) }
  }

  /// The store's classification of the failure, if the store raised it.
  pub fn store_kind(&self) -> Option<StoreErrorKind> {
    match self {
      Self::Xml(_) => None,
      Self::Store { kind, .. } => Some(*kind),
    }
  }
}

#[derive(Debug, Error)]
pub enum PipelineError {
  /// A stage failed. The job has already been persisted as `Failed`.
  #[error("{stage} stage failed: {error}")]
  StageFailure {
    stage: Stage,
    #[source]
    error: StageError,
    job:   Box<IngestJob>,
  },

  /// The job ledger itself could not be written or read.
  #[error("job ledger error: {0}")]
  Ledger(#[source] BoxError),

  #[error("i/o error on {path}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl PipelineError {
  pub(crate) fn ledger<E: StoreError>(err: E) -> Self { Self::Ledger(Box::new(err)) }

  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io { path: path.into(), source }
  }

  /// The failed job, for stage failures.
  pub fn job(&self) -> Option<&IngestJob> {
    match self {
      Self::StageFailure { job, .. } => Some(job),
      Self::Ledger(_) | Self::Io { .. } => None,
    }
  }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
