//! Error type for `fiscal-store-sqlite`.

use fiscal_core::store::{StoreError, StoreErrorKind};
use rusqlite::ffi;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] fiscal_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored value could not be mapped back onto its domain type.
  #[error("malformed stored value: {0}")]
  Decode(String),

  #[error("document {0} already exists")]
  DuplicateDocument(String),

  #[error("document not found: {0}")]
  DocumentNotFound(String),

  /// A row references a document or dimension that does not exist.
  #[error("referential integrity violation: {0}")]
  ReferentialIntegrity(String),

  #[error("event {event_type} #{sequence} already recorded for {key}")]
  DuplicateEvent {
    key:        String,
    event_type: String,
    sequence:   u32,
  },

  #[error("document {document} already has item {item_number}")]
  DuplicateItem { document: String, item_number: u32 },

  /// A CHECK, UNIQUE or NOT NULL constraint rejected the row.
  #[error("constraint violation: {0}")]
  Constraint(String),

  #[error("{field} = {value} does not fit the stored precision")]
  Overflow { field: String, value: Decimal },

  #[error("job not found: {0}")]
  JobNotFound(uuid::Uuid),
}

impl From<rusqlite::Error> for Error {
  fn from(err: rusqlite::Error) -> Self {
    if let rusqlite::Error::SqliteFailure(ref failure, ref message) = err {
      let detail = message.clone().unwrap_or_else(|| failure.to_string());
      match failure.extended_code {
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return Self::ReferentialIntegrity(detail),
        ffi::SQLITE_CONSTRAINT_CHECK
        | ffi::SQLITE_CONSTRAINT_UNIQUE
        | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        | ffi::SQLITE_CONSTRAINT_NOTNULL => return Self::Constraint(detail),
        _ => {}
      }
    }
    Self::Sqlite(err)
  }
}

impl Error {
  /// A repeated item number inside an append batch is reported the same way
  /// as one that collides with a stored item.
  pub(crate) fn from_batch(err: fiscal_core::Error) -> Self {
    match err {
      fiscal_core::Error::DuplicateItem { document, item_number } => {
        Self::DuplicateItem { document, item_number }
      }
      other => Self::Core(other),
    }
  }
}

impl StoreError for Error {
  fn kind(&self) -> StoreErrorKind {
    match self {
      Self::DuplicateDocument(_)
      | Self::DuplicateEvent { .. }
      | Self::DuplicateItem { .. } => StoreErrorKind::Duplicate,
      Self::DocumentNotFound(_) | Self::JobNotFound(_) => StoreErrorKind::NotFound,
      Self::ReferentialIntegrity(_) => StoreErrorKind::ReferentialIntegrity,
      Self::Core(_) | Self::Constraint(_) | Self::Overflow { .. } => {
        StoreErrorKind::Invalid
      }
      Self::Database(_)
      | Self::Sqlite(_)
      | Self::Json(_)
      | Self::Uuid(_)
      | Self::DateParse(_)
      | Self::Decode(_) => StoreErrorKind::Internal,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
