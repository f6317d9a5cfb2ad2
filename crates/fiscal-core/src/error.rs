//! Error types for `fiscal-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid NF-e key {value:?}: {reason}")]
  InvalidNfeKey { value: String, reason: &'static str },

  #[error("invalid NFS-e id {value:?}: {reason}")]
  InvalidNfseId { value: String, reason: &'static str },

  #[error("invalid CNPJ/CPF: {0:?}")]
  InvalidTaxId(String),

  #[error("invalid period {0:?}, expected YYYY-MM")]
  InvalidPeriod(String),

  #[error("negative amount in {field}")]
  NegativeAmount { field: String },

  /// Item, line and event sequence numbers are 1-based.
  #[error("{field} must be at least 1")]
  ZeroNumber { field: String },

  #[error("document {0} has no line items")]
  EmptyDocument(String),

  #[error("document {document} repeats item number {item_number}")]
  DuplicateItem { document: String, item_number: u32 },

  #[error("unknown {kind} discriminant: {value:?}")]
  UnknownDiscriminant { kind: &'static str, value: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
