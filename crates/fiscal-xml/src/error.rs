//! Error types for the fiscal-xml codec.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("malformed XML: {0}")]
  Xml(String),

  #[error("missing element {0}")]
  MissingElement(String),

  #[error("invalid value at {path}: {value:?}")]
  InvalidValue { path: String, value: String },

  #[error("unsupported document root <{0}>")]
  UnsupportedDocument(String),

  #[error(transparent)]
  Core(#[from] fiscal_core::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
