//! Ingestion pipeline for the fiscal document warehouse.
//!
//! Every file runs through three stages, each a plain function of the
//! previous stage's output:
//!
//! 1. **Parse**: detect the document kind and decode it with [`fiscal_xml`].
//! 2. **Classify**: assign categories to unclassified products. Events skip
//!    this stage.
//! 3. **Store**: insert (or replace, per [`ReingestPolicy`]) through a
//!    [`fiscal_core::store::FiscalStore`].
//!
//! Each file gets an [`IngestJob`](fiscal_core::job::IngestJob) that is
//! persisted after every stage. [`DirectoryWatcher`] drives the pipeline from
//! a polled directory.

pub mod classify;
pub mod error;
pub mod pipeline;
pub mod watch;

pub use classify::{Classifier, NcmPrefixClassifier, NoopClassifier};
pub use error::{PipelineError, Result, StageError};
pub use pipeline::{Pipeline, ReingestPolicy, digest};
pub use watch::{DirectoryWatcher, ScanReport, WatchConfig};

#[cfg(test)]
mod tests;
