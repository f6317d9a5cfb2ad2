//! The `FiscalStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `fiscal-store-sqlite`).
//! The pipeline and the HTTP layer depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  catalog::{Product, Service},
  document::{NewNfeDocument, NewNfseDocument, NfeDocument, NfseDocument},
  event::{DocumentEvent, NewDocumentEvent},
  ids::{NfeKey, NfseId, TaxId},
  item::{LineItem, NewLineItem},
  job::{IngestJob, JobCounts},
  party::Emitter,
  report::{
    DocumentQuery, PeriodRange, ProductRanking, SupplierSummary,
    TaxPeriodSummary, UnifiedDocument,
  },
};

// ─── Error classification ────────────────────────────────────────────────────

/// Backend-independent category of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
  /// The row being created already exists.
  Duplicate,
  /// The row being replaced does not exist.
  NotFound,
  /// A referenced row does not exist.
  ReferentialIntegrity,
  /// The input was rejected before or by a constraint.
  Invalid,
  Internal,
}

/// Implemented by backend error types so callers can react to a failure
/// without knowing the backend.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn kind(&self) -> StoreErrorKind;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a fiscal document warehouse backend.
///
/// Headers and facts are insert-only except through the explicit `replace_*`
/// operations; events are append-only. Every write runs in a single
/// transaction and either fully applies or leaves no trace.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait FiscalStore: Send + Sync {
  type Error: StoreError;

  // ── Documents ─────────────────────────────────────────────────────────

  /// Insert a new NF-e with its emitter, recipient, products and items.
  ///
  /// Fails if the key already exists. Referenced dimension rows are
  /// created or merged in the same transaction.
  fn insert_nfe(
    &self,
    doc: NewNfeDocument,
  ) -> impl Future<Output = Result<NfeDocument, Self::Error>> + Send + '_;

  /// Insert a new NFS-e with its emitter, recipient, services and lines.
  fn insert_nfse(
    &self,
    doc: NewNfseDocument,
  ) -> impl Future<Output = Result<NfseDocument, Self::Error>> + Send + '_;

  /// Overwrite an existing NF-e with a corrected version. The header is
  /// updated in place, items are replaced, events are kept, and
  /// `updated_at` moves forward. Fails if the key does not exist.
  fn replace_nfe(
    &self,
    doc: NewNfeDocument,
  ) -> impl Future<Output = Result<NfeDocument, Self::Error>> + Send + '_;

  fn replace_nfse(
    &self,
    doc: NewNfseDocument,
  ) -> impl Future<Output = Result<NfseDocument, Self::Error>> + Send + '_;

  /// Append a batch of items to an existing NF-e header. The batch is
  /// all-or-nothing.
  fn insert_nfe_items(
    &self,
    key: NfeKey,
    items: Vec<NewLineItem>,
  ) -> impl Future<Output = Result<Vec<LineItem>, Self::Error>> + Send + '_;

  /// Append a lifecycle event to an existing NF-e.
  fn record_event(
    &self,
    event: NewDocumentEvent,
  ) -> impl Future<Output = Result<DocumentEvent, Self::Error>> + Send + '_;

  fn get_nfe(
    &self,
    key: NfeKey,
  ) -> impl Future<Output = Result<Option<NfeDocument>, Self::Error>> + Send + '_;

  fn get_nfse(
    &self,
    id: NfseId,
  ) -> impl Future<Output = Result<Option<NfseDocument>, Self::Error>> + Send + '_;

  // ── Dimensions ────────────────────────────────────────────────────────

  fn get_emitter(
    &self,
    tax_id: TaxId,
  ) -> impl Future<Output = Result<Option<Emitter>, Self::Error>> + Send + '_;

  fn list_emitters(
    &self,
  ) -> impl Future<Output = Result<Vec<Emitter>, Self::Error>> + Send + '_;

  fn get_product(
    &self,
    code: String,
  ) -> impl Future<Output = Result<Option<Product>, Self::Error>> + Send + '_;

  fn list_products(
    &self,
  ) -> impl Future<Output = Result<Vec<Product>, Self::Error>> + Send + '_;

  fn get_service(
    &self,
    code: String,
  ) -> impl Future<Output = Result<Option<Service>, Self::Error>> + Send + '_;

  // ── Views ─────────────────────────────────────────────────────────────

  /// NF-e and NFS-e headers in one row shape, newest first.
  fn unified_documents<'a>(
    &'a self,
    query: &'a DocumentQuery,
  ) -> impl Future<Output = Result<Vec<UnifiedDocument>, Self::Error>> + Send + 'a;

  /// Per-supplier totals, highest total value first.
  fn supplier_summary(
    &self,
  ) -> impl Future<Output = Result<Vec<SupplierSummary>, Self::Error>> + Send + '_;

  /// Products by total purchased value, highest first.
  fn top_products(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ProductRanking>, Self::Error>> + Send + '_;

  /// Tax totals per period, oldest first.
  fn tax_analysis<'a>(
    &'a self,
    range: &'a PeriodRange,
  ) -> impl Future<Output = Result<Vec<TaxPeriodSummary>, Self::Error>> + Send + 'a;

  // ── Job ledger ────────────────────────────────────────────────────────

  /// Persist a job for the first time.
  fn create_job(
    &self,
    job: IngestJob,
  ) -> impl Future<Output = Result<IngestJob, Self::Error>> + Send + '_;

  /// Persist the current state of an existing job.
  fn update_job(
    &self,
    job: IngestJob,
  ) -> impl Future<Output = Result<IngestJob, Self::Error>> + Send + '_;

  fn get_job(
    &self,
    job_id: Uuid,
  ) -> impl Future<Output = Result<Option<IngestJob>, Self::Error>> + Send + '_;

  /// The stored job for a file digest, if one exists.
  fn find_job_by_digest(
    &self,
    digest: String,
  ) -> impl Future<Output = Result<Option<IngestJob>, Self::Error>> + Send + '_;

  /// Most recent jobs first.
  fn list_jobs(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<IngestJob>, Self::Error>> + Send + '_;

  fn job_counts(
    &self,
  ) -> impl Future<Output = Result<JobCounts, Self::Error>> + Send + '_;
}
