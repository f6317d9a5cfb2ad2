//! [`SqliteStore`], the SQLite implementation of [`FiscalStore`].

use std::path::Path;

use chrono::Utc;
use uuid::Uuid;

use fiscal_core::{
  catalog::{Product, Service},
  document::{NewNfeDocument, NewNfseDocument, NfeDocument, NfseDocument, validate_items},
  event::{DocumentEvent, NewDocumentEvent},
  ids::{NfeKey, NfseId, TaxId},
  item::{LineItem, NewLineItem},
  job::{IngestJob, JobCounts, JobStatus},
  party::Emitter,
  report::{
    DocumentQuery, PeriodRange, ProductRanking, SupplierSummary, TaxPeriodSummary,
    UnifiedDocument,
  },
  store::FiscalStore,
};

use crate::{
  Error, Result,
  encode::{decode_count, encode_dt, encode_uuid},
  read::{self, UnifiedFilter},
  rows::{RawEvent, RawItem, RawJob, RawNewNfe, RawNewNfse, RawStoredItem},
  schema::{PRAGMAS, SCHEMA, SCHEMA_VERSION},
  write,
};

/// Default page size of list queries that were given no limit.
const DEFAULT_LIMIT: usize = 100;

fn sql_int(n: usize) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

// ─── Store ───────────────────────────────────────────────────────────────────

/// A fiscal document warehouse backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let version = self
      .conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
        if version < SCHEMA_VERSION {
          conn.execute_batch(SCHEMA)?;
        }
        Ok(version)
      })
      .await?;
    if version < SCHEMA_VERSION {
      tracing::info!(from = version, to = SCHEMA_VERSION, "initialised warehouse schema");
    }
    Ok(())
  }

  /// Cheap round-trip used by health checks.
  pub async fn ping(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── FiscalStore impl ────────────────────────────────────────────────────────

impl FiscalStore for SqliteStore {
  type Error = Error;

  // ── Documents ─────────────────────────────────────────────────────────────

  async fn insert_nfe(&self, doc: NewNfeDocument) -> Result<NfeDocument> {
    doc.validate()?;
    let raw = RawNewNfe::encode(&doc, Utc::now())?;

    let stored = self
      .conn
      .call(move |conn| Ok(write::insert_nfe(conn, raw)))
      .await??;

    tracing::debug!(key = %doc.key, items = doc.items.len(), "stored NF-e");
    stored.into_document()
  }

  async fn insert_nfse(&self, doc: NewNfseDocument) -> Result<NfseDocument> {
    doc.validate()?;
    let raw = RawNewNfse::encode(&doc, Utc::now())?;

    let stored = self
      .conn
      .call(move |conn| Ok(write::insert_nfse(conn, raw)))
      .await??;

    tracing::debug!(id = %doc.id, services = doc.services.len(), "stored NFS-e");
    stored.into_document()
  }

  async fn replace_nfe(&self, doc: NewNfeDocument) -> Result<NfeDocument> {
    doc.validate()?;
    let raw = RawNewNfe::encode(&doc, Utc::now())?;

    let stored = self
      .conn
      .call(move |conn| Ok(write::replace_nfe(conn, raw)))
      .await??;

    tracing::info!(key = %doc.key, "replaced NF-e");
    stored.into_document()
  }

  async fn replace_nfse(&self, doc: NewNfseDocument) -> Result<NfseDocument> {
    doc.validate()?;
    let raw = RawNewNfse::encode(&doc, Utc::now())?;

    let stored = self
      .conn
      .call(move |conn| Ok(write::replace_nfse(conn, raw)))
      .await??;

    tracing::info!(id = %doc.id, "replaced NFS-e");
    stored.into_document()
  }

  async fn insert_nfe_items(
    &self,
    key: NfeKey,
    items: Vec<NewLineItem>,
  ) -> Result<Vec<LineItem>> {
    validate_items(key.as_str(), &items).map_err(Error::from_batch)?;
    let raws = items.iter().map(RawItem::encode).collect::<Result<Vec<_>>>()?;
    let key_str = key.to_string();
    let now_str = encode_dt(Utc::now());

    let stored: Vec<RawStoredItem> = self
      .conn
      .call(move |conn| Ok(write::insert_nfe_items(conn, &key_str, raws, &now_str)))
      .await??;

    stored.into_iter().map(RawStoredItem::into_line_item).collect()
  }

  async fn record_event(&self, event: NewDocumentEvent) -> Result<DocumentEvent> {
    event.validate()?;
    let raw = RawEvent::encode(&event, Utc::now());

    let stored = self
      .conn
      .call(move |conn| Ok(write::record_event(conn, raw)))
      .await??;

    tracing::debug!(
      key = %event.key,
      event_type = event.event_type.code(),
      sequence = event.sequence,
      "recorded NF-e event"
    );
    stored.into_event()
  }

  async fn get_nfe(&self, key: NfeKey) -> Result<Option<NfeDocument>> {
    let key_str = key.to_string();

    let raw = self
      .conn
      .call(move |conn| Ok(read::nfe_document(conn, &key_str)?))
      .await?;

    raw.map(|r| r.into_document()).transpose()
  }

  async fn get_nfse(&self, id: NfseId) -> Result<Option<NfseDocument>> {
    let id_str = id.to_string();

    let raw = self
      .conn
      .call(move |conn| Ok(read::nfse_document(conn, &id_str)?))
      .await?;

    raw.map(|r| r.into_document()).transpose()
  }

  // ── Dimensions ────────────────────────────────────────────────────────────

  async fn get_emitter(&self, tax_id: TaxId) -> Result<Option<Emitter>> {
    let id_str = tax_id.digits().to_owned();

    let raw = self
      .conn
      .call(move |conn| Ok(read::emitter(conn, &id_str)?))
      .await?;

    raw.map(|r| r.into_emitter()).transpose()
  }

  async fn list_emitters(&self) -> Result<Vec<Emitter>> {
    let raws = self.conn.call(|conn| Ok(read::emitters(conn)?)).await?;
    raws.into_iter().map(|r| r.into_emitter()).collect()
  }

  async fn get_product(&self, code: String) -> Result<Option<Product>> {
    let raw = self
      .conn
      .call(move |conn| Ok(read::product(conn, &code)?))
      .await?;
    Ok(raw.map(Product::from))
  }

  async fn list_products(&self) -> Result<Vec<Product>> {
    let raws = self.conn.call(|conn| Ok(read::products(conn)?)).await?;
    Ok(raws.into_iter().map(Product::from).collect())
  }

  async fn get_service(&self, code: String) -> Result<Option<Service>> {
    let raw = self
      .conn
      .call(move |conn| Ok(read::service(conn, &code)?))
      .await?;
    Ok(raw.map(Service::from))
  }

  // ── Views ─────────────────────────────────────────────────────────────────

  async fn unified_documents(&self, query: &DocumentQuery) -> Result<Vec<UnifiedDocument>> {
    let filter = UnifiedFilter {
      tipo_documento: query.kind.map(|k| k.as_str().to_owned()),
      periodo_de:     query.periods.from.as_ref().map(|p| p.to_string()),
      periodo_ate:    query.periods.to.as_ref().map(|p| p.to_string()),
      emitente_id:    query.emitter.clone(),
      limit:          sql_int(query.limit.unwrap_or(DEFAULT_LIMIT)),
      offset:         sql_int(query.offset.unwrap_or(0)),
    };

    let raws = self
      .conn
      .call(move |conn| Ok(read::unified(conn, &filter)?))
      .await?;

    raws.into_iter().map(|r| r.into_unified()).collect()
  }

  async fn supplier_summary(&self) -> Result<Vec<SupplierSummary>> {
    let raws = self
      .conn
      .call(|conn| Ok(read::supplier_summary(conn)?))
      .await?;
    raws.into_iter().map(|r| r.into_summary()).collect()
  }

  async fn top_products(&self, limit: usize) -> Result<Vec<ProductRanking>> {
    let limit = sql_int(limit);
    let raws = self
      .conn
      .call(move |conn| Ok(read::top_products(conn, limit)?))
      .await?;
    raws.into_iter().map(|r| r.into_ranking()).collect()
  }

  async fn tax_analysis(&self, range: &PeriodRange) -> Result<Vec<TaxPeriodSummary>> {
    let from = range.from.as_ref().map(|p| p.to_string());
    let to = range.to.as_ref().map(|p| p.to_string());

    let raws = self
      .conn
      .call(move |conn| Ok(read::tax_analysis(conn, from.as_deref(), to.as_deref())?))
      .await?;

    raws.into_iter().map(|r| r.into_summary()).collect()
  }

  // ── Job ledger ────────────────────────────────────────────────────────────

  async fn create_job(&self, job: IngestJob) -> Result<IngestJob> {
    let raw = RawJob::encode(&job);
    self
      .conn
      .call(move |conn| Ok(write::insert_job(conn, &raw)))
      .await??;
    Ok(job)
  }

  async fn update_job(&self, job: IngestJob) -> Result<IngestJob> {
    let raw = RawJob::encode(&job);
    let found = self
      .conn
      .call(move |conn| Ok(write::update_job(conn, &raw)))
      .await??;
    if !found {
      return Err(Error::JobNotFound(job.job_id));
    }
    Ok(job)
  }

  async fn get_job(&self, job_id: Uuid) -> Result<Option<IngestJob>> {
    let id_str = encode_uuid(job_id);
    let raw = self
      .conn
      .call(move |conn| Ok(read::job(conn, &id_str)?))
      .await?;
    raw.map(RawJob::into_job).transpose()
  }

  async fn find_job_by_digest(&self, digest: String) -> Result<Option<IngestJob>> {
    let raw = self
      .conn
      .call(move |conn| Ok(read::stored_job_by_digest(conn, &digest)?))
      .await?;
    raw.map(RawJob::into_job).transpose()
  }

  async fn list_jobs(&self, limit: usize) -> Result<Vec<IngestJob>> {
    let limit = sql_int(limit);
    let raws = self
      .conn
      .call(move |conn| Ok(read::jobs(conn, limit)?))
      .await?;
    raws.into_iter().map(RawJob::into_job).collect()
  }

  async fn job_counts(&self) -> Result<JobCounts> {
    let rows = self.conn.call(|conn| Ok(read::job_counts(conn)?)).await?;

    let mut counts = JobCounts::default();
    for (status, n) in rows {
      counts.add(JobStatus::parse(&status)?, decode_count("count", n)?);
    }
    Ok(counts)
  }
}
