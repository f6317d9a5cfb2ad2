//! Pipeline tests against an in-memory SQLite store and the codec fixtures.

use std::sync::Arc;

use fiscal_core::{
  catalog::Classification,
  ids::{NfeKey, NfseId},
  job::{JobStatus, PayloadKind, Stage},
  store::{FiscalStore, StoreErrorKind},
};
use fiscal_store_sqlite::SqliteStore;
use rust_decimal::Decimal;

use super::*;

const NFE: &[u8] = include_bytes!("../../fiscal-xml/fixtures/nfe_proc.xml");
const NFSE: &[u8] = include_bytes!("../../fiscal-xml/fixtures/nfse_nacional.xml");
const EVENT: &[u8] = include_bytes!("../../fiscal-xml/fixtures/proc_evento_cancelamento.xml");

const KEY: &str = "35240311222333000181550010000000011000000015";
const NFSE_ID: &str = "NFS35503082245997418000153000000000012324031234567895";

async fn pipeline() -> Pipeline<SqliteStore> {
  Pipeline::new(Arc::new(SqliteStore::open_in_memory().await.unwrap()))
}

fn key() -> NfeKey { NfeKey::parse(KEY).unwrap() }

/// Same document, different bytes.
fn with_nature(text: &str) -> Vec<u8> {
  std::str::from_utf8(NFE)
    .unwrap()
    .replacen("Venda de mercadoria", text, 1)
    .into_bytes()
}

fn stage_failure(err: PipelineError) -> (Stage, StageError, fiscal_core::job::IngestJob) {
  match err {
    PipelineError::StageFailure { stage, error, job } => (stage, error, *job),
    other => panic!("expected a stage failure, got {other}"),
  }
}

// ─── Happy path ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn nfe_runs_every_stage() {
  let p = pipeline().await;
  let job = p.ingest("nota.xml", NFE).await.unwrap();

  assert_eq!(job.status, JobStatus::Stored);
  assert_eq!(job.payload_kind, Some(PayloadKind::Nfe));
  assert_eq!(job.document_id.as_deref(), Some(KEY));
  assert_eq!(job.digest, digest(NFE));
  assert_eq!(job.digest.len(), 64);

  let stored = p.store().get_job(job.job_id).await.unwrap().unwrap();
  assert_eq!(stored, job);

  let doc = p.store().get_nfe(key()).await.unwrap().unwrap();
  assert_eq!(doc.items.len(), 2);
  assert_eq!(doc.header.totals.total, Decimal::new(23477, 2));
}

#[tokio::test]
async fn nfse_is_stored() {
  let p = pipeline().await;
  let job = p.ingest("nfse.xml", NFSE).await.unwrap();
  assert_eq!(job.payload_kind, Some(PayloadKind::Nfse));
  assert_eq!(job.document_id.as_deref(), Some(NFSE_ID));

  let id = NfseId::parse(NFSE_ID).unwrap();
  let doc = p.store().get_nfse(id).await.unwrap().unwrap();
  assert_eq!(doc.services.len(), 1);
}

#[tokio::test]
async fn classifier_fills_missing_categories() {
  let classifier = NcmPrefixClassifier::new([(
    "7318",
    Classification {
      category:    "Ferragens".into(),
      subcategory: Some("Parafusos".into()),
    },
  )]);
  let p = pipeline().await.with_classifier(classifier);
  p.ingest("nota.xml", NFE).await.unwrap();

  let screw = p.store().get_product("PROD001".into()).await.unwrap().unwrap();
  assert_eq!(screw.category.as_deref(), Some("Ferragens"));
  assert_eq!(screw.subcategory.as_deref(), Some("Parafusos"));

  let pliers = p.store().get_product("PROD002".into()).await.unwrap().unwrap();
  assert!(!pliers.is_classified());
}

// ─── Idempotency and re-ingestion ────────────────────────────────────────────

#[tokio::test]
async fn byte_identical_file_is_a_duplicate() {
  let p = pipeline().await;
  let first = p.ingest("nota.xml", NFE).await.unwrap();
  let second = p.ingest("nota-copia.xml", NFE).await.unwrap();

  assert_eq!(second.status, JobStatus::Duplicate);
  assert_eq!(second.duplicate_of, Some(first.job_id));
  assert_eq!(second.document_id.as_deref(), Some(KEY));
  assert_ne!(second.job_id, first.job_id);

  let counts = p.store().job_counts().await.unwrap();
  assert_eq!(counts.stored, 1);
  assert_eq!(counts.duplicate, 1);
}

#[tokio::test]
async fn failed_file_is_not_a_duplicate_source() {
  let p = pipeline().await;
  let broken = b"<nfeProc><NFe>";
  assert!(p.ingest("a.xml", broken).await.is_err());
  let err = p.ingest("a.xml", broken).await.unwrap_err();

  let (stage, _, job) = stage_failure(err);
  assert_eq!(stage, Stage::Parse);
  assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn reject_policy_fails_store_stage() {
  let p = pipeline().await;
  p.ingest("nota.xml", NFE).await.unwrap();

  let err = p
    .ingest("nota-v2.xml", &with_nature("Venda corrigida"))
    .await
    .unwrap_err();
  let (stage, error, job) = stage_failure(err);
  assert_eq!(stage, Stage::Store);
  assert_eq!(error.store_kind(), Some(StoreErrorKind::Duplicate));
  assert_eq!(job.failed_stage, Some(Stage::Store));
  assert!(job.error.is_some());

  let persisted = p.store().get_job(job.job_id).await.unwrap().unwrap();
  assert_eq!(persisted.status, JobStatus::Failed);

  let doc = p.store().get_nfe(key()).await.unwrap().unwrap();
  assert_eq!(doc.header.operation_nature.as_deref(), Some("Venda de mercadoria"));
}

#[tokio::test]
async fn replace_policy_overwrites_and_keeps_events() {
  let p = pipeline().await.with_policy(ReingestPolicy::Replace);
  p.ingest("nota.xml", NFE).await.unwrap();
  p.ingest("cancel.xml", EVENT).await.unwrap();
  let before = p.store().get_nfe(key()).await.unwrap().unwrap();

  let job = p
    .ingest("nota-v2.xml", &with_nature("Venda corrigida"))
    .await
    .unwrap();
  assert_eq!(job.status, JobStatus::Stored);

  let after = p.store().get_nfe(key()).await.unwrap().unwrap();
  assert_eq!(after.header.operation_nature.as_deref(), Some("Venda corrigida"));
  assert_eq!(after.header.created_at, before.header.created_at);
  assert!(after.header.updated_at >= before.header.updated_at);
  assert_eq!(after.events.len(), 1);
  assert!(after.is_cancelled());
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn event_skips_classify_and_cancels() {
  let p = pipeline().await;
  p.ingest("nota.xml", NFE).await.unwrap();
  let job = p.ingest("cancel.xml", EVENT).await.unwrap();

  assert_eq!(job.status, JobStatus::Stored);
  assert_eq!(job.payload_kind, Some(PayloadKind::NfeEvent));

  let doc = p.store().get_nfe(key()).await.unwrap().unwrap();
  assert!(doc.is_cancelled());
}

#[tokio::test]
async fn event_for_unknown_document_fails() {
  let p = pipeline().await;
  let err = p.ingest("cancel.xml", EVENT).await.unwrap_err();

  let (stage, error, _) = stage_failure(err);
  assert_eq!(stage, Stage::Store);
  assert_eq!(error.store_kind(), Some(StoreErrorKind::ReferentialIntegrity));
}

// ─── Parse failures ──────────────────────────────────────────────────────────

#[tokio::test]
async fn unsupported_root_fails_parse_stage() {
  let p = pipeline().await;
  let err = p
    .ingest("abrasf.xml", b"<CompNfse><Nfse/></CompNfse>")
    .await
    .unwrap_err();

  let (stage, error, job) = stage_failure(err);
  assert_eq!(stage, Stage::Parse);
  assert!(matches!(error, StageError::Xml(fiscal_xml::Error::UnsupportedDocument(_))));
  assert_eq!(job.payload_kind, None);
  assert_eq!(p.store().job_counts().await.unwrap().failed, 1);
}

#[tokio::test]
async fn invalid_amount_fails_parse_stage() {
  let xml = std::str::from_utf8(NFE)
    .unwrap()
    .replacen("<vFrete>0.00</vFrete>", "<vFrete>-1.00</vFrete>", 1)
    .into_bytes();
  let p = pipeline().await;
  let err = p.ingest("nota.xml", &xml).await.unwrap_err();

  let (stage, error, _) = stage_failure(err);
  assert_eq!(stage, Stage::Parse);
  assert!(matches!(error, StageError::Xml(fiscal_xml::Error::Core(_))));
  assert!(p.store().get_nfe(key()).await.unwrap().is_none());
}

#[tokio::test]
async fn zero_item_number_fails_parse_stage() {
  let xml = std::str::from_utf8(NFE)
    .unwrap()
    .replacen(r#"<det nItem="2">"#, r#"<det nItem="0">"#, 1)
    .into_bytes();
  let p = pipeline().await;
  let err = p.ingest("nota.xml", &xml).await.unwrap_err();

  let (stage, error, _) = stage_failure(err);
  assert_eq!(stage, Stage::Parse);
  assert!(matches!(
    error,
    StageError::Xml(fiscal_xml::Error::Core(fiscal_core::Error::ZeroNumber { .. }))
  ));
}

#[tokio::test]
async fn zero_event_sequence_fails_parse_stage() {
  let p = pipeline().await;
  p.ingest("nota.xml", NFE).await.unwrap();

  let xml = std::str::from_utf8(EVENT)
    .unwrap()
    .replace("<nSeqEvento>1</nSeqEvento>", "<nSeqEvento>0</nSeqEvento>")
    .into_bytes();
  let err = p.ingest("cancel.xml", &xml).await.unwrap_err();

  let (stage, _, job) = stage_failure(err);
  assert_eq!(stage, Stage::Parse);
  assert_eq!(job.failed_stage, Some(Stage::Parse));
  assert!(!p.store().get_nfe(key()).await.unwrap().unwrap().is_cancelled());
}
