//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, FixedOffset, TimeZone as _};
use fiscal_core::{
  catalog::{Product, Service},
  document::{NewNfeDocument, NewNfseDocument, NfeTotals, NfseTotals, OperationType},
  event::{EventType, NewDocumentEvent},
  ids::{NfeKey, NfseId, TaxId},
  item::{NewLineItem, NewServiceLine, TaxBlock},
  job::{IngestJob, JobStatus, NewIngestJob, Stage},
  party::{Emitter, NewRecipient},
  report::{DocumentQuery, Period, PeriodRange},
  store::{FiscalStore, StoreError as _, StoreErrorKind},
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{Error, SqliteStore};

const KEY_1: &str = "35240311222333000181550010000000011000000015";
const KEY_2: &str = "35240311222333000181550010000000021000000020";
const KEY_3: &str = "35240460701190000104550010000123451000000037";
const NFSE_ID: &str = "NFS35503082245997418000153000000000012324031234567895";

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn money(cents: i64) -> Decimal { Decimal::new(cents, 2) }

fn at(y: i32, m: u32, d: u32) -> DateTime<FixedOffset> {
  FixedOffset::west_opt(3 * 3600)
    .unwrap()
    .with_ymd_and_hms(y, m, d, 10, 0, 0)
    .unwrap()
}

fn key(s: &str) -> NfeKey { NfeKey::parse(s).unwrap() }

fn item(n: u32, code: &str, quantity: i64, cents: i64) -> NewLineItem {
  let gross = money(cents * quantity);
  NewLineItem {
    item_number: n,
    product:     Product {
      ncm: Some("73181500".into()),
      ..Product::new(code, format!("Produto {code}"))
    },
    cfop:        Some("5102".into()),
    unit:        Some("UN".into()),
    quantity:    Decimal::new(quantity, 0),
    unit_price:  money(cents),
    gross_value: gross,
    discount:    Decimal::ZERO,
    freight:     Decimal::ZERO,
    icms:        TaxBlock::new(gross, Decimal::new(18, 0), money(cents * quantity * 18 / 100)),
    icms_st:     TaxBlock::default(),
    ipi:         TaxBlock::default(),
    pis:         TaxBlock::default(),
    cofins:      TaxBlock::default(),
  }
}

fn nfe(k: &str, issued_at: DateTime<FixedOffset>, items: Vec<NewLineItem>) -> NewNfeDocument {
  let key = key(k);
  let products: Decimal = items.iter().map(|i| i.gross_value).sum();
  let icms: Decimal = items.iter().map(|i| i.icms.value).sum();
  NewNfeDocument {
    number: key.number().trim_start_matches('0').to_owned(),
    series: "1".into(),
    model: "55".into(),
    operation_nature: Some("Venda de mercadoria".into()),
    operation_type: Some(OperationType::Outbound),
    issued_at,
    exit_entry_at: None,
    protocol: Some("135240000000001".into()),
    emitter: Emitter::new(TaxId::parse(key.issuer_tax_id()).unwrap(), "ACME Industria LTDA"),
    recipient: Some(NewRecipient {
      tax_id: Some(TaxId::parse("45997418000153").unwrap()),
      name: Some("Comprador SA".into()),
      ..Default::default()
    }),
    totals: NfeTotals {
      products,
      icms_base: products,
      icms,
      total: products,
      ..Default::default()
    },
    items,
    key,
  }
}

fn nfse(issued_at: DateTime<FixedOffset>, cents: i64) -> NewNfseDocument {
  let amount = money(cents);
  let issqn = money(cents * 5 / 100);
  NewNfseDocument {
    id: NfseId::parse(NFSE_ID).unwrap(),
    number: "123".into(),
    dps_series: Some("900".into()),
    dps_number: Some("12".into()),
    issued_at,
    competence_date: Some(issued_at.date_naive()),
    emission_municipality: Some("3550308".into()),
    incidence_municipality: Some("3550308".into()),
    status_code: Some("100".into()),
    emitter: Emitter::new(TaxId::parse("45997418000153").unwrap(), "Consultoria Paulista LTDA"),
    recipient: None,
    totals: NfseTotals {
      services: amount,
      issqn_base: amount,
      issqn_rate: Decimal::new(5, 0),
      issqn,
      net: amount,
      ..Default::default()
    },
    services: vec![NewServiceLine {
      line_number:    1,
      service:        Service {
        code:           "010701".into(),
        description:    "Suporte tecnico".into(),
        cnae:           Some("6209100".into()),
        national_code:  Some("010701".into()),
        municipal_code: None,
        nbs:            None,
      },
      description:    None,
      quantity:       Decimal::ONE,
      amount,
      issqn:          TaxBlock::new(amount, Decimal::new(5, 0), issqn),
      issqn_withheld: false,
    }],
  }
}

fn cancellation(k: &str) -> NewDocumentEvent {
  NewDocumentEvent {
    key:           key(k),
    event_type:    EventType::Cancellation,
    sequence:      1,
    occurred_at:   at(2024, 3, 20),
    description:   Some("Cancelamento".into()),
    justification: Some("Erro na emissao do documento fiscal".into()),
    protocol:      Some("135240000000099".into()),
  }
}

// ─── Documents ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_get_nfe() {
  let s = store().await;
  let doc = nfe(KEY_1, at(2024, 3, 15), vec![
    item(1, "PROD001", 10, 1250),
    item(2, "PROD002", 1, 9990),
  ]);

  let stored = s.insert_nfe(doc.clone()).await.unwrap();
  assert_eq!(stored.header.key, doc.key);
  assert_eq!(stored.header.emitter_id, "11222333000181");
  assert_eq!(stored.items.len(), 2);
  assert!(stored.recipient.is_some());

  let fetched = s.get_nfe(key(KEY_1)).await.unwrap().unwrap();
  assert_eq!(fetched, stored);
  assert_eq!(fetched.header.issued_at.offset(), doc.issued_at.offset());
  assert_eq!(fetched.header.totals, doc.totals);
  assert_eq!(fetched.items[0].item.unit_price, money(1250));
}

#[tokio::test]
async fn get_nfe_missing_returns_none() {
  let s = store().await;
  assert!(s.get_nfe(key(KEY_1)).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_key_is_rejected_and_leaves_no_trace() {
  let s = store().await;
  s.insert_nfe(nfe(KEY_1, at(2024, 3, 15), vec![item(1, "PROD001", 1, 100)]))
    .await
    .unwrap();

  let err = s
    .insert_nfe(nfe(KEY_1, at(2024, 3, 16), vec![item(1, "OTHER", 1, 500)]))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateDocument(_)));
  assert_eq!(err.kind(), StoreErrorKind::Duplicate);

  assert!(s.get_product("OTHER".into()).await.unwrap().is_none());
  let doc = s.get_nfe(key(KEY_1)).await.unwrap().unwrap();
  assert_eq!(doc.items.len(), 1);
}

#[tokio::test]
async fn empty_document_is_rejected_before_writing() {
  let s = store().await;
  let err = s
    .insert_nfe(nfe(KEY_1, at(2024, 3, 15), vec![]))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), StoreErrorKind::Invalid);
  assert!(s.list_emitters().await.unwrap().is_empty());
}

#[tokio::test]
async fn amounts_beyond_column_range_overflow() {
  let s = store().await;
  let mut doc = nfe(KEY_1, at(2024, 3, 15), vec![item(1, "PROD001", 1, 100)]);
  doc.totals.total = Decimal::MAX;

  let err = s.insert_nfe(doc).await.unwrap_err();
  assert!(matches!(err, Error::Overflow { .. }));
}

#[tokio::test]
async fn replace_nfe_swaps_items_and_keeps_events() {
  let s = store().await;
  let original = s
    .insert_nfe(nfe(KEY_1, at(2024, 3, 15), vec![
      item(1, "PROD001", 1, 100),
      item(2, "PROD002", 1, 200),
    ]))
    .await
    .unwrap();
  s.record_event(cancellation(KEY_1)).await.unwrap();

  tokio::time::sleep(std::time::Duration::from_millis(5)).await;

  let mut corrected = nfe(KEY_1, at(2024, 3, 15), vec![item(1, "PROD003", 2, 300)]);
  corrected.operation_nature = Some("Venda corrigida".into());
  let replaced = s.replace_nfe(corrected).await.unwrap();

  assert_eq!(replaced.header.created_at, original.header.created_at);
  assert!(replaced.header.updated_at > original.header.updated_at);
  assert_eq!(replaced.header.operation_nature.as_deref(), Some("Venda corrigida"));
  assert_eq!(replaced.items.len(), 1);
  assert_eq!(replaced.items[0].item.product.code, "PROD003");
  assert_eq!(replaced.events.len(), 1);
  assert!(replaced.is_cancelled());
}

#[tokio::test]
async fn replace_missing_nfe_is_not_found() {
  let s = store().await;
  let err = s
    .replace_nfe(nfe(KEY_1, at(2024, 3, 15), vec![item(1, "PROD001", 1, 100)]))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), StoreErrorKind::NotFound);
}

#[tokio::test]
async fn insert_and_get_nfse() {
  let s = store().await;
  let doc = nfse(at(2024, 3, 10), 150000);

  let stored = s.insert_nfse(doc.clone()).await.unwrap();
  assert_eq!(stored.header.emitter_id, "45997418000153");
  assert_eq!(stored.services.len(), 1);

  let fetched = s
    .get_nfse(NfseId::parse(NFSE_ID).unwrap())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(fetched, stored);
  assert_eq!(fetched.header.totals.issqn, money(7500));
  assert!(s.get_service("010701".into()).await.unwrap().is_some());

  let err = s.insert_nfse(doc).await.unwrap_err();
  assert_eq!(err.kind(), StoreErrorKind::Duplicate);
}

#[tokio::test]
async fn replace_nfse_updates_totals() {
  let s = store().await;
  s.insert_nfse(nfse(at(2024, 3, 10), 150000)).await.unwrap();

  let replaced = s.replace_nfse(nfse(at(2024, 3, 10), 200000)).await.unwrap();
  assert_eq!(replaced.header.totals.services, money(200000));
  assert_eq!(replaced.services[0].line.amount, money(200000));
}

// ─── Items ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn items_require_an_existing_header() {
  let s = store().await;
  let err = s
    .insert_nfe_items(key(KEY_1), vec![item(1, "PROD001", 1, 100)])
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ReferentialIntegrity(_)));
  assert_eq!(err.kind(), StoreErrorKind::ReferentialIntegrity);
  assert!(s.get_product("PROD001".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn appended_items_extend_the_document() {
  let s = store().await;
  s.insert_nfe(nfe(KEY_1, at(2024, 3, 15), vec![item(1, "PROD001", 1, 100)]))
    .await
    .unwrap();

  let added = s
    .insert_nfe_items(key(KEY_1), vec![item(2, "PROD002", 3, 50), item(3, "PROD003", 1, 75)])
    .await
    .unwrap();
  assert_eq!(added.len(), 2);
  assert!(added.iter().all(|i| i.key.as_str() == KEY_1));

  let doc = s.get_nfe(key(KEY_1)).await.unwrap().unwrap();
  assert_eq!(doc.items.len(), 3);
}

#[tokio::test]
async fn item_batch_is_all_or_nothing() {
  let s = store().await;
  s.insert_nfe(nfe(KEY_1, at(2024, 3, 15), vec![item(1, "PROD001", 1, 100)]))
    .await
    .unwrap();

  let err = s
    .insert_nfe_items(key(KEY_1), vec![item(2, "PROD002", 1, 100), item(1, "PROD009", 1, 100)])
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateItem { item_number: 1, .. }));

  let doc = s.get_nfe(key(KEY_1)).await.unwrap().unwrap();
  assert_eq!(doc.items.len(), 1);
  assert!(s.get_product("PROD002".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn repeated_item_number_reports_one_kind() {
  let s = store().await;
  s.insert_nfe(nfe(KEY_1, at(2024, 3, 15), vec![item(1, "PROD001", 1, 100)]))
    .await
    .unwrap();

  let within_batch = s
    .insert_nfe_items(key(KEY_1), vec![item(5, "PROD002", 1, 100), item(5, "PROD003", 1, 100)])
    .await
    .unwrap_err();
  assert!(matches!(within_batch, Error::DuplicateItem { item_number: 5, .. }));

  let against_stored = s
    .insert_nfe_items(key(KEY_1), vec![item(1, "PROD002", 1, 100)])
    .await
    .unwrap_err();
  assert!(matches!(against_stored, Error::DuplicateItem { item_number: 1, .. }));

  assert_eq!(within_batch.kind(), StoreErrorKind::Duplicate);
  assert_eq!(against_stored.kind(), within_batch.kind());
}

#[tokio::test]
async fn item_number_zero_is_invalid_before_writing() {
  let s = store().await;
  let err = s
    .insert_nfe(nfe(KEY_1, at(2024, 3, 15), vec![item(0, "PROD001", 1, 1000)]))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(fiscal_core::Error::ZeroNumber { .. })));
  assert_eq!(err.kind(), StoreErrorKind::Invalid);
  assert!(s.get_nfe(key(KEY_1)).await.unwrap().is_none());
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn event_for_unknown_key_is_rejected() {
  let s = store().await;
  let err = s.record_event(cancellation(KEY_1)).await.unwrap_err();
  assert_eq!(err.kind(), StoreErrorKind::ReferentialIntegrity);
}

#[tokio::test]
async fn repeated_event_sequence_is_rejected() {
  let s = store().await;
  s.insert_nfe(nfe(KEY_1, at(2024, 3, 15), vec![item(1, "PROD001", 1, 100)]))
    .await
    .unwrap();

  let first = s.record_event(cancellation(KEY_1)).await.unwrap();
  assert!(first.event_id > 0);

  let err = s.record_event(cancellation(KEY_1)).await.unwrap_err();
  assert!(matches!(err, Error::DuplicateEvent { sequence: 1, .. }));
  assert_eq!(err.kind(), StoreErrorKind::Duplicate);
}

#[tokio::test]
async fn event_sequence_zero_is_invalid() {
  let s = store().await;
  s.insert_nfe(nfe(KEY_1, at(2024, 3, 15), vec![item(1, "PROD001", 1, 100)]))
    .await
    .unwrap();

  let mut event = cancellation(KEY_1);
  event.sequence = 0;
  let err = s.record_event(event).await.unwrap_err();
  assert!(matches!(err, Error::Core(fiscal_core::Error::ZeroNumber { .. })));
  assert_eq!(err.kind(), StoreErrorKind::Invalid);
  assert!(s.get_nfe(key(KEY_1)).await.unwrap().unwrap().events.is_empty());
}

#[tokio::test]
async fn cancellation_flags_the_unified_row() {
  let s = store().await;
  s.insert_nfe(nfe(KEY_1, at(2024, 3, 15), vec![item(1, "PROD001", 1, 100)]))
    .await
    .unwrap();
  s.insert_nfe(nfe(KEY_2, at(2024, 3, 16), vec![item(1, "PROD001", 1, 100)]))
    .await
    .unwrap();

  let mut correction = cancellation(KEY_2);
  correction.event_type = EventType::CorrectionLetter;
  s.record_event(correction).await.unwrap();
  s.record_event(cancellation(KEY_1)).await.unwrap();

  let rows = s.unified_documents(&DocumentQuery::default()).await.unwrap();
  let flag = |k: &str| rows.iter().find(|r| r.document_id == k).unwrap().cancelled;
  assert!(flag(KEY_1));
  assert!(!flag(KEY_2));
}

// ─── Dimensions ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn emitter_merge_keeps_known_fields() {
  let s = store().await;
  let mut first = nfe(KEY_1, at(2024, 3, 15), vec![item(1, "PROD001", 1, 100)]);
  first.emitter.trade_name = Some("ACME".into());
  first.emitter.address.uf = Some("SP".into());
  s.insert_nfe(first).await.unwrap();

  let mut second = nfe(KEY_2, at(2024, 3, 16), vec![item(1, "PROD001", 1, 100)]);
  second.emitter.legal_name = "ACME Industria e Comercio LTDA".into();
  second.emitter.email = Some("fiscal@acme.com.br".into());
  s.insert_nfe(second).await.unwrap();

  let emitters = s.list_emitters().await.unwrap();
  assert_eq!(emitters.len(), 1);

  let e = s
    .get_emitter(TaxId::parse("11222333000181").unwrap())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(e.legal_name, "ACME Industria e Comercio LTDA");
  assert_eq!(e.trade_name.as_deref(), Some("ACME"));
  assert_eq!(e.email.as_deref(), Some("fiscal@acme.com.br"));
  assert_eq!(e.address.uf.as_deref(), Some("SP"));
}

#[tokio::test]
async fn product_category_survives_unclassified_reingest() {
  let s = store().await;
  let mut classified = item(1, "PROD001", 1, 100);
  classified.product.category = Some("Fixacao".into());
  classified.product.subcategory = Some("Parafusos".into());
  s.insert_nfe(nfe(KEY_1, at(2024, 3, 15), vec![classified]))
    .await
    .unwrap();

  s.insert_nfe(nfe(KEY_2, at(2024, 3, 16), vec![item(1, "PROD001", 1, 100)]))
    .await
    .unwrap();

  let product = s.get_product("PROD001".into()).await.unwrap().unwrap();
  assert_eq!(product.category.as_deref(), Some("Fixacao"));
  assert_eq!(product.subcategory.as_deref(), Some("Parafusos"));
  assert_eq!(s.list_products().await.unwrap().len(), 1);
}

// ─── Views ───────────────────────────────────────────────────────────────────

async fn seeded() -> SqliteStore {
  let s = store().await;
  s.insert_nfe(nfe(KEY_1, at(2024, 3, 15), vec![
    item(1, "PROD001", 10, 1000),
    item(2, "PROD002", 1, 5000),
  ]))
  .await
  .unwrap();
  s.insert_nfe(nfe(KEY_2, at(2024, 3, 28), vec![item(1, "PROD001", 5, 1000)]))
    .await
    .unwrap();
  s.insert_nfe(nfe(KEY_3, at(2024, 4, 2), vec![item(1, "PROD002", 3, 5000)]))
    .await
    .unwrap();
  s.insert_nfse(nfse(at(2024, 3, 10), 150000)).await.unwrap();
  s
}

#[tokio::test]
async fn unified_view_has_one_row_per_header() {
  let s = seeded().await;

  let all = s.unified_documents(&DocumentQuery::default()).await.unwrap();
  assert_eq!(all.len(), 4);
  assert_eq!(all[0].document_id, KEY_3);

  let nfse_only = s
    .unified_documents(&DocumentQuery {
      kind: Some(fiscal_core::document::DocumentKind::Nfse),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(nfse_only.len(), 1);
  assert_eq!(nfse_only[0].total, money(150000));
  assert_eq!(nfse_only[0].taxes, money(7500));

  let march = s
    .unified_documents(&DocumentQuery {
      periods: PeriodRange {
        from: Some(Period::parse("2024-03").unwrap()),
        to:   Some(Period::parse("2024-03").unwrap()),
      },
      emitter: Some("11222333000181".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(march.len(), 2);

  let page = s
    .unified_documents(&DocumentQuery { limit: Some(2), offset: Some(1), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(page.len(), 2);
  assert_eq!(page[0].document_id, all[1].document_id);
}

#[tokio::test]
async fn unified_rows_sort_by_instant_across_offsets() {
  let s = store().await;
  let utc_noon = FixedOffset::east_opt(0)
    .unwrap()
    .with_ymd_and_hms(2024, 3, 15, 12, 0, 0)
    .unwrap();
  // 13:00 UTC, later than `utc_noon` although its text sorts first.
  let sao_paulo_ten = at(2024, 3, 15);

  s.insert_nfe(nfe(KEY_1, utc_noon, vec![item(1, "PROD001", 1, 100)]))
    .await
    .unwrap();
  s.insert_nfe(nfe(KEY_2, sao_paulo_ten, vec![item(1, "PROD001", 1, 100)]))
    .await
    .unwrap();

  let rows = s.unified_documents(&DocumentQuery::default()).await.unwrap();
  let order: Vec<&str> = rows.iter().map(|r| r.document_id.as_str()).collect();
  assert_eq!(order, vec![KEY_2, KEY_1]);
}

#[tokio::test]
async fn supplier_summary_aggregates_per_emitter() {
  let s = seeded().await;
  let rows = s.supplier_summary().await.unwrap();
  assert_eq!(rows.len(), 3);

  let acme = rows.iter().find(|r| r.emitter_id == "11222333000181").unwrap();
  assert_eq!(acme.nfe_count, 2);
  assert_eq!(acme.nfse_count, 0);
  assert_eq!(acme.total_value, money(10000 + 5000 + 5000));
  assert_eq!(acme.first_issued_at, Some(at(2024, 3, 15)));
  assert_eq!(acme.last_issued_at, Some(at(2024, 3, 28)));

  assert!(rows.windows(2).all(|w| w[0].total_value >= w[1].total_value));
}

#[tokio::test]
async fn top_products_ranks_by_value() {
  let s = seeded().await;
  let ranking = s.top_products(10).await.unwrap();
  assert_eq!(ranking.len(), 2);

  let prod001 = ranking.iter().find(|r| r.code == "PROD001").unwrap();
  assert_eq!(prod001.total_quantity, Decimal::new(15, 0));
  assert_eq!(prod001.total_value, money(15000));
  assert_eq!(prod001.document_count, 2);
  assert_eq!(prod001.item_count, 2);

  assert_eq!(ranking[0].code, "PROD002");
  assert_eq!(ranking[0].total_value, money(20000));
  assert_eq!(s.top_products(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn tax_view_sums_match_headers() {
  let s = seeded().await;
  let periods = s.tax_analysis(&PeriodRange::default()).await.unwrap();
  assert_eq!(periods.len(), 2);

  let march = &periods[0];
  assert_eq!(march.period.as_str(), "2024-03");
  assert_eq!(march.nfe_count, 2);
  assert_eq!(march.nfe_total, money(20000));
  assert_eq!(march.icms, money(3600));
  assert_eq!(march.nfse_count, 1);
  assert_eq!(march.issqn, money(7500));
  assert_eq!(march.grand_total, march.nfe_total + march.nfse_total);

  let april = s
    .tax_analysis(&PeriodRange { from: Some(Period::parse("2024-04").unwrap()), to: None })
    .await
    .unwrap();
  assert_eq!(april.len(), 1);
  assert_eq!(april[0].nfse_count, 0);
  assert_eq!(april[0].nfe_total, money(15000));
}

#[tokio::test]
async fn views_are_empty_on_a_fresh_store() {
  let s = store().await;
  assert!(s.unified_documents(&DocumentQuery::default()).await.unwrap().is_empty());
  assert!(s.supplier_summary().await.unwrap().is_empty());
  assert!(s.top_products(10).await.unwrap().is_empty());
  assert!(s.tax_analysis(&PeriodRange::default()).await.unwrap().is_empty());
}

// ─── Jobs ────────────────────────────────────────────────────────────────────

fn new_job(digest: &str) -> IngestJob {
  IngestJob::new(NewIngestJob {
    file_name: "nota.xml".into(),
    digest:    digest.into(),
  })
}

#[tokio::test]
async fn job_lifecycle_round_trips() {
  let s = store().await;
  let mut job = s.create_job(new_job("abc")).await.unwrap();
  assert!(s.find_job_by_digest("abc".into()).await.unwrap().is_none());

  job.advance(Stage::Parse);
  job.document_id = Some(KEY_1.into());
  job.advance(Stage::Classify);
  job.advance(Stage::Store);
  s.update_job(job.clone()).await.unwrap();

  let fetched = s.get_job(job.job_id).await.unwrap().unwrap();
  assert_eq!(fetched.status, JobStatus::Stored);
  assert_eq!(fetched.document_id.as_deref(), Some(KEY_1));

  let found = s.find_job_by_digest("abc".into()).await.unwrap().unwrap();
  assert_eq!(found.job_id, job.job_id);
}

#[tokio::test]
async fn failed_jobs_are_counted_by_status() {
  let s = store().await;
  let mut failed = s.create_job(new_job("bad")).await.unwrap();
  failed.fail(Stage::Parse, "unexpected end of document");
  s.update_job(failed).await.unwrap();
  s.create_job(new_job("pending")).await.unwrap();

  let counts = s.job_counts().await.unwrap();
  assert_eq!(counts.total(), 2);
  assert_eq!(counts.failed, 1);
  assert_eq!(counts.received, 1);
  assert_eq!(s.list_jobs(10).await.unwrap().len(), 2);
  assert_eq!(s.list_jobs(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn update_unknown_job_is_not_found() {
  let s = store().await;
  let mut job = new_job("x");
  job.job_id = Uuid::new_v4();
  let err = s.update_job(job).await.unwrap_err();
  assert!(matches!(err, Error::JobNotFound(_)));
}

#[tokio::test]
async fn reopening_a_file_store_keeps_data() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("warehouse.db");
  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.insert_nfe(nfe(KEY_1, at(2024, 3, 15), vec![item(1, "PROD001", 1, 100)]))
      .await
      .unwrap();
  }
  let s = SqliteStore::open(&path).await.unwrap();
  assert!(s.get_nfe(key(KEY_1)).await.unwrap().is_some());
}
