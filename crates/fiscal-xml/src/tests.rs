//! Codec tests against the sample files in `fixtures/`.

use chrono::NaiveDate;
use fiscal_core::{
  document::OperationType,
  event::EventType,
  ids::TaxId,
  job::PayloadKind,
  party::TaxRegime,
};
use rust_decimal::Decimal;

use super::*;

const NFE: &[u8] = include_bytes!("../fixtures/nfe_proc.xml");
const NFSE: &[u8] = include_bytes!("../fixtures/nfse_nacional.xml");
const EVENT: &[u8] = include_bytes!("../fixtures/proc_evento_cancelamento.xml");

const KEY: &str = "35240311222333000181550010000000011000000015";

fn money(cents: i64) -> Decimal { Decimal::new(cents, 2) }

fn edited(src: &[u8], from: &str, to: &str) -> Vec<u8> {
  let text = std::str::from_utf8(src).unwrap();
  assert!(text.contains(from), "fixture does not contain {from:?}");
  text.replacen(from, to, 1).into_bytes()
}

// ─── Detection ───────────────────────────────────────────────────────────────

#[test]
fn detect_by_root_element() {
  assert_eq!(detect(NFE).unwrap(), PayloadKind::Nfe);
  assert_eq!(detect(NFSE).unwrap(), PayloadKind::Nfse);
  assert_eq!(detect(EVENT).unwrap(), PayloadKind::NfeEvent);

  let err = detect(b"<CompNfse><Nfse/></CompNfse>").unwrap_err();
  assert!(matches!(err, Error::UnsupportedDocument(root) if root == "CompNfse"));
}

#[test]
fn parse_dispatches_on_kind() {
  let parsed = parse(NFE).unwrap();
  assert_eq!(parsed.kind(), PayloadKind::Nfe);
  assert_eq!(parsed.document_id(), KEY);

  let parsed = parse(EVENT).unwrap();
  assert_eq!(parsed.kind(), PayloadKind::NfeEvent);
  assert_eq!(parsed.document_id(), KEY);
}

#[test]
fn garbage_is_an_xml_error() {
  assert!(matches!(parse(b"not xml at all <"), Err(Error::Xml(_))));
  assert!(matches!(parse(&NFE[..NFE.len() / 2]), Err(Error::Xml(_))));
}

// ─── NF-e ────────────────────────────────────────────────────────────────────

#[test]
fn nfe_header_and_parties() {
  let doc = parse_nfe(NFE).unwrap();

  assert_eq!(doc.key.as_str(), KEY);
  assert_eq!(doc.number, "1");
  assert_eq!(doc.series, "1");
  assert_eq!(doc.model, "55");
  assert_eq!(doc.operation_type, Some(OperationType::Outbound));
  assert_eq!(doc.issued_at.to_rfc3339(), "2024-03-15T10:00:00-03:00");
  assert!(doc.exit_entry_at.is_some());
  assert_eq!(doc.protocol.as_deref(), Some("135240000123456"));

  assert_eq!(doc.emitter.tax_id, TaxId::parse("11222333000181").unwrap());
  assert_eq!(doc.emitter.legal_name, "ACME Industria LTDA");
  assert_eq!(doc.emitter.tax_regime, Some(TaxRegime::Normal));
  assert_eq!(doc.emitter.address.uf.as_deref(), Some("SP"));

  let dest = doc.recipient.unwrap();
  assert_eq!(dest.tax_id, Some(TaxId::parse("45997418000153").unwrap()));
  assert_eq!(dest.email.as_deref(), Some("compras@comprador.com.br"));
  assert_eq!(dest.address.complement.as_deref(), Some("Conj 101"));
}

#[test]
fn nfe_items_and_tax_groups() {
  let doc = parse_nfe(NFE).unwrap();
  assert_eq!(doc.items.len(), 2);

  let first = &doc.items[0];
  assert_eq!(first.item_number, 1);
  assert_eq!(first.product.code, "PROD001");
  assert_eq!(first.product.ean.as_deref(), Some("7891234567895"));
  assert_eq!(first.quantity, Decimal::new(10, 0));
  assert_eq!(first.unit_price, money(1250));
  assert_eq!(first.icms.cst.as_deref(), Some("00"));
  assert_eq!(first.icms.value, money(2250));
  assert_eq!(first.ipi.value, money(625));
  assert_eq!(first.pis.rate, Decimal::new(165, 2));
  assert_eq!(first.cofins.value, money(950));

  let second = &doc.items[1];
  assert_eq!(second.product.ean, None);
  assert_eq!(second.icms.cst.as_deref(), Some("10"));
  assert_eq!(second.icms_st.base, money(12000));
  assert_eq!(second.icms_st.value, money(362));
  assert_eq!(second.ipi.cst.as_deref(), Some("53"));
  assert_eq!(second.ipi.value, Decimal::ZERO);
  assert_eq!(second.pis.cst.as_deref(), Some("07"));
  assert_eq!(second.pis.value, Decimal::ZERO);
}

#[test]
fn nfe_totals_match_items() {
  let doc = parse_nfe(NFE).unwrap();
  doc.validate().unwrap();

  let t = &doc.totals;
  assert_eq!(t.total, money(23477));
  assert_eq!(t.products, doc.items.iter().map(|i| i.gross_value).sum::<Decimal>());
  assert_eq!(t.icms, doc.items.iter().map(|i| i.icms.value).sum::<Decimal>());
  assert_eq!(t.icms_st, money(362));
  assert_eq!(t.services, Decimal::ZERO);
  assert_eq!(t.approximate_taxes, money(5829));
}

#[test]
fn bare_nfe_without_protocol() {
  let text = std::str::from_utf8(NFE).unwrap();
  let start = text.find("<NFe ").unwrap();
  let end = text.find("</NFe>").unwrap() + "</NFe>".len();

  let doc = parse_nfe(text[start..end].as_bytes()).unwrap();
  assert_eq!(doc.key.as_str(), KEY);
  assert_eq!(doc.protocol, None);
}

#[test]
fn nfe_key_falls_back_to_protocol() {
  let xml = edited(NFE, r#" Id="NFe35240311222333000181550010000000011000000015""#, "");
  let doc = parse_nfe(&xml).unwrap();
  assert_eq!(doc.key.as_str(), KEY);
}

#[test]
fn nfe_with_bad_check_digit_is_rejected() {
  let xml = edited(
    NFE,
    "NFe35240311222333000181550010000000011000000015",
    "NFe35240311222333000181550010000000011000000016",
  );
  let err = parse_nfe(&xml).unwrap_err();
  assert!(matches!(err, Error::Core(fiscal_core::Error::InvalidNfeKey { .. })));
}

#[test]
fn nfe_errors_name_the_path() {
  let xml = edited(NFE, "<xNome>ACME Industria LTDA</xNome>", "");
  let err = parse_nfe(&xml).unwrap_err();
  assert!(matches!(err, Error::MissingElement(p) if p == "nfeProc/NFe/infNFe/emit/xNome"));

  let xml = edited(NFE, "<vProd>99.90</vProd>", "<vProd>99,90</vProd>");
  let err = parse_nfe(&xml).unwrap_err();
  let Error::InvalidValue { path, .. } = err else {
    panic!("expected InvalidValue")
  };
  assert_eq!(path, "nfeProc/NFe/infNFe/det[2]/prod/vProd");
}

#[test]
fn nfe_parser_rejects_other_documents() {
  assert!(matches!(parse_nfe(NFSE), Err(Error::UnsupportedDocument(_))));
}

// ─── NFS-e ───────────────────────────────────────────────────────────────────

#[test]
fn nfse_national_layout() {
  let doc = parse_nfse(NFSE).unwrap();
  doc.validate().unwrap();

  assert_eq!(doc.id.municipality_code(), "3550308");
  assert_eq!(doc.number, "123");
  assert_eq!(doc.dps_series.as_deref(), Some("900"));
  assert_eq!(doc.dps_number.as_deref(), Some("12"));
  assert_eq!(doc.issued_at.to_rfc3339(), "2024-03-10T09:00:00-03:00");
  assert_eq!(doc.competence_date, NaiveDate::from_ymd_opt(2024, 3, 10));
  assert_eq!(doc.incidence_municipality.as_deref(), Some("3550308"));

  assert_eq!(doc.emitter.tax_id, TaxId::parse("45997418000153").unwrap());
  assert_eq!(doc.id.issuer_tax_id(), Some(doc.emitter.tax_id.clone()));
  assert_eq!(doc.emitter.tax_regime, Some(TaxRegime::Normal));
  assert_eq!(doc.emitter.address.postal_code.as_deref(), Some("01305000"));

  let toma = doc.recipient.as_ref().unwrap();
  assert_eq!(toma.tax_id, Some(TaxId::parse("12345678909").unwrap()));
  assert_eq!(toma.address.postal_code.as_deref(), Some("04538133"));
  assert_eq!(toma.address.street.as_deref(), Some("Avenida Brigadeiro Faria Lima"));
}

#[test]
fn nfse_values_and_service_line() {
  let doc = parse_nfse(NFSE).unwrap();

  assert_eq!(doc.totals.services, money(150000));
  assert_eq!(doc.totals.issqn_rate, Decimal::new(5, 0));
  assert_eq!(doc.totals.issqn, money(7500));
  assert!(!doc.totals.issqn_withheld);
  assert_eq!(doc.totals.net, money(150000));

  assert_eq!(doc.services.len(), 1);
  let line = &doc.services[0];
  assert_eq!(line.service.code, "010701");
  assert_eq!(line.service.municipal_code.as_deref(), Some("001"));
  assert_eq!(line.amount, money(150000));
  assert_eq!(line.issqn.value, money(7500));
}

#[test]
fn nfse_withheld_issqn() {
  let xml = edited(NFSE, "<tpRetISSQN>1</tpRetISSQN>", "<tpRetISSQN>2</tpRetISSQN>");
  let doc = parse_nfse(&xml).unwrap();
  assert!(doc.totals.issqn_withheld);
  assert!(doc.services[0].issqn_withheld);
}

#[test]
fn nfse_with_malformed_id_is_rejected() {
  let xml = edited(
    NFSE,
    r#"Id="NFS35503082245997418000153000000000012324031234567895""#,
    r#"Id="NFX35503082245997418000153000000000012324031234567895""#,
  );
  let err = parse_nfse(&xml).unwrap_err();
  assert!(matches!(err, Error::Core(fiscal_core::Error::InvalidNfseId { .. })));
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[test]
fn cancellation_event() {
  let ev = parse_nfe_event(EVENT).unwrap();
  assert_eq!(ev.key.as_str(), KEY);
  assert_eq!(ev.event_type, EventType::Cancellation);
  assert!(ev.event_type.cancels());
  assert_eq!(ev.sequence, 1);
  assert_eq!(ev.occurred_at.to_rfc3339(), "2024-03-20T14:30:00-03:00");
  assert_eq!(ev.description.as_deref(), Some("Cancelamento"));
  assert!(ev.justification.unwrap().starts_with("Erro na emissao"));
  assert_eq!(ev.protocol.as_deref(), Some("135240000999999"));
}

#[test]
fn correction_letter_text_becomes_justification() {
  let xml = edited(EVENT, "<tpEvento>110111</tpEvento>", "<tpEvento>110110</tpEvento>");
  let xml = edited(
    &xml,
    "<xJust>Erro na emissao da nota fiscal, pedido cancelado</xJust>",
    "<xCorrecao>Endereco de entrega corrigido</xCorrecao>",
  );
  let ev = parse_nfe_event(&xml).unwrap();
  assert_eq!(ev.event_type, EventType::CorrectionLetter);
  assert_eq!(ev.justification.as_deref(), Some("Endereco de entrega corrigido"));
}
