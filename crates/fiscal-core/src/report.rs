//! Row types of the analytical views and their query parameters.

use std::{fmt, str::FromStr};

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, document::DocumentKind};

// ─── Period ──────────────────────────────────────────────────────────────────

/// A calendar month, `YYYY-MM`, taken from the issue date in its own offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period(String);

impl Period {
  pub fn parse(s: &str) -> Result<Self> {
    let bytes = s.as_bytes();
    let well_formed = bytes.len() == 7
      && bytes[4] == b'-'
      && bytes[..4].iter().all(u8::is_ascii_digit)
      && bytes[5..].iter().all(u8::is_ascii_digit);
    if !well_formed {
      return Err(Error::InvalidPeriod(s.to_owned()));
    }
    match s[5..].parse::<u8>() {
      Ok(1..=12) => Ok(Self(s.to_owned())),
      _ => Err(Error::InvalidPeriod(s.to_owned())),
    }
  }

  pub fn of(date: &DateTime<FixedOffset>) -> Self {
    Self(date.format("%Y-%m").to_string())
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Period {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl FromStr for Period {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl TryFrom<String> for Period {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<Period> for String {
  fn from(p: Period) -> Self { p.0 }
}

/// Inclusive range of periods; either bound may be open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRange {
  pub from: Option<Period>,
  pub to:   Option<Period>,
}

impl PeriodRange {
  pub fn contains(&self, period: &Period) -> bool {
    self.from.as_ref().is_none_or(|from| period >= from)
      && self.to.as_ref().is_none_or(|to| period <= to)
  }
}

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`FiscalStore::unified_documents`](crate::store::FiscalStore::unified_documents).
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
  pub kind:    Option<DocumentKind>,
  pub periods: PeriodRange,
  /// Emitter id (bare CNPJ/CPF digits).
  pub emitter: Option<String>,
  pub limit:   Option<usize>,
  pub offset:  Option<usize>,
}

// ─── View rows ───────────────────────────────────────────────────────────────

/// A row of `vw_documentos_unificados`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedDocument {
  pub kind:        DocumentKind,
  /// NF-e key or NFS-e id.
  pub document_id: String,
  pub number:      String,
  pub emitter_id:  String,
  pub legal_name:  String,
  pub issued_at:   DateTime<FixedOffset>,
  pub period:      Period,
  /// `vNF` for NF-e, `vServ` for NFS-e.
  pub total:       Decimal,
  pub taxes:       Decimal,
  pub cancelled:   bool,
}

/// A row of `vw_resumo_fornecedores`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierSummary {
  pub emitter_id:      String,
  pub legal_name:      String,
  pub trade_name:      Option<String>,
  pub uf:              Option<String>,
  pub nfe_count:       u64,
  pub nfse_count:      u64,
  pub first_issued_at: Option<DateTime<FixedOffset>>,
  pub last_issued_at:  Option<DateTime<FixedOffset>>,
  pub total_value:     Decimal,
  pub total_taxes:     Decimal,
}

/// A row of `vw_produtos_mais_comprados`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRanking {
  pub code:           String,
  pub description:    String,
  pub ncm:            Option<String>,
  pub category:       Option<String>,
  pub total_quantity: Decimal,
  pub total_value:    Decimal,
  pub document_count: u64,
  pub item_count:     u64,
}

/// A row of `vw_analise_impostos_periodo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxPeriodSummary {
  pub period:      Period,
  pub nfe_count:   u64,
  pub nfe_total:   Decimal,
  pub icms:        Decimal,
  pub icms_st:     Decimal,
  pub ipi:         Decimal,
  pub pis:         Decimal,
  pub cofins:      Decimal,
  pub nfse_count:  u64,
  pub nfse_total:  Decimal,
  pub issqn:       Decimal,
  /// `nfe_total + nfse_total`.
  pub grand_total: Decimal,
}
