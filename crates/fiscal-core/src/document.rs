//! Document headers and whole-document input types.
//!
//! A `New*Document` is what the XML codec produces and what the store
//! consumes: header fields, the emitter and recipient dimensions it
//! references, and its fact rows. A stored `*Document` adds server-assigned
//! ids and timestamps.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  event::DocumentEvent,
  ids::{NfeKey, NfseId},
  item::{LineItem, NewLineItem, NewServiceLine, ServiceLine, non_negative},
  party::{Emitter, NewRecipient, Recipient},
};

/// Discriminator seeded in `dim_tipo_documento`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentKind {
  Nfe,
  Nfse,
}

impl DocumentKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Nfe => "NFE",
      Self::Nfse => "NFSE",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s.to_ascii_uppercase().as_str() {
      "NFE" => Ok(Self::Nfe),
      "NFSE" => Ok(Self::Nfse),
      _ => Err(Error::UnknownDiscriminant {
        kind:  "document kind",
        value: s.to_owned(),
      }),
    }
  }
}

/// NF-e `tpNF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
  Inbound,
  Outbound,
}

impl OperationType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Inbound => "inbound",
      Self::Outbound => "outbound",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "inbound" => Ok(Self::Inbound),
      "outbound" => Ok(Self::Outbound),
      other => Err(Error::UnknownDiscriminant {
        kind:  "operation type",
        value: other.to_owned(),
      }),
    }
  }

  /// Map the `tpNF` code (`0` entrada, `1` saída).
  pub fn from_code(code: &str) -> Option<Self> {
    match code {
      "0" => Some(Self::Inbound),
      "1" => Some(Self::Outbound),
      _ => None,
    }
  }
}

// ─── NF-e ────────────────────────────────────────────────────────────────────

/// `total/ICMSTot` plus the services subtotal from `total/ISSQNtot`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfeTotals {
  pub products:          Decimal,
  pub services:          Decimal,
  pub freight:           Decimal,
  pub insurance:         Decimal,
  pub discount:          Decimal,
  pub other:             Decimal,
  pub icms_base:         Decimal,
  pub icms:              Decimal,
  pub icms_st_base:      Decimal,
  pub icms_st:           Decimal,
  pub ipi:               Decimal,
  pub pis:               Decimal,
  pub cofins:            Decimal,
  /// `vTotTrib`, the approximate tax burden informed to the buyer.
  pub approximate_taxes: Decimal,
  /// `vNF`.
  pub total:             Decimal,
}

impl NfeTotals {
  /// ICMS + ICMS-ST + IPI + PIS + COFINS.
  pub fn tax_total(&self) -> Decimal {
    self.icms + self.icms_st + self.ipi + self.pis + self.cofins
  }

  fn validate(&self) -> Result<()> {
    for (field, value) in [
      ("totals.products", self.products),
      ("totals.services", self.services),
      ("totals.freight", self.freight),
      ("totals.insurance", self.insurance),
      ("totals.discount", self.discount),
      ("totals.other", self.other),
      ("totals.icms_base", self.icms_base),
      ("totals.icms", self.icms),
      ("totals.icms_st_base", self.icms_st_base),
      ("totals.icms_st", self.icms_st),
      ("totals.ipi", self.ipi),
      ("totals.pis", self.pis),
      ("totals.cofins", self.cofins),
      ("totals.approximate_taxes", self.approximate_taxes),
      ("totals.total", self.total),
    ] {
      non_negative(field, value)?;
    }
    Ok(())
  }
}

/// A fully parsed NF-e, ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNfeDocument {
  pub key:              NfeKey,
  pub number:           String,
  pub series:           String,
  pub model:            String,
  pub operation_nature: Option<String>,
  pub operation_type:   Option<OperationType>,
  pub issued_at:        DateTime<FixedOffset>,
  /// `dhSaiEnt`; absent on documents that never left draft.
  pub exit_entry_at:    Option<DateTime<FixedOffset>>,
  /// Authorisation protocol (`nProt`), when the file carries `protNFe`.
  pub protocol:         Option<String>,
  pub emitter:          Emitter,
  pub recipient:        Option<NewRecipient>,
  pub totals:           NfeTotals,
  pub items:            Vec<NewLineItem>,
}

impl NewNfeDocument {
  /// Check amounts, item presence and item-number uniqueness.
  pub fn validate(&self) -> Result<()> {
    self.totals.validate()?;
    if self.items.is_empty() {
      return Err(Error::EmptyDocument(self.key.to_string()));
    }
    validate_items(self.key.as_str(), &self.items)
  }
}

/// Validate a batch of items against each other. Used both for whole
/// documents and for appends to an existing header.
pub fn validate_items(document: &str, items: &[NewLineItem]) -> Result<()> {
  let mut seen = HashSet::new();
  for item in items {
    item.validate()?;
    if !seen.insert(item.item_number) {
      return Err(Error::DuplicateItem {
        document:    document.to_owned(),
        item_number: item.item_number,
      });
    }
  }
  Ok(())
}

/// The `nfe_main` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfeHeader {
  pub key:              NfeKey,
  pub number:           String,
  pub series:           String,
  pub model:            String,
  pub operation_nature: Option<String>,
  pub operation_type:   Option<OperationType>,
  pub issued_at:        DateTime<FixedOffset>,
  pub exit_entry_at:    Option<DateTime<FixedOffset>>,
  pub protocol:         Option<String>,
  /// Stored reference to `dim_emitente`.
  pub emitter_id:       String,
  pub recipient_id:     Option<i64>,
  pub totals:           NfeTotals,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfeDocument {
  pub header:    NfeHeader,
  pub emitter:   Emitter,
  pub recipient: Option<Recipient>,
  pub items:     Vec<LineItem>,
  pub events:    Vec<DocumentEvent>,
}

impl NfeDocument {
  pub fn is_cancelled(&self) -> bool {
    self.events.iter().any(|e| e.event.event_type.cancels())
  }
}

// ─── NFS-e ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfseTotals {
  /// `vServ`.
  pub services:               Decimal,
  pub deductions:             Decimal,
  pub unconditional_discount: Decimal,
  pub issqn_base:             Decimal,
  /// Percent.
  pub issqn_rate:             Decimal,
  pub issqn:                  Decimal,
  pub issqn_withheld:         bool,
  /// `vTotalRet`, federal and municipal withholdings together.
  pub total_withholdings:     Decimal,
  /// `vLiq`.
  pub net:                    Decimal,
}

impl NfseTotals {
  fn validate(&self) -> Result<()> {
    for (field, value) in [
      ("totals.services", self.services),
      ("totals.deductions", self.deductions),
      ("totals.unconditional_discount", self.unconditional_discount),
      ("totals.issqn_base", self.issqn_base),
      ("totals.issqn_rate", self.issqn_rate),
      ("totals.issqn", self.issqn),
      ("totals.total_withholdings", self.total_withholdings),
      ("totals.net", self.net),
    ] {
      non_negative(field, value)?;
    }
    Ok(())
  }
}

/// A fully parsed NFS-e, ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNfseDocument {
  pub id:                     NfseId,
  pub number:                 String,
  pub dps_series:             Option<String>,
  pub dps_number:             Option<String>,
  pub issued_at:              DateTime<FixedOffset>,
  pub competence_date:        Option<NaiveDate>,
  /// IBGE code of the municipality that issued the document.
  pub emission_municipality:  Option<String>,
  /// IBGE code of the municipality where ISSQN is due; may differ from
  /// the emission municipality.
  pub incidence_municipality: Option<String>,
  pub status_code:            Option<String>,
  pub emitter:                Emitter,
  pub recipient:              Option<NewRecipient>,
  pub totals:                 NfseTotals,
  pub services:               Vec<NewServiceLine>,
}

impl NewNfseDocument {
  pub fn validate(&self) -> Result<()> {
    self.totals.validate()?;
    if self.services.is_empty() {
      return Err(Error::EmptyDocument(self.id.to_string()));
    }
    let mut seen = HashSet::new();
    for line in &self.services {
      line.validate()?;
      if !seen.insert(line.line_number) {
        return Err(Error::DuplicateItem {
          document:    self.id.to_string(),
          item_number: line.line_number,
        });
      }
    }
    Ok(())
  }
}

/// The `nfse_main` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfseHeader {
  pub id:                     NfseId,
  pub number:                 String,
  pub dps_series:             Option<String>,
  pub dps_number:             Option<String>,
  pub issued_at:              DateTime<FixedOffset>,
  pub competence_date:        Option<NaiveDate>,
  pub emission_municipality:  Option<String>,
  pub incidence_municipality: Option<String>,
  pub status_code:            Option<String>,
  pub emitter_id:             String,
  pub recipient_id:           Option<i64>,
  pub totals:                 NfseTotals,
  pub created_at:             DateTime<Utc>,
  pub updated_at:             DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfseDocument {
  pub header:    NfseHeader,
  pub emitter:   Emitter,
  pub recipient: Option<Recipient>,
  pub services:  Vec<ServiceLine>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
