//! Fact rows: NF-e line items and NFS-e service lines.
//!
//! Each tax block carries its own base, rate and value. The blocks are
//! independent of each other; a line may apply a different legal base to
//! each tax, so nothing here derives one block from another.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  catalog::{Product, Service},
  ids::{NfeKey, NfseId},
};

pub(crate) fn positive(field: impl Into<String>, value: u32) -> Result<()> {
  if value == 0 {
    return Err(Error::ZeroNumber { field: field.into() });
  }
  Ok(())
}

pub(crate) fn non_negative(field: impl Into<String>, value: Decimal) -> Result<()> {
  if value < Decimal::ZERO {
    return Err(Error::NegativeAmount { field: field.into() });
  }
  Ok(())
}

// ─── Tax block ───────────────────────────────────────────────────────────────

/// Base, rate (percent) and computed value of one tax on one line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBlock {
  /// CST or CSOSN code as issued.
  pub cst:   Option<String>,
  pub base:  Decimal,
  pub rate:  Decimal,
  pub value: Decimal,
}

impl TaxBlock {
  pub fn new(base: Decimal, rate: Decimal, value: Decimal) -> Self {
    Self { cst: None, base, rate, value }
  }

  fn validate(&self, field: &str) -> Result<()> {
    non_negative(format!("{field}.base"), self.base)?;
    non_negative(format!("{field}.rate"), self.rate)?;
    non_negative(format!("{field}.value"), self.value)
  }
}

// ─── NF-e line item ──────────────────────────────────────────────────────────

/// One `det` group of an NF-e, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLineItem {
  /// `det/@nItem`, 1-based and unique within the document.
  pub item_number: u32,
  pub product:     Product,
  pub cfop:        Option<String>,
  pub unit:        Option<String>,
  pub quantity:    Decimal,
  pub unit_price:  Decimal,
  /// `vProd`: quantity × unit price as declared.
  pub gross_value: Decimal,
  pub discount:    Decimal,
  pub freight:     Decimal,
  pub icms:        TaxBlock,
  pub icms_st:     TaxBlock,
  pub ipi:         TaxBlock,
  pub pis:         TaxBlock,
  pub cofins:      TaxBlock,
}

impl NewLineItem {
  pub fn validate(&self) -> Result<()> {
    positive("item_number", self.item_number)?;
    let at = |f: &str| format!("item {}.{f}", self.item_number);
    non_negative(at("quantity"), self.quantity)?;
    non_negative(at("unit_price"), self.unit_price)?;
    non_negative(at("gross_value"), self.gross_value)?;
    non_negative(at("discount"), self.discount)?;
    non_negative(at("freight"), self.freight)?;
    self.icms.validate(&at("icms"))?;
    self.icms_st.validate(&at("icms_st"))?;
    self.ipi.validate(&at("ipi"))?;
    self.pis.validate(&at("pis"))?;
    self.cofins.validate(&at("cofins"))
  }

  /// Sum of the tax values carried on this line.
  pub fn tax_total(&self) -> Decimal {
    self.icms.value + self.icms_st.value + self.ipi.value + self.pis.value + self.cofins.value
  }
}

/// A stored NF-e line item. `item.product` reflects the product dimension
/// at read time, including any later classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
  pub item_id:    i64,
  pub key:        NfeKey,
  #[serde(flatten)]
  pub item:       NewLineItem,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

// ─── NFS-e service line ──────────────────────────────────────────────────────

/// One service rendered on an NFS-e. Only ISSQN applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewServiceLine {
  pub line_number:    u32,
  pub service:        Service,
  /// Free-text discrimination of the service.
  pub description:    Option<String>,
  pub quantity:       Decimal,
  pub amount:         Decimal,
  pub issqn:          TaxBlock,
  /// Whether the ISSQN is withheld by the taker or an intermediary.
  pub issqn_withheld: bool,
}

impl NewServiceLine {
  pub fn validate(&self) -> Result<()> {
    positive("line_number", self.line_number)?;
    let at = |f: &str| format!("service {}.{f}", self.line_number);
    non_negative(at("quantity"), self.quantity)?;
    non_negative(at("amount"), self.amount)?;
    self.issqn.validate(&at("issqn"))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLine {
  pub line_id:    i64,
  pub id:         NfseId,
  #[serde(flatten)]
  pub line:       NewServiceLine,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}
