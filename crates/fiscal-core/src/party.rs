//! Emitter (supplier) and recipient dimensions.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, ids::TaxId};

/// A postal address as carried by `enderEmit` / `enderDest` / `enderNac`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
  pub street:            Option<String>,
  pub number:            Option<String>,
  pub complement:        Option<String>,
  pub district:          Option<String>,
  /// 7-digit IBGE municipality code.
  pub municipality_code: Option<String>,
  pub municipality:      Option<String>,
  pub uf:                Option<String>,
  pub postal_code:       Option<String>,
  pub country:           Option<String>,
  pub phone:             Option<String>,
}

/// Tax regime of an emitter (NF-e `CRT`, NFS-e `opSimpNac`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxRegime {
  SimplesNacional,
  SimplesExcessoSublimite,
  Normal,
  Mei,
}

impl TaxRegime {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::SimplesNacional => "simples_nacional",
      Self::SimplesExcessoSublimite => "simples_excesso_sublimite",
      Self::Normal => "normal",
      Self::Mei => "mei",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "simples_nacional" => Ok(Self::SimplesNacional),
      "simples_excesso_sublimite" => Ok(Self::SimplesExcessoSublimite),
      "normal" => Ok(Self::Normal),
      "mei" => Ok(Self::Mei),
      other => Err(Error::UnknownDiscriminant {
        kind:  "tax regime",
        value: other.to_owned(),
      }),
    }
  }

  /// Map the NF-e `CRT` code.
  pub fn from_crt(code: &str) -> Option<Self> {
    match code {
      "1" => Some(Self::SimplesNacional),
      "2" => Some(Self::SimplesExcessoSublimite),
      "3" => Some(Self::Normal),
      "4" => Some(Self::Mei),
      _ => None,
    }
  }
}

/// The issuing supplier. Keyed by its CNPJ or CPF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emitter {
  pub tax_id:                 TaxId,
  pub legal_name:             String,
  pub trade_name:             Option<String>,
  /// Inscrição estadual.
  pub state_registration:     Option<String>,
  /// Inscrição municipal.
  pub municipal_registration: Option<String>,
  pub tax_regime:             Option<TaxRegime>,
  pub email:                  Option<String>,
  pub address:                Address,
}

impl Emitter {
  pub fn new(tax_id: TaxId, legal_name: impl Into<String>) -> Self {
    Self {
      tax_id,
      legal_name: legal_name.into(),
      trade_name: None,
      state_registration: None,
      municipal_registration: None,
      tax_regime: None,
      email: None,
      address: Address::default(),
    }
  }
}

/// Input for a recipient row. The tax id is optional because recipients are
/// frequently foreign buyers or consumers without a valid id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecipient {
  pub tax_id:             Option<TaxId>,
  /// The identifier exactly as found in the document, valid or not.
  pub document:           Option<String>,
  pub name:               Option<String>,
  pub state_registration: Option<String>,
  pub email:              Option<String>,
  pub address:            Address,
}

/// A stored recipient, identified by a surrogate key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
  pub recipient_id: i64,
  #[serde(flatten)]
  pub details:      NewRecipient,
}
