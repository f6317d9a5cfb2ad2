//! Product and service dimensions.

use serde::{Deserialize, Serialize};

/// A product as described by an NF-e `det/prod` group.
///
/// `code` is the supplier's own code; the same physical product may appear
/// under different codes from different suppliers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
  pub code:        String,
  pub description: String,
  pub ean:         Option<String>,
  pub ncm:         Option<String>,
  pub cest:        Option<String>,
  pub cfop:        Option<String>,
  pub unit:        Option<String>,
  /// Assigned by a classifier after parsing; `None` until then.
  pub category:    Option<String>,
  pub subcategory: Option<String>,
}

impl Product {
  pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      code:        code.into(),
      description: description.into(),
      ean:         None,
      ncm:         None,
      cest:        None,
      cfop:        None,
      unit:        None,
      category:    None,
      subcategory: None,
    }
  }

  pub fn is_classified(&self) -> bool { self.category.is_some() }

  pub fn apply(&mut self, classification: Classification) {
    self.category = Some(classification.category);
    self.subcategory = classification.subcategory;
  }
}

/// Category assignment produced by a classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
  pub category:    String,
  pub subcategory: Option<String>,
}

/// A service as described by an NFS-e `serv/cServ` group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
  pub code:           String,
  pub description:    String,
  pub cnae:           Option<String>,
  /// `cTribNac`, the national taxation code (LC 116 item).
  pub national_code:  Option<String>,
  /// `cTribMun`, the municipal taxation code.
  pub municipal_code: Option<String>,
  pub nbs:            Option<String>,
}
