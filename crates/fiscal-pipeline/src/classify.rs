//! Product classifiers.
//!
//! The classify stage asks a [`Classifier`] for a category for every product
//! that arrives without one. Products that already carry a category are left
//! alone, and the store keeps a category once one has been assigned.

use std::collections::BTreeMap;

use fiscal_core::catalog::{Classification, Product};

/// Assigns categories to products.
pub trait Classifier: Send + Sync {
  /// `None` leaves the product unclassified.
  fn classify(&self, product: &Product) -> Option<Classification>;
}

/// Never classifies anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopClassifier;

impl Classifier for NoopClassifier {
  fn classify(&self, _product: &Product) -> Option<Classification> { None }
}

/// Classifies by NCM prefix. When several prefixes match, the longest wins.
///
/// Prefixes may be written with the dotted notation of the NCM table
/// (`8471.30`); the dots are ignored.
#[derive(Debug, Clone, Default)]
pub struct NcmPrefixClassifier {
  rules: BTreeMap<String, Classification>,
}

impl NcmPrefixClassifier {
  pub fn new<I, K>(rules: I) -> Self
  where
    I: IntoIterator<Item = (K, Classification)>,
    K: AsRef<str>,
  {
    let rules = rules
      .into_iter()
      .map(|(prefix, class)| (digits(prefix.as_ref()), class))
      .filter(|(prefix, _)| !prefix.is_empty())
      .collect();
    Self { rules }
  }

  pub fn len(&self) -> usize { self.rules.len() }

  pub fn is_empty(&self) -> bool { self.rules.is_empty() }
}

fn digits(s: &str) -> String { s.chars().filter(char::is_ascii_digit).collect() }

impl Classifier for NcmPrefixClassifier {
  fn classify(&self, product: &Product) -> Option<Classification> {
    let ncm = digits(product.ncm.as_deref()?);
    self
      .rules
      .iter()
      .filter(|(prefix, _)| ncm.starts_with(prefix.as_str()))
      .max_by_key(|(prefix, _)| prefix.len())
      .map(|(_, class)| class.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn class(category: &str, subcategory: Option<&str>) -> Classification {
    Classification {
      category:    category.into(),
      subcategory: subcategory.map(Into::into),
    }
  }

  fn product(ncm: Option<&str>) -> Product {
    Product { ncm: ncm.map(Into::into), ..Product::new("P1", "Notebook") }
  }

  fn classifier() -> NcmPrefixClassifier {
    NcmPrefixClassifier::new([
      ("84", class("Maquinas", None)),
      ("8471", class("Informatica", None)),
      ("8471.30", class("Informatica", Some("Portateis"))),
      ("", class("ignored", None)),
    ])
  }

  #[test]
  fn longest_prefix_wins() {
    let c = classifier();
    assert_eq!(c.len(), 3);
    assert_eq!(
      c.classify(&product(Some("84713012"))),
      Some(class("Informatica", Some("Portateis")))
    );
    assert_eq!(c.classify(&product(Some("84715010"))), Some(class("Informatica", None)));
    assert_eq!(c.classify(&product(Some("8409.10.00"))), Some(class("Maquinas", None)));
  }

  #[test]
  fn unmatched_or_missing_ncm_is_unclassified() {
    let c = classifier();
    assert_eq!(c.classify(&product(Some("22021000"))), None);
    assert_eq!(c.classify(&product(None)), None);
    assert_eq!(NoopClassifier.classify(&product(Some("84713012"))), None);
  }
}
