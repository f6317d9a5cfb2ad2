//! Document keys and federal tax identifiers.
//!
//! All identifiers are validated on construction and serialised as plain
//! strings, so a value of these types is always well-formed.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

fn all_ascii_digits(s: &str) -> bool {
  !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn digit(b: u8) -> u32 { u32::from(b - b'0') }

/// Modulo-11 check digit with weights 2..=9 cycling from the rightmost
/// digit, as used by the NF-e access key.
fn mod11_cycling(digits: &str) -> u32 {
  let sum: u32 = digits
    .bytes()
    .rev()
    .zip((2..=9).cycle())
    .map(|(b, w)| digit(b) * w)
    .sum();
  match sum % 11 {
    0 | 1 => 0,
    r => 11 - r,
  }
}

// ─── NF-e access key ─────────────────────────────────────────────────────────

/// The 44-digit NF-e access key (`chave de acesso`).
///
/// Layout: `cUF(2) AAMM(4) CNPJ(14) mod(2) serie(3) nNF(9) tpEmis(1) cNF(8)
/// cDV(1)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NfeKey(String);

impl NfeKey {
  pub const LEN: usize = 44;

  /// Parse and validate a key, including its check digit.
  pub fn parse(s: &str) -> Result<Self> {
    let s = s.trim();
    let invalid = |reason| Error::InvalidNfeKey { value: s.to_owned(), reason };
    if s.len() != Self::LEN {
      return Err(invalid("expected 44 characters"));
    }
    if !all_ascii_digits(s) {
      return Err(invalid("expected only digits"));
    }
    let expected = mod11_cycling(&s[..Self::LEN - 1]);
    if digit(s.as_bytes()[Self::LEN - 1]) != expected {
      return Err(invalid("check digit mismatch"));
    }
    Ok(Self(s.to_owned()))
  }

  /// Build a key from its first 43 digits by appending the check digit.
  pub fn with_check_digit(prefix: &str) -> Result<Self> {
    if prefix.len() != Self::LEN - 1 || !all_ascii_digits(prefix) {
      return Err(Error::InvalidNfeKey {
        value:  prefix.to_owned(),
        reason: "expected 43 digits before the check digit",
      });
    }
    Ok(Self(format!("{prefix}{}", mod11_cycling(prefix))))
  }

  pub fn as_str(&self) -> &str { &self.0 }

  /// IBGE code of the issuing state (chars 1–2).
  pub fn uf_code(&self) -> &str { &self.0[0..2] }

  /// Issue year and month as `AAMM` (chars 3–6).
  pub fn year_month(&self) -> &str { &self.0[2..6] }

  /// Issuer CNPJ embedded in the key (chars 7–20).
  pub fn issuer_tax_id(&self) -> &str { &self.0[6..20] }

  /// Fiscal model, `55` for NF-e and `65` for NFC-e (chars 21–22).
  pub fn model(&self) -> &str { &self.0[20..22] }

  /// Series (chars 23–25).
  pub fn series(&self) -> &str { &self.0[22..25] }

  /// Document number (chars 26–34).
  pub fn number(&self) -> &str { &self.0[25..34] }
}

impl fmt::Display for NfeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl FromStr for NfeKey {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl TryFrom<String> for NfeKey {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<NfeKey> for String {
  fn from(k: NfeKey) -> Self { k.0 }
}

// ─── NFS-e identifier ────────────────────────────────────────────────────────

/// The 53-character national NFS-e identifier: `NFS` followed by the 50-digit
/// access key.
///
/// Key layout: `cMun(7) ambGer(1) tpInsc(1) inscricao(14) nNFSe(13) AAMM(4)
/// cNum(9) DV(1)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NfseId(String);

impl NfseId {
  pub const LEN: usize = 53;
  pub const PREFIX: &'static str = "NFS";

  pub fn parse(s: &str) -> Result<Self> {
    let s = s.trim();
    let invalid = |reason| Error::InvalidNfseId { value: s.to_owned(), reason };
    if s.len() != Self::LEN {
      return Err(invalid("expected 53 characters"));
    }
    let Some(digits) = s.strip_prefix(Self::PREFIX) else {
      return Err(invalid("expected NFS prefix"));
    };
    if !all_ascii_digits(digits) {
      return Err(invalid("expected 50 digits after the prefix"));
    }
    Ok(Self(s.to_owned()))
  }

  pub fn as_str(&self) -> &str { &self.0 }

  /// IBGE code of the issuing municipality.
  pub fn municipality_code(&self) -> &str { &self.0[3..10] }

  /// Issuer CPF/CNPJ as encoded in the key (`tpInsc` 1 = CPF, 2 = CNPJ).
  /// Returns `None` when the embedded value does not validate.
  pub fn issuer_tax_id(&self) -> Option<TaxId> {
    let inscricao = &self.0[12..26];
    match &self.0[11..12] {
      "1" => TaxId::cpf(&inscricao[3..]).ok(),
      "2" => TaxId::cnpj(inscricao).ok(),
      _ => None,
    }
  }

  /// Chars 9–22 of the identifier: the fixed offsets older warehouse views
  /// used to attribute a service document to its supplier. Kept for
  /// compatibility with data keyed that way; headers store the emitter
  /// explicitly.
  pub fn legacy_issuer_tax_id(&self) -> &str { &self.0[8..22] }
}

impl fmt::Display for NfseId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl FromStr for NfseId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl TryFrom<String> for NfseId {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<NfseId> for String {
  fn from(id: NfseId) -> Self { id.0 }
}

// ─── CNPJ / CPF ──────────────────────────────────────────────────────────────

/// A validated Brazilian federal tax id, stored as bare digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TaxId {
  /// 14-digit company id.
  Cnpj(String),
  /// 11-digit personal id.
  Cpf(String),
}

impl TaxId {
  /// Parse either form, dispatching on length after stripping the usual
  /// `.`, `/` and `-` punctuation.
  pub fn parse(s: &str) -> Result<Self> {
    let digits: String = s
      .trim()
      .chars()
      .filter(|c| !matches!(c, '.' | '/' | '-'))
      .collect();
    match digits.len() {
      14 => Self::cnpj(&digits),
      11 => Self::cpf(&digits),
      _ => Err(Error::InvalidTaxId(s.to_owned())),
    }
  }

  pub fn cnpj(s: &str) -> Result<Self> {
    if s.len() != 14 || !all_ascii_digits(s) || repeated(s) {
      return Err(Error::InvalidTaxId(s.to_owned()));
    }
    let dv = |base: &str, weights: &[u32]| -> u32 {
      let sum: u32 = base.bytes().zip(weights).map(|(b, w)| digit(b) * w).sum();
      match sum % 11 {
        0 | 1 => 0,
        r => 11 - r,
      }
    };
    const W1: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    const W2: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    let b = s.as_bytes();
    if dv(&s[..12], &W1) != digit(b[12]) || dv(&s[..13], &W2) != digit(b[13]) {
      return Err(Error::InvalidTaxId(s.to_owned()));
    }
    Ok(Self::Cnpj(s.to_owned()))
  }

  pub fn cpf(s: &str) -> Result<Self> {
    if s.len() != 11 || !all_ascii_digits(s) || repeated(s) {
      return Err(Error::InvalidTaxId(s.to_owned()));
    }
    let dv = |base: &str| -> u32 {
      let top = base.len() as u32 + 1;
      let sum: u32 = base
        .bytes()
        .enumerate()
        .map(|(i, b)| digit(b) * (top - i as u32))
        .sum();
      (sum * 10 % 11) % 10
    };
    let b = s.as_bytes();
    if dv(&s[..9]) != digit(b[9]) || dv(&s[..10]) != digit(b[10]) {
      return Err(Error::InvalidTaxId(s.to_owned()));
    }
    Ok(Self::Cpf(s.to_owned()))
  }

  pub fn digits(&self) -> &str {
    match self {
      Self::Cnpj(d) | Self::Cpf(d) => d,
    }
  }

  pub fn is_cnpj(&self) -> bool { matches!(self, Self::Cnpj(_)) }
}

fn repeated(s: &str) -> bool {
  let first = s.as_bytes()[0];
  s.bytes().all(|b| b == first)
}

impl fmt::Display for TaxId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.digits()) }
}

impl FromStr for TaxId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl TryFrom<String> for TaxId {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<TaxId> for String {
  fn from(id: TaxId) -> Self {
    match id {
      TaxId::Cnpj(d) | TaxId::Cpf(d) => d,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const KEY: &str = "35240311222333000181550010000000011000000015";

  #[test]
  fn nfe_key_accessors_follow_layout() {
    let key = NfeKey::parse(KEY).unwrap();
    assert_eq!(key.uf_code(), "35");
    assert_eq!(key.year_month(), "2403");
    assert_eq!(key.issuer_tax_id(), "11222333000181");
    assert_eq!(key.model(), "55");
    assert_eq!(key.series(), "001");
    assert_eq!(key.number(), "000000001");
  }

  #[test]
  fn nfe_key_rejects_bad_check_digit() {
    let mut bad = KEY[..43].to_owned();
    bad.push('9');
    assert!(matches!(
      NfeKey::parse(&bad),
      Err(Error::InvalidNfeKey { reason: "check digit mismatch", .. })
    ));
  }

  #[test]
  fn nfe_key_rejects_wrong_length_and_letters() {
    assert!(NfeKey::parse(&KEY[..40]).is_err());
    let lettered = format!("A{}", &KEY[1..]);
    assert!(NfeKey::parse(&lettered).is_err());
  }

  #[test]
  fn with_check_digit_builds_a_parseable_key() {
    let key = NfeKey::with_check_digit(&KEY[..43]).unwrap();
    assert_eq!(key.as_str(), KEY);
  }

  #[test]
  fn nfse_id_offsets() {
    let id = NfseId::parse("NFS35503082245997418000153000000000012324031234567895").unwrap();
    assert_eq!(id.municipality_code(), "3550308");
    assert_eq!(id.issuer_tax_id(), Some(TaxId::Cnpj("45997418000153".into())));
    assert_eq!(id.legacy_issuer_tax_id(), "08224599741800");
  }

  #[test]
  fn nfse_id_requires_prefix() {
    let err = NfseId::parse("XYZ35503082245997418000153000000000012324031234567895");
    assert!(matches!(err, Err(Error::InvalidNfseId { reason: "expected NFS prefix", .. })));
  }

  #[test]
  fn tax_id_validation() {
    assert!(matches!(TaxId::parse("11.222.333/0001-81"), Ok(TaxId::Cnpj(_))));
    assert!(matches!(TaxId::parse("529.982.247-25"), Ok(TaxId::Cpf(_))));
    assert!(TaxId::parse("11222333000182").is_err());
    assert!(TaxId::parse("00000000000").is_err());
    assert!(TaxId::parse("123").is_err());
  }
}
