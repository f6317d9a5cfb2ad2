//! XML codec for Brazilian fiscal documents.
//!
//! Converts NF-e, national NFS-e and NF-e event files into [`fiscal_core`]
//! input types. Pure synchronous; no I/O or database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use fiscal_xml::{ParsedDocument, parse};
//!
//! let xml = std::fs::read("nota.xml").unwrap();
//! match parse(&xml).unwrap() {
//!   ParsedDocument::Nfe(doc) => println!("NF-e {} with {} items", doc.key, doc.items.len()),
//!   ParsedDocument::Nfse(doc) => println!("NFS-e {}", doc.id),
//!   ParsedDocument::Event(ev) => println!("event {} on {}", ev.event_type.code(), ev.key),
//! }
//! ```

pub mod error;
mod event;
mod nfe;
mod nfse;
mod tree;

pub use error::{Error, Result};
use fiscal_core::{
  document::{NewNfeDocument, NewNfseDocument},
  event::NewDocumentEvent,
  job::PayloadKind,
};

// ─── Public types ────────────────────────────────────────────────────────────

/// Any document this codec understands.
#[derive(Debug, Clone)]
pub enum ParsedDocument {
  Nfe(NewNfeDocument),
  Nfse(NewNfseDocument),
  Event(NewDocumentEvent),
}

impl ParsedDocument {
  pub fn kind(&self) -> PayloadKind {
    match self {
      Self::Nfe(_) => PayloadKind::Nfe,
      Self::Nfse(_) => PayloadKind::Nfse,
      Self::Event(_) => PayloadKind::NfeEvent,
    }
  }

  /// NF-e key or NFS-e id the document is about.
  pub fn document_id(&self) -> String {
    match self {
      Self::Nfe(doc) => doc.key.to_string(),
      Self::Nfse(doc) => doc.id.to_string(),
      Self::Event(ev) => ev.key.to_string(),
    }
  }
}

// ─── Public API ──────────────────────────────────────────────────────────────

fn kind_of_root(name: &str) -> Result<PayloadKind> {
  match name {
    "nfeProc" | "NFe" => Ok(PayloadKind::Nfe),
    "NFSe" => Ok(PayloadKind::Nfse),
    "procEventoNFe" | "evento" => Ok(PayloadKind::NfeEvent),
    other => Err(Error::UnsupportedDocument(other.to_owned())),
  }
}

/// Identify a document by its root element.
pub fn detect(xml: &[u8]) -> Result<PayloadKind> {
  let root = tree::parse(xml)?;
  kind_of_root(&root.name)
}

/// Detect and parse in one pass.
pub fn parse(xml: &[u8]) -> Result<ParsedDocument> {
  let root = tree::parse(xml)?;
  Ok(match kind_of_root(&root.name)? {
    PayloadKind::Nfe => ParsedDocument::Nfe(nfe::map(&root)?),
    PayloadKind::Nfse => ParsedDocument::Nfse(nfse::map(&root)?),
    PayloadKind::NfeEvent => ParsedDocument::Event(event::map(&root)?),
  })
}

/// Parse an `nfeProc` or bare `NFe` document.
pub fn parse_nfe(xml: &[u8]) -> Result<NewNfeDocument> { nfe::map(&tree::parse(xml)?) }

/// Parse a national-layout `NFSe` document.
pub fn parse_nfse(xml: &[u8]) -> Result<NewNfseDocument> { nfse::map(&tree::parse(xml)?) }

/// Parse a `procEventoNFe` or bare `evento` document.
pub fn parse_nfe_event(xml: &[u8]) -> Result<NewDocumentEvent> {
  event::map(&tree::parse(xml)?)
}

#[cfg(test)]
mod tests;
