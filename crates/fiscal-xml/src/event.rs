//! NF-e lifecycle events: `procEventoNFe` (event plus SEFAZ response) or a
//! bare `evento`.

use fiscal_core::{
  event::{EventType, NewDocumentEvent},
  ids::NfeKey,
};

use crate::{
  error::{Error, Result},
  tree::{Element, Node},
};

pub(crate) fn map(root: &Element) -> Result<NewDocumentEvent> {
  let root = Node::root(root);
  let (evento, ret) = match root.name() {
    "procEventoNFe" => (root.req("evento")?, root.at("retEvento/infEvento")),
    "evento" => (root.clone(), None),
    other => return Err(Error::UnsupportedDocument(other.to_owned())),
  };
  let inf = evento.req("infEvento")?;
  let det = inf.at("detEvento");
  let det_text = |name: &str| det.as_ref().and_then(|d| d.text(name));

  let sequence = inf
    .number("nSeqEvento")?
    .ok_or_else(|| Error::MissingElement(format!("{}/nSeqEvento", inf.path())))?;
  let occurred_at = inf
    .datetime("dhEvento")?
    .ok_or_else(|| Error::MissingElement(format!("{}/dhEvento", inf.path())))?;

  Ok(NewDocumentEvent {
    key: NfeKey::parse(&inf.req_text("chNFe")?)?,
    event_type: EventType::from_code(&inf.req_text("tpEvento")?),
    sequence,
    occurred_at,
    description: det_text("descEvento"),
    justification: det_text("xJust").or_else(|| det_text("xCorrecao")),
    protocol: ret.as_ref().and_then(|r| r.text("nProt")),
  })
}
