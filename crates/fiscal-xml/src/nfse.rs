//! National NFS-e layout (`NFSe/infNFSe` with the embedded `DPS/infDPS`).
//!
//! A national DPS declares a single service, so every document maps to one
//! service line.

use fiscal_core::{
  catalog::Service,
  document::{NewNfseDocument, NfseTotals},
  ids::{NfseId, TaxId},
  item::{NewServiceLine, TaxBlock},
  party::{Address, Emitter, NewRecipient, TaxRegime},
};
use rust_decimal::Decimal;

use crate::{
  error::{Error, Result},
  tree::{Element, Node, invalid},
};

pub(crate) fn map(root: &Element) -> Result<NewNfseDocument> {
  let root = Node::root(root);
  if root.name() != "NFSe" {
    return Err(Error::UnsupportedDocument(root.name().to_owned()));
  }
  let inf = root.req("infNFSe")?;
  let dps = inf.req("DPS/infDPS")?;

  let raw_id = inf
    .attr("Id")
    .ok_or_else(|| Error::MissingElement(format!("{}/@Id", inf.path())))?;
  let id = NfseId::parse(raw_id)?;

  let issued_at = match dps.datetime("dhEmi")? {
    Some(dt) => dt,
    None => inf
      .datetime("dhProc")?
      .ok_or_else(|| Error::MissingElement(format!("{}/dhEmi", dps.path())))?,
  };

  let service = service(&dps.req("serv")?)?;
  let totals = totals(&inf, &dps)?;
  let line = NewServiceLine {
    line_number:    1,
    description:    Some(service.description.clone()),
    service,
    quantity:       Decimal::ONE,
    amount:         totals.services,
    issqn:          TaxBlock {
      cst:   dps.text("valores/trib/tribMun/tribISSQN"),
      base:  totals.issqn_base,
      rate:  totals.issqn_rate,
      value: totals.issqn,
    },
    issqn_withheld: totals.issqn_withheld,
  };

  Ok(NewNfseDocument {
    number: inf.req_text("nNFSe")?,
    dps_series: dps.text("serie"),
    dps_number: dps.text("nDPS"),
    issued_at,
    competence_date: dps.date("dCompet")?,
    emission_municipality: dps
      .text("cLocEmi")
      .or_else(|| Some(id.municipality_code().to_owned())),
    incidence_municipality: inf.text("cLocIncid"),
    status_code: inf.text("cStat"),
    emitter: emitter(&inf.req("emit")?, dps.at("prest/regTrib/opSimpNac"))?,
    recipient: dps.at("toma").map(|t| recipient(&t)).transpose()?,
    totals,
    services: vec![line],
    id,
  })
}

fn tax_id(node: &Node<'_>) -> Result<Option<TaxId>> {
  Ok(match (node.text("CNPJ"), node.text("CPF")) {
    (Some(cnpj), _) => Some(TaxId::cnpj(&cnpj)?),
    (None, Some(cpf)) => Some(TaxId::cpf(&cpf)?),
    (None, None) => None,
  })
}

/// `enderNac` carries the municipality and CEP; street fields sit beside it
/// on the recipient (`toma/end`) and inside it on the emitter.
fn address(node: Option<Node<'_>>, phone: Option<String>) -> Address {
  let Some(n) = node else {
    return Address { phone, ..Default::default() };
  };
  let nac = n.at("endNac");
  let pick = |name: &str| nac.as_ref().and_then(|a| a.text(name)).or_else(|| n.text(name));
  Address {
    street: n.text("xLgr"),
    number: n.text("nro"),
    complement: n.text("xCpl"),
    district: n.text("xBairro"),
    municipality_code: pick("cMun"),
    municipality: None,
    uf: pick("UF"),
    postal_code: pick("CEP"),
    country: None,
    phone,
  }
}

/// `opSimpNac`: 1 not opted in, 2 MEI, 3 ME/EPP.
fn regime(code: Option<Node<'_>>) -> Result<Option<TaxRegime>> {
  let Some(node) = code else {
    return Ok(None);
  };
  match node.own_text() {
    None => Ok(None),
    Some("1") => Ok(Some(TaxRegime::Normal)),
    Some("2") => Ok(Some(TaxRegime::Mei)),
    Some("3") => Ok(Some(TaxRegime::SimplesNacional)),
    Some(other) => Err(invalid(node.path(), other)),
  }
}

fn emitter(emit: &Node<'_>, op_simp_nac: Option<Node<'_>>) -> Result<Emitter> {
  let tax_id = tax_id(emit)?
    .ok_or_else(|| Error::MissingElement(format!("{}/CNPJ", emit.path())))?;
  Ok(Emitter {
    tax_id,
    legal_name: emit.req_text("xNome")?,
    trade_name: emit.text("xFant"),
    state_registration: emit.text("IE"),
    municipal_registration: emit.text("IM"),
    tax_regime: regime(op_simp_nac)?,
    email: emit.text("email"),
    address: address(emit.at("enderNac"), emit.text("fone")),
  })
}

fn recipient(toma: &Node<'_>) -> Result<NewRecipient> {
  Ok(NewRecipient {
    tax_id:             tax_id(toma)?,
    document:           toma.text("NIF"),
    name:               toma.text("xNome"),
    state_registration: None,
    email:              toma.text("email"),
    address:            address(toma.at("end"), toma.text("fone")),
  })
}

fn service(serv: &Node<'_>) -> Result<Service> {
  let c = serv.req("cServ")?;
  let national = c.text("cTribNac");
  let municipal = c.text("cTribMun");
  let code = national
    .clone()
    .or_else(|| municipal.clone())
    .ok_or_else(|| Error::MissingElement(format!("{}/cTribNac", c.path())))?;
  Ok(Service {
    code,
    description: c.req_text("xDescServ")?,
    cnae: c.text("CNAE"),
    national_code: national,
    municipal_code: municipal,
    nbs: c.text("cNBS"),
  })
}

/// Computed values come from `infNFSe/valores`; declared ones from the DPS.
fn totals(inf: &Node<'_>, dps: &Node<'_>) -> Result<NfseTotals> {
  let computed = inf.at("valores");
  let declared = dps.req("valores")?;
  let services = declared.decimal("vServPrest/vServ")?;

  let from_computed = |name: &str| -> Result<Option<Decimal>> {
    match &computed {
      Some(v) => v.opt_decimal(name),
      None => Ok(None),
    }
  };

  let issqn_rate = match from_computed("pAliqAplic")? {
    Some(rate) => rate,
    None => declared.decimal("trib/tribMun/pAliq")?,
  };
  let withheld = match declared.text("trib/tribMun/tpRetISSQN").as_deref() {
    None | Some("1") => false,
    Some("2" | "3") => true,
    Some(other) => {
      return Err(invalid(&format!("{}/trib/tribMun/tpRetISSQN", declared.path()), other));
    }
  };

  Ok(NfseTotals {
    services,
    deductions: declared.decimal("vDedRed/vDR")?,
    unconditional_discount: declared.decimal("vDescCondIncond/vDescIncond")?,
    issqn_base: from_computed("vBC")?.unwrap_or(services),
    issqn_rate,
    issqn: from_computed("vISSQN")?.unwrap_or_default(),
    issqn_withheld: withheld,
    total_withholdings: from_computed("vTotalRet")?.unwrap_or_default(),
    net: from_computed("vLiq")?.unwrap_or(services),
  })
}
