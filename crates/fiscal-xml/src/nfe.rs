//! NF-e (model 55/65) layout 4.00 mapper.
//!
//! Accepts either the authorised envelope (`nfeProc` with `NFe` and
//! `protNFe`) or a bare `NFe`.

use fiscal_core::{
  catalog::Product,
  document::{NewNfeDocument, NfeTotals, OperationType},
  ids::{NfeKey, TaxId},
  item::{NewLineItem, TaxBlock},
  party::{Address, Emitter, NewRecipient, TaxRegime},
};

use crate::{
  error::{Error, Result},
  tree::{Element, Node, invalid},
};

pub(crate) fn map(root: &Element) -> Result<NewNfeDocument> {
  let root = Node::root(root);
  let (nfe, prot) = match root.name() {
    "nfeProc" => (root.req("NFe")?, root.at("protNFe/infProt")),
    "NFe" => (root.clone(), None),
    other => return Err(Error::UnsupportedDocument(other.to_owned())),
  };
  let inf = nfe.req("infNFe")?;

  let key = key(&inf, prot.as_ref())?;
  let ide = inf.req("ide")?;
  let issued_at = match ide.datetime("dhEmi")? {
    Some(dt) => dt,
    None => ide
      .datetime("dEmi")?
      .ok_or_else(|| Error::MissingElement(format!("{}/dhEmi", ide.path())))?,
  };
  let exit_entry_at = match ide.datetime("dhSaiEnt")? {
    Some(dt) => Some(dt),
    None => ide.datetime("dSaiEnt")?,
  };
  let operation_type = match ide.text("tpNF") {
    Some(code) => Some(
      OperationType::from_code(&code)
        .ok_or_else(|| invalid(&format!("{}/tpNF", ide.path()), &code))?,
    ),
    None => None,
  };

  let items = inf
    .all("det")
    .iter()
    .map(item)
    .collect::<Result<Vec<_>>>()?;

  Ok(NewNfeDocument {
    number: ide.req_text("nNF")?,
    series: ide.req_text("serie")?,
    model: ide.req_text("mod")?,
    operation_nature: ide.text("natOp"),
    operation_type,
    issued_at,
    exit_entry_at,
    protocol: prot.as_ref().and_then(|p| p.text("nProt")),
    emitter: emitter(&inf.req("emit")?)?,
    recipient: inf.at("dest").map(|d| recipient(&d)).transpose()?,
    totals: totals(&inf.req("total")?)?,
    items,
    key,
  })
}

fn key(inf: &Node<'_>, prot: Option<&Node<'_>>) -> Result<NfeKey> {
  if let Some(id) = inf.attr("Id") {
    return Ok(NfeKey::parse(id.strip_prefix("NFe").unwrap_or(id))?);
  }
  match prot.and_then(|p| p.text("chNFe")) {
    Some(ch) => Ok(NfeKey::parse(&ch)?),
    None => Err(Error::MissingElement(format!("{}/@Id", inf.path()))),
  }
}

// ─── Parties ─────────────────────────────────────────────────────────────────

fn address(node: Option<Node<'_>>) -> Address {
  let Some(n) = node else {
    return Address::default();
  };
  Address {
    street:            n.text("xLgr"),
    number:            n.text("nro"),
    complement:        n.text("xCpl"),
    district:          n.text("xBairro"),
    municipality_code: n.text("cMun"),
    municipality:      n.text("xMun"),
    uf:                n.text("UF"),
    postal_code:       n.text("CEP"),
    country:           n.text("xPais"),
    phone:             n.text("fone"),
  }
}

fn emitter(emit: &Node<'_>) -> Result<Emitter> {
  let tax_id = match (emit.text("CNPJ"), emit.text("CPF")) {
    (Some(cnpj), _) => TaxId::cnpj(&cnpj)?,
    (None, Some(cpf)) => TaxId::cpf(&cpf)?,
    (None, None) => return Err(Error::MissingElement(format!("{}/CNPJ", emit.path()))),
  };
  let tax_regime = match emit.text("CRT") {
    Some(crt) => Some(
      TaxRegime::from_crt(&crt)
        .ok_or_else(|| invalid(&format!("{}/CRT", emit.path()), &crt))?,
    ),
    None => None,
  };
  Ok(Emitter {
    tax_id,
    legal_name: emit.req_text("xNome")?,
    trade_name: emit.text("xFant"),
    state_registration: emit.text("IE"),
    municipal_registration: emit.text("IM"),
    tax_regime,
    email: None,
    address: address(emit.at("enderEmit")),
  })
}

fn recipient(dest: &Node<'_>) -> Result<NewRecipient> {
  let tax_id = match (dest.text("CNPJ"), dest.text("CPF")) {
    (Some(cnpj), _) => Some(TaxId::cnpj(&cnpj)?),
    (None, Some(cpf)) => Some(TaxId::cpf(&cpf)?),
    (None, None) => None,
  };
  Ok(NewRecipient {
    tax_id,
    document: dest.text("idEstrangeiro"),
    name: dest.text("xNome"),
    state_registration: dest.text("IE"),
    email: dest.text("email"),
    address: address(dest.at("enderDest")),
  })
}

// ─── Items ───────────────────────────────────────────────────────────────────

fn item(det: &Node<'_>) -> Result<NewLineItem> {
  let raw_number = det
    .attr("nItem")
    .ok_or_else(|| Error::MissingElement(format!("{}/@nItem", det.path())))?;
  let item_number = raw_number
    .parse::<u32>()
    .map_err(|_| invalid(&format!("{}/@nItem", det.path()), raw_number))?;

  let prod = det.req("prod")?;
  let product = Product {
    ean: prod.text("cEAN").filter(|ean| ean != "SEM GTIN"),
    ncm: prod.text("NCM"),
    cest: prod.text("CEST"),
    cfop: prod.text("CFOP"),
    unit: prod.text("uCom"),
    ..Product::new(prod.req_text("cProd")?, prod.req_text("xProd")?)
  };

  let imposto = det.at("imposto");
  let group = |name: &str| {
    imposto
      .as_ref()
      .and_then(|i| i.at(name))
      .and_then(|n| n.first_child())
  };
  let icms = group("ICMS");
  let ipi = imposto.as_ref().and_then(|i| i.any(&["IPI/IPITrib", "IPI/IPINT"]));

  Ok(NewLineItem {
    item_number,
    cfop: product.cfop.clone(),
    unit: product.unit.clone(),
    quantity: prod.decimal("qCom")?,
    unit_price: prod.decimal("vUnCom")?,
    gross_value: prod.decimal("vProd")?,
    discount: prod.decimal("vDesc")?,
    freight: prod.decimal("vFrete")?,
    icms: tax(icms.as_ref(), &["CST", "CSOSN"], "vBC", "pICMS", "vICMS")?,
    icms_st: TaxBlock {
      cst: None,
      ..tax(icms.as_ref(), &[], "vBCST", "pICMSST", "vICMSST")?
    },
    ipi: tax(ipi.as_ref(), &["CST"], "vBC", "pIPI", "vIPI")?,
    pis: tax(group("PIS").as_ref(), &["CST"], "vBC", "pPIS", "vPIS")?,
    cofins: tax(group("COFINS").as_ref(), &["CST"], "vBC", "pCOFINS", "vCOFINS")?,
    product,
  })
}

/// Read one tax group. Absent groups and absent leaves are zero.
fn tax(
  group: Option<&Node<'_>>,
  cst: &[&str],
  base: &str,
  rate: &str,
  value: &str,
) -> Result<TaxBlock> {
  let Some(g) = group else {
    return Ok(TaxBlock::default());
  };
  Ok(TaxBlock {
    cst:   cst.iter().find_map(|c| g.text(c)),
    base:  g.decimal(base)?,
    rate:  g.decimal(rate)?,
    value: g.decimal(value)?,
  })
}

// ─── Totals ──────────────────────────────────────────────────────────────────

fn totals(total: &Node<'_>) -> Result<NfeTotals> {
  let t = total.req("ICMSTot")?;
  Ok(NfeTotals {
    products:          t.decimal("vProd")?,
    services:          total.decimal("ISSQNtot/vServ")?,
    freight:           t.decimal("vFrete")?,
    insurance:         t.decimal("vSeg")?,
    discount:          t.decimal("vDesc")?,
    other:             t.decimal("vOutro")?,
    icms_base:         t.decimal("vBC")?,
    icms:              t.decimal("vICMS")?,
    icms_st_base:      t.decimal("vBCST")?,
    icms_st:           t.decimal("vST")?,
    ipi:               t.decimal("vIPI")?,
    pis:               t.decimal("vPIS")?,
    cofins:            t.decimal("vCOFINS")?,
    approximate_taxes: t.decimal("vTotTrib")?,
    total:             t.decimal("vNF")?,
  })
}
