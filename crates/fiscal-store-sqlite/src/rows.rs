//! Row types: the column values of one table row, already encoded.
//!
//! Each `Raw*` type is built from a domain value before a write (so encoding
//! failures surface before a transaction opens), is read straight out of a
//! `rusqlite::Row` inside a connection call, and is decoded back into the
//! domain type after the call returns.

use chrono::{DateTime, Utc};
use fiscal_core::{
  catalog::{Product, Service},
  document::{
    DocumentKind, NewNfeDocument, NewNfseDocument, NfeDocument, NfeHeader, NfeTotals,
    NfseDocument, NfseHeader, NfseTotals, OperationType,
  },
  event::{DocumentEvent, EventType, NewDocumentEvent},
  ids::{NfeKey, NfseId, TaxId},
  item::{LineItem, NewLineItem, NewServiceLine, ServiceLine, TaxBlock},
  job::{IngestJob, JobStatus, PayloadKind, Stage},
  party::{Emitter, NewRecipient, Recipient, TaxRegime},
  report::{Period, ProductRanking, SupplierSummary, TaxPeriodSummary, UnifiedDocument},
};
use rusqlite::Row;

use crate::{
  Result,
  encode::{
    QUANTITY_SCALE, RATE_SCALE, UNIT_PRICE_SCALE, decode_address, decode_count,
    decode_date, decode_decimal, decode_dt, decode_local_dt, decode_money, decode_u32,
    decode_uuid, encode_address, encode_date, encode_decimal, encode_dt,
    encode_local_dt, encode_money, encode_uuid,
  },
};

// ─── Column lists ────────────────────────────────────────────────────────────

/// `dim_emitente` columns, table alias `e`.
pub const EMITTER_COLUMNS: &str = "e.emitente_id, e.cnpj, e.cpf, e.razao_social, \
  e.nome_fantasia, e.inscricao_estadual, e.inscricao_municipal, e.regime_tributario, \
  e.email, e.uf, e.codigo_municipio, e.endereco";

/// `dim_destinatario` columns, table alias `d`.
pub const RECIPIENT_COLUMNS: &str = "d.destinatario_id, d.cnpj, d.cpf, d.documento, \
  d.nome, d.inscricao_estadual, d.email, d.uf, d.codigo_municipio, d.endereco";

/// `dim_produtos` columns, table alias `p`. `cfop` and `unidade` are
/// aliased because item rows carry columns of the same name.
pub const PRODUCT_COLUMNS: &str = "p.codigo_produto, p.descricao, p.ean, p.ncm, p.cest, \
  p.cfop AS produto_cfop, p.unidade AS produto_unidade, p.categoria, p.subcategoria";

/// `dim_servicos` columns, table alias `sv`.
pub const SERVICE_COLUMNS: &str = "sv.codigo_servico, sv.descricao AS servico_descricao, \
  sv.cnae, sv.codigo_tributacao_nacional, sv.codigo_tributacao_municipal, sv.nbs";

// ─── Emitter ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RawEmitter {
  pub emitente_id:         String,
  pub cnpj:                Option<String>,
  pub cpf:                 Option<String>,
  pub razao_social:        String,
  pub nome_fantasia:       Option<String>,
  pub inscricao_estadual:  Option<String>,
  pub inscricao_municipal: Option<String>,
  pub regime_tributario:   Option<String>,
  pub email:               Option<String>,
  pub uf:                  Option<String>,
  pub codigo_municipio:    Option<String>,
  pub endereco:            Option<String>,
}

impl RawEmitter {
  pub fn encode(e: &Emitter) -> Result<Self> {
    let (cnpj, cpf) = split_tax_id(Some(&e.tax_id));
    Ok(Self {
      emitente_id: e.tax_id.digits().to_owned(),
      cnpj,
      cpf,
      razao_social: e.legal_name.clone(),
      nome_fantasia: e.trade_name.clone(),
      inscricao_estadual: e.state_registration.clone(),
      inscricao_municipal: e.municipal_registration.clone(),
      regime_tributario: e.tax_regime.map(|r| r.as_str().to_owned()),
      email: e.email.clone(),
      uf: e.address.uf.clone(),
      codigo_municipio: e.address.municipality_code.clone(),
      endereco: encode_address(&e.address)?,
    })
  }

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      emitente_id:         row.get("emitente_id")?,
      cnpj:                row.get("cnpj")?,
      cpf:                 row.get("cpf")?,
      razao_social:        row.get("razao_social")?,
      nome_fantasia:       row.get("nome_fantasia")?,
      inscricao_estadual:  row.get("inscricao_estadual")?,
      inscricao_municipal: row.get("inscricao_municipal")?,
      regime_tributario:   row.get("regime_tributario")?,
      email:               row.get("email")?,
      uf:                  row.get("uf")?,
      codigo_municipio:    row.get("codigo_municipio")?,
      endereco:            row.get("endereco")?,
    })
  }

  pub fn into_emitter(self) -> Result<Emitter> {
    Ok(Emitter {
      tax_id:                 TaxId::parse(&self.emitente_id)?,
      legal_name:             self.razao_social,
      trade_name:             self.nome_fantasia,
      state_registration:     self.inscricao_estadual,
      municipal_registration: self.inscricao_municipal,
      tax_regime:             self
        .regime_tributario
        .as_deref()
        .map(TaxRegime::parse)
        .transpose()?,
      email:                  self.email,
      address:                decode_address(self.endereco.as_deref())?,
    })
  }
}

fn split_tax_id(id: Option<&TaxId>) -> (Option<String>, Option<String>) {
  match id {
    Some(TaxId::Cnpj(d)) => (Some(d.clone()), None),
    Some(TaxId::Cpf(d)) => (None, Some(d.clone())),
    None => (None, None),
  }
}

// ─── Recipient ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RawRecipient {
  pub cnpj:               Option<String>,
  pub cpf:                Option<String>,
  pub documento:          Option<String>,
  pub nome:               Option<String>,
  pub inscricao_estadual: Option<String>,
  pub email:              Option<String>,
  pub uf:                 Option<String>,
  pub codigo_municipio:   Option<String>,
  pub endereco:           Option<String>,
}

impl RawRecipient {
  pub fn encode(r: &NewRecipient) -> Result<Self> {
    let (cnpj, cpf) = split_tax_id(r.tax_id.as_ref());
    Ok(Self {
      cnpj,
      cpf,
      documento: r.document.clone(),
      nome: r.name.clone(),
      inscricao_estadual: r.state_registration.clone(),
      email: r.email.clone(),
      uf: r.address.uf.clone(),
      codigo_municipio: r.address.municipality_code.clone(),
      endereco: encode_address(&r.address)?,
    })
  }

  /// Reads `(destinatario_id, row)`.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<(i64, Self)> {
    Ok((row.get("destinatario_id")?, Self {
      cnpj:               row.get("cnpj")?,
      cpf:                row.get("cpf")?,
      documento:          row.get("documento")?,
      nome:               row.get("nome")?,
      inscricao_estadual: row.get("inscricao_estadual")?,
      email:              row.get("email")?,
      uf:                 row.get("uf")?,
      codigo_municipio:   row.get("codigo_municipio")?,
      endereco:           row.get("endereco")?,
    }))
  }

  pub fn into_recipient(self, recipient_id: i64) -> Result<Recipient> {
    let tax_id = self.cnpj.or(self.cpf).as_deref().map(TaxId::parse).transpose()?;
    Ok(Recipient {
      recipient_id,
      details: NewRecipient {
        tax_id,
        document: self.documento,
        name: self.nome,
        state_registration: self.inscricao_estadual,
        email: self.email,
        address: decode_address(self.endereco.as_deref())?,
      },
    })
  }
}

// ─── Product / service ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RawProduct {
  pub codigo_produto: String,
  pub descricao:      String,
  pub ean:            Option<String>,
  pub ncm:            Option<String>,
  pub cest:           Option<String>,
  pub cfop:           Option<String>,
  pub unidade:        Option<String>,
  pub categoria:      Option<String>,
  pub subcategoria:   Option<String>,
}

impl RawProduct {
  /// Expects the aliases of [`PRODUCT_COLUMNS`].
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      codigo_produto: row.get("codigo_produto")?,
      descricao:      row.get("descricao")?,
      ean:            row.get("ean")?,
      ncm:            row.get("ncm")?,
      cest:           row.get("cest")?,
      cfop:           row.get("produto_cfop")?,
      unidade:        row.get("produto_unidade")?,
      categoria:      row.get("categoria")?,
      subcategoria:   row.get("subcategoria")?,
    })
  }
}

impl From<&Product> for RawProduct {
  fn from(p: &Product) -> Self {
    Self {
      codigo_produto: p.code.clone(),
      descricao:      p.description.clone(),
      ean:            p.ean.clone(),
      ncm:            p.ncm.clone(),
      cest:           p.cest.clone(),
      cfop:           p.cfop.clone(),
      unidade:        p.unit.clone(),
      categoria:      p.category.clone(),
      subcategoria:   p.subcategory.clone(),
    }
  }
}

impl From<RawProduct> for Product {
  fn from(r: RawProduct) -> Self {
    Self {
      code:        r.codigo_produto,
      description: r.descricao,
      ean:         r.ean,
      ncm:         r.ncm,
      cest:        r.cest,
      cfop:        r.cfop,
      unit:        r.unidade,
      category:    r.categoria,
      subcategory: r.subcategoria,
    }
  }
}

#[derive(Debug, Clone)]
pub struct RawService {
  pub codigo_servico:              String,
  pub descricao:                   String,
  pub cnae:                        Option<String>,
  pub codigo_tributacao_nacional:  Option<String>,
  pub codigo_tributacao_municipal: Option<String>,
  pub nbs:                         Option<String>,
}

impl RawService {
  /// Expects the aliases of [`SERVICE_COLUMNS`].
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      codigo_servico:              row.get("codigo_servico")?,
      descricao:                   row.get("servico_descricao")?,
      cnae:                        row.get("cnae")?,
      codigo_tributacao_nacional:  row.get("codigo_tributacao_nacional")?,
      codigo_tributacao_municipal: row.get("codigo_tributacao_municipal")?,
      nbs:                         row.get("nbs")?,
    })
  }
}

impl From<&Service> for RawService {
  fn from(s: &Service) -> Self {
    Self {
      codigo_servico:              s.code.clone(),
      descricao:                   s.description.clone(),
      cnae:                        s.cnae.clone(),
      codigo_tributacao_nacional:  s.national_code.clone(),
      codigo_tributacao_municipal: s.municipal_code.clone(),
      nbs:                         s.nbs.clone(),
    }
  }
}

impl From<RawService> for Service {
  fn from(r: RawService) -> Self {
    Self {
      code:           r.codigo_servico,
      description:    r.descricao,
      cnae:           r.cnae,
      national_code:  r.codigo_tributacao_nacional,
      municipal_code: r.codigo_tributacao_municipal,
      nbs:            r.nbs,
    }
  }
}

// ─── Tax block ───────────────────────────────────────────────────────────────

/// One tax block. Columns are `cst_{tax}`, `base_{tax}`, `aliquota_{tax}`,
/// `valor_{tax}`.
#[derive(Debug, Clone, Default)]
pub struct RawTax {
  pub cst:      Option<String>,
  pub base:     i64,
  pub aliquota: i64,
  pub valor:    i64,
}

impl RawTax {
  pub fn encode(tax: &str, block: &TaxBlock) -> Result<Self> {
    Ok(Self {
      cst:      block.cst.clone(),
      base:     encode_money(&format!("base_{tax}"), block.base)?,
      aliquota: encode_decimal(&format!("aliquota_{tax}"), block.rate, RATE_SCALE)?,
      valor:    encode_money(&format!("valor_{tax}"), block.value)?,
    })
  }

  pub fn from_row(row: &Row<'_>, tax: &str) -> rusqlite::Result<Self> {
    Ok(Self {
      cst:      row.get(format!("cst_{tax}").as_str())?,
      base:     row.get(format!("base_{tax}").as_str())?,
      aliquota: row.get(format!("aliquota_{tax}").as_str())?,
      valor:    row.get(format!("valor_{tax}").as_str())?,
    })
  }

  pub fn into_block(self) -> TaxBlock {
    TaxBlock {
      cst:   self.cst,
      base:  decode_money(self.base),
      rate:  decode_decimal(self.aliquota, RATE_SCALE),
      value: decode_money(self.valor),
    }
  }
}

// ─── NF-e item ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RawItem {
  pub numero_item:    i64,
  pub product:        RawProduct,
  pub cfop:           Option<String>,
  pub unidade:        Option<String>,
  pub quantidade:     i64,
  pub valor_unitario: i64,
  pub valor_bruto:    i64,
  pub valor_desconto: i64,
  pub valor_frete:    i64,
  pub icms:           RawTax,
  pub icms_st:        RawTax,
  pub ipi:            RawTax,
  pub pis:            RawTax,
  pub cofins:         RawTax,
}

impl RawItem {
  pub fn encode(item: &NewLineItem) -> Result<Self> {
    Ok(Self {
      numero_item:    i64::from(item.item_number),
      product:        RawProduct::from(&item.product),
      cfop:           item.cfop.clone(),
      unidade:        item.unit.clone(),
      quantidade:     encode_decimal("quantidade", item.quantity, QUANTITY_SCALE)?,
      valor_unitario: encode_decimal("valor_unitario", item.unit_price, UNIT_PRICE_SCALE)?,
      valor_bruto:    encode_money("valor_bruto", item.gross_value)?,
      valor_desconto: encode_money("valor_desconto", item.discount)?,
      valor_frete:    encode_money("valor_frete", item.freight)?,
      icms:           RawTax::encode("icms", &item.icms)?,
      icms_st:        RawTax::encode("icms_st", &item.icms_st)?,
      ipi:            RawTax::encode("ipi", &item.ipi)?,
      pis:            RawTax::encode("pis", &item.pis)?,
      cofins:         RawTax::encode("cofins", &item.cofins)?,
    })
  }

  /// Expects item columns plus [`PRODUCT_COLUMNS`].
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      numero_item:    row.get("numero_item")?,
      product:        RawProduct::from_row(row)?,
      cfop:           row.get("cfop")?,
      unidade:        row.get("unidade")?,
      quantidade:     row.get("quantidade")?,
      valor_unitario: row.get("valor_unitario")?,
      valor_bruto:    row.get("valor_bruto")?,
      valor_desconto: row.get("valor_desconto")?,
      valor_frete:    row.get("valor_frete")?,
      icms:           RawTax::from_row(row, "icms")?,
      icms_st:        RawTax::from_row(row, "icms_st")?,
      ipi:            RawTax::from_row(row, "ipi")?,
      pis:            RawTax::from_row(row, "pis")?,
      cofins:         RawTax::from_row(row, "cofins")?,
    })
  }

  pub fn into_item(self) -> Result<NewLineItem> {
    Ok(NewLineItem {
      item_number: decode_u32("numero_item", self.numero_item)?,
      product:     self.product.into(),
      cfop:        self.cfop,
      unit:        self.unidade,
      quantity:    decode_decimal(self.quantidade, QUANTITY_SCALE),
      unit_price:  decode_decimal(self.valor_unitario, UNIT_PRICE_SCALE),
      gross_value: decode_money(self.valor_bruto),
      discount:    decode_money(self.valor_desconto),
      freight:     decode_money(self.valor_frete),
      icms:        self.icms.into_block(),
      icms_st:     self.icms_st.into_block(),
      ipi:         self.ipi.into_block(),
      pis:         self.pis.into_block(),
      cofins:      self.cofins.into_block(),
    })
  }
}

/// A `fact_itens_nfe` row joined with its product.
#[derive(Debug, Clone)]
pub struct RawStoredItem {
  pub item_id:    i64,
  pub chave_nfe:  String,
  pub item:       RawItem,
  pub created_at: String,
  pub updated_at: String,
}

impl RawStoredItem {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      item_id:    row.get("item_id")?,
      chave_nfe:  row.get("chave_nfe")?,
      item:       RawItem::from_row(row)?,
      created_at: row.get("created_at")?,
      updated_at: row.get("updated_at")?,
    })
  }

  pub fn into_line_item(self) -> Result<LineItem> {
    Ok(LineItem {
      item_id:    self.item_id,
      key:        NfeKey::parse(&self.chave_nfe)?,
      item:       self.item.into_item()?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

// ─── NFS-e service line ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RawServiceLine {
  pub numero_linha:  i64,
  pub service:       RawService,
  pub discriminacao: Option<String>,
  pub quantidade:    i64,
  pub valor_servico: i64,
  pub issqn:         RawTax,
  pub issqn_retido:  bool,
}

impl RawServiceLine {
  pub fn encode(line: &NewServiceLine) -> Result<Self> {
    Ok(Self {
      numero_linha:  i64::from(line.line_number),
      service:       RawService::from(&line.service),
      discriminacao: line.description.clone(),
      quantidade:    encode_decimal("quantidade", line.quantity, QUANTITY_SCALE)?,
      valor_servico: encode_money("valor_servico", line.amount)?,
      issqn:         RawTax::encode("issqn", &line.issqn)?,
      issqn_retido:  line.issqn_withheld,
    })
  }

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      numero_linha:  row.get("numero_linha")?,
      service:       RawService::from_row(row)?,
      discriminacao: row.get("discriminacao")?,
      quantidade:    row.get("quantidade")?,
      valor_servico: row.get("valor_servico")?,
      issqn:         RawTax::from_row(row, "issqn")?,
      issqn_retido:  row.get("issqn_retido")?,
    })
  }

  pub fn into_line(self) -> Result<NewServiceLine> {
    Ok(NewServiceLine {
      line_number:    decode_u32("numero_linha", self.numero_linha)?,
      service:        self.service.into(),
      description:    self.discriminacao,
      quantity:       decode_decimal(self.quantidade, QUANTITY_SCALE),
      amount:         decode_money(self.valor_servico),
      issqn:          self.issqn.into_block(),
      issqn_withheld: self.issqn_retido,
    })
  }
}

#[derive(Debug, Clone)]
pub struct RawStoredServiceLine {
  pub servico_item_id: i64,
  pub id_nfse:         String,
  pub line:            RawServiceLine,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawStoredServiceLine {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      servico_item_id: row.get("servico_item_id")?,
      id_nfse:         row.get("id_nfse")?,
      line:            RawServiceLine::from_row(row)?,
      created_at:      row.get("created_at")?,
      updated_at:      row.get("updated_at")?,
    })
  }

  pub fn into_service_line(self) -> Result<ServiceLine> {
    Ok(ServiceLine {
      line_id:    self.servico_item_id,
      id:         NfseId::parse(&self.id_nfse)?,
      line:       self.line.into_line()?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

// ─── NF-e header ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct RawNfeTotals {
  pub valor_produtos:            i64,
  pub valor_servicos:            i64,
  pub valor_frete:               i64,
  pub valor_seguro:              i64,
  pub valor_desconto:            i64,
  pub valor_outros:              i64,
  pub base_calculo_icms:         i64,
  pub valor_icms:                i64,
  pub base_calculo_icms_st:      i64,
  pub valor_icms_st:             i64,
  pub valor_ipi:                 i64,
  pub valor_pis:                 i64,
  pub valor_cofins:              i64,
  pub valor_aproximado_tributos: i64,
  pub valor_total_nf:            i64,
}

impl RawNfeTotals {
  pub fn encode(t: &NfeTotals) -> Result<Self> {
    Ok(Self {
      valor_produtos:            encode_money("valor_produtos", t.products)?,
      valor_servicos:            encode_money("valor_servicos", t.services)?,
      valor_frete:               encode_money("valor_frete", t.freight)?,
      valor_seguro:              encode_money("valor_seguro", t.insurance)?,
      valor_desconto:            encode_money("valor_desconto", t.discount)?,
      valor_outros:              encode_money("valor_outros", t.other)?,
      base_calculo_icms:         encode_money("base_calculo_icms", t.icms_base)?,
      valor_icms:                encode_money("valor_icms", t.icms)?,
      base_calculo_icms_st:      encode_money("base_calculo_icms_st", t.icms_st_base)?,
      valor_icms_st:             encode_money("valor_icms_st", t.icms_st)?,
      valor_ipi:                 encode_money("valor_ipi", t.ipi)?,
      valor_pis:                 encode_money("valor_pis", t.pis)?,
      valor_cofins:              encode_money("valor_cofins", t.cofins)?,
      valor_aproximado_tributos: encode_money("valor_aproximado_tributos", t.approximate_taxes)?,
      valor_total_nf:            encode_money("valor_total_nf", t.total)?,
    })
  }

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      valor_produtos:            row.get("valor_produtos")?,
      valor_servicos:            row.get("valor_servicos")?,
      valor_frete:               row.get("valor_frete")?,
      valor_seguro:              row.get("valor_seguro")?,
      valor_desconto:            row.get("valor_desconto")?,
      valor_outros:              row.get("valor_outros")?,
      base_calculo_icms:         row.get("base_calculo_icms")?,
      valor_icms:                row.get("valor_icms")?,
      base_calculo_icms_st:      row.get("base_calculo_icms_st")?,
      valor_icms_st:             row.get("valor_icms_st")?,
      valor_ipi:                 row.get("valor_ipi")?,
      valor_pis:                 row.get("valor_pis")?,
      valor_cofins:              row.get("valor_cofins")?,
      valor_aproximado_tributos: row.get("valor_aproximado_tributos")?,
      valor_total_nf:            row.get("valor_total_nf")?,
    })
  }

  pub fn into_totals(self) -> NfeTotals {
    NfeTotals {
      products:          decode_money(self.valor_produtos),
      services:          decode_money(self.valor_servicos),
      freight:           decode_money(self.valor_frete),
      insurance:         decode_money(self.valor_seguro),
      discount:          decode_money(self.valor_desconto),
      other:             decode_money(self.valor_outros),
      icms_base:         decode_money(self.base_calculo_icms),
      icms:              decode_money(self.valor_icms),
      icms_st_base:      decode_money(self.base_calculo_icms_st),
      icms_st:           decode_money(self.valor_icms_st),
      ipi:               decode_money(self.valor_ipi),
      pis:               decode_money(self.valor_pis),
      cofins:            decode_money(self.valor_cofins),
      approximate_taxes: decode_money(self.valor_aproximado_tributos),
      total:             decode_money(self.valor_total_nf),
    }
  }
}

#[derive(Debug, Clone)]
pub struct RawNfeHeader {
  pub chave_nfe:          String,
  pub numero:             String,
  pub serie:              String,
  pub modelo:             String,
  pub natureza_operacao:  Option<String>,
  pub tipo_operacao:      Option<String>,
  pub data_emissao:       String,
  pub data_saida_entrada: Option<String>,
  pub protocolo:          Option<String>,
  pub emitente_id:        String,
  pub destinatario_id:    Option<i64>,
  pub totals:             RawNfeTotals,
  pub created_at:         String,
  pub updated_at:         String,
}

impl RawNfeHeader {
  /// `destinatario_id` is filled in once the recipient row exists.
  pub fn encode(doc: &NewNfeDocument, now: DateTime<Utc>) -> Result<Self> {
    Ok(Self {
      chave_nfe:          doc.key.to_string(),
      numero:             doc.number.clone(),
      serie:              doc.series.clone(),
      modelo:             doc.model.clone(),
      natureza_operacao:  doc.operation_nature.clone(),
      tipo_operacao:      doc.operation_type.map(|t| t.as_str().to_owned()),
      data_emissao:       encode_local_dt(&doc.issued_at),
      data_saida_entrada: doc.exit_entry_at.as_ref().map(encode_local_dt),
      protocolo:          doc.protocol.clone(),
      emitente_id:        doc.emitter.tax_id.digits().to_owned(),
      destinatario_id:    None,
      totals:             RawNfeTotals::encode(&doc.totals)?,
      created_at:         encode_dt(now),
      updated_at:         encode_dt(now),
    })
  }

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      chave_nfe:          row.get("chave_nfe")?,
      numero:             row.get("numero")?,
      serie:              row.get("serie")?,
      modelo:             row.get("modelo")?,
      natureza_operacao:  row.get("natureza_operacao")?,
      tipo_operacao:      row.get("tipo_operacao")?,
      data_emissao:       row.get("data_emissao")?,
      data_saida_entrada: row.get("data_saida_entrada")?,
      protocolo:          row.get("protocolo")?,
      emitente_id:        row.get("emitente_id")?,
      destinatario_id:    row.get("destinatario_id")?,
      totals:             RawNfeTotals::from_row(row)?,
      created_at:         row.get("created_at")?,
      updated_at:         row.get("updated_at")?,
    })
  }

  pub fn into_header(self) -> Result<NfeHeader> {
    Ok(NfeHeader {
      key:              NfeKey::parse(&self.chave_nfe)?,
      number:           self.numero,
      series:           self.serie,
      model:            self.modelo,
      operation_nature: self.natureza_operacao,
      operation_type:   self
        .tipo_operacao
        .as_deref()
        .map(OperationType::parse)
        .transpose()?,
      issued_at:        decode_local_dt(&self.data_emissao)?,
      exit_entry_at:    self
        .data_saida_entrada
        .as_deref()
        .map(decode_local_dt)
        .transpose()?,
      protocol:         self.protocolo,
      emitter_id:       self.emitente_id,
      recipient_id:     self.destinatario_id,
      totals:           self.totals.into_totals(),
      created_at:       decode_dt(&self.created_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

/// Everything written for one NF-e.
pub struct RawNewNfe {
  pub header:    RawNfeHeader,
  pub emitter:   RawEmitter,
  pub recipient: Option<RawRecipient>,
  pub items:     Vec<RawItem>,
}

impl RawNewNfe {
  pub fn encode(doc: &NewNfeDocument, now: DateTime<Utc>) -> Result<Self> {
    Ok(Self {
      header:    RawNfeHeader::encode(doc, now)?,
      emitter:   RawEmitter::encode(&doc.emitter)?,
      recipient: doc.recipient.as_ref().map(RawRecipient::encode).transpose()?,
      items:     doc.items.iter().map(RawItem::encode).collect::<Result<_>>()?,
    })
  }
}

/// Everything read back for one NF-e.
pub struct RawNfeDocument {
  pub header:    RawNfeHeader,
  pub emitter:   RawEmitter,
  pub recipient: Option<(i64, RawRecipient)>,
  pub items:     Vec<RawStoredItem>,
  pub events:    Vec<RawEvent>,
}

impl RawNfeDocument {
  pub fn into_document(self) -> Result<NfeDocument> {
    Ok(NfeDocument {
      header:    self.header.into_header()?,
      emitter:   self.emitter.into_emitter()?,
      recipient: self
        .recipient
        .map(|(id, r)| r.into_recipient(id))
        .transpose()?,
      items:     self
        .items
        .into_iter()
        .map(RawStoredItem::into_line_item)
        .collect::<Result<_>>()?,
      events:    self
        .events
        .into_iter()
        .map(RawEvent::into_event)
        .collect::<Result<_>>()?,
    })
  }
}

// ─── NFS-e header ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct RawNfseTotals {
  pub valor_total_servicos:          i64,
  pub valor_deducoes:                i64,
  pub valor_desconto_incondicionado: i64,
  pub base_calculo_issqn:            i64,
  pub aliquota_issqn:                i64,
  pub valor_issqn:                   i64,
  pub issqn_retido:                  bool,
  pub valor_total_retencoes:         i64,
  pub valor_liquido:                 i64,
}

impl RawNfseTotals {
  pub fn encode(t: &NfseTotals) -> Result<Self> {
    Ok(Self {
      valor_total_servicos:          encode_money("valor_total_servicos", t.services)?,
      valor_deducoes:                encode_money("valor_deducoes", t.deductions)?,
      valor_desconto_incondicionado: encode_money(
        "valor_desconto_incondicionado",
        t.unconditional_discount,
      )?,
      base_calculo_issqn:            encode_money("base_calculo_issqn", t.issqn_base)?,
      aliquota_issqn:                encode_decimal("aliquota_issqn", t.issqn_rate, RATE_SCALE)?,
      valor_issqn:                   encode_money("valor_issqn", t.issqn)?,
      issqn_retido:                  t.issqn_withheld,
      valor_total_retencoes:         encode_money("valor_total_retencoes", t.total_withholdings)?,
      valor_liquido:                 encode_money("valor_liquido", t.net)?,
    })
  }

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      valor_total_servicos:          row.get("valor_total_servicos")?,
      valor_deducoes:                row.get("valor_deducoes")?,
      valor_desconto_incondicionado: row.get("valor_desconto_incondicionado")?,
      base_calculo_issqn:            row.get("base_calculo_issqn")?,
      aliquota_issqn:                row.get("aliquota_issqn")?,
      valor_issqn:                   row.get("valor_issqn")?,
      issqn_retido:                  row.get("issqn_retido")?,
      valor_total_retencoes:         row.get("valor_total_retencoes")?,
      valor_liquido:                 row.get("valor_liquido")?,
    })
  }

  pub fn into_totals(self) -> NfseTotals {
    NfseTotals {
      services:               decode_money(self.valor_total_servicos),
      deductions:             decode_money(self.valor_deducoes),
      unconditional_discount: decode_money(self.valor_desconto_incondicionado),
      issqn_base:             decode_money(self.base_calculo_issqn),
      issqn_rate:             decode_decimal(self.aliquota_issqn, RATE_SCALE),
      issqn:                  decode_money(self.valor_issqn),
      issqn_withheld:         self.issqn_retido,
      total_withholdings:     decode_money(self.valor_total_retencoes),
      net:                    decode_money(self.valor_liquido),
    }
  }
}

#[derive(Debug, Clone)]
pub struct RawNfseHeader {
  pub id_nfse:                     String,
  pub numero:                      String,
  pub serie_dps:                   Option<String>,
  pub numero_dps:                  Option<String>,
  pub data_emissao:                String,
  pub data_competencia:            Option<String>,
  pub codigo_municipio_emissao:    Option<String>,
  pub codigo_municipio_incidencia: Option<String>,
  pub situacao:                    Option<String>,
  pub emitente_id:                 String,
  pub destinatario_id:             Option<i64>,
  pub totals:                      RawNfseTotals,
  pub created_at:                  String,
  pub updated_at:                  String,
}

impl RawNfseHeader {
  pub fn encode(doc: &NewNfseDocument, now: DateTime<Utc>) -> Result<Self> {
    Ok(Self {
      id_nfse:                     doc.id.to_string(),
      numero:                      doc.number.clone(),
      serie_dps:                   doc.dps_series.clone(),
      numero_dps:                  doc.dps_number.clone(),
      data_emissao:                encode_local_dt(&doc.issued_at),
      data_competencia:            doc.competence_date.map(encode_date),
      codigo_municipio_emissao:    doc.emission_municipality.clone(),
      codigo_municipio_incidencia: doc.incidence_municipality.clone(),
      situacao:                    doc.status_code.clone(),
      emitente_id:                 doc.emitter.tax_id.digits().to_owned(),
      destinatario_id:             None,
      totals:                      RawNfseTotals::encode(&doc.totals)?,
      created_at:                  encode_dt(now),
      updated_at:                  encode_dt(now),
    })
  }

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id_nfse:                     row.get("id_nfse")?,
      numero:                      row.get("numero")?,
      serie_dps:                   row.get("serie_dps")?,
      numero_dps:                  row.get("numero_dps")?,
      data_emissao:                row.get("data_emissao")?,
      data_competencia:            row.get("data_competencia")?,
      codigo_municipio_emissao:    row.get("codigo_municipio_emissao")?,
      codigo_municipio_incidencia: row.get("codigo_municipio_incidencia")?,
      situacao:                    row.get("situacao")?,
      emitente_id:                 row.get("emitente_id")?,
      destinatario_id:             row.get("destinatario_id")?,
      totals:                      RawNfseTotals::from_row(row)?,
      created_at:                  row.get("created_at")?,
      updated_at:                  row.get("updated_at")?,
    })
  }

  pub fn into_header(self) -> Result<NfseHeader> {
    Ok(NfseHeader {
      id:                     NfseId::parse(&self.id_nfse)?,
      number:                 self.numero,
      dps_series:             self.serie_dps,
      dps_number:             self.numero_dps,
      issued_at:              decode_local_dt(&self.data_emissao)?,
      competence_date:        self.data_competencia.as_deref().map(decode_date).transpose()?,
      emission_municipality:  self.codigo_municipio_emissao,
      incidence_municipality: self.codigo_municipio_incidencia,
      status_code:            self.situacao,
      emitter_id:             self.emitente_id,
      recipient_id:           self.destinatario_id,
      totals:                 self.totals.into_totals(),
      created_at:             decode_dt(&self.created_at)?,
      updated_at:             decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawNewNfse {
  pub header:    RawNfseHeader,
  pub emitter:   RawEmitter,
  pub recipient: Option<RawRecipient>,
  pub services:  Vec<RawServiceLine>,
}

impl RawNewNfse {
  pub fn encode(doc: &NewNfseDocument, now: DateTime<Utc>) -> Result<Self> {
    Ok(Self {
      header:    RawNfseHeader::encode(doc, now)?,
      emitter:   RawEmitter::encode(&doc.emitter)?,
      recipient: doc.recipient.as_ref().map(RawRecipient::encode).transpose()?,
      services:  doc
        .services
        .iter()
        .map(RawServiceLine::encode)
        .collect::<Result<_>>()?,
    })
  }
}

pub struct RawNfseDocument {
  pub header:    RawNfseHeader,
  pub emitter:   RawEmitter,
  pub recipient: Option<(i64, RawRecipient)>,
  pub services:  Vec<RawStoredServiceLine>,
}

impl RawNfseDocument {
  pub fn into_document(self) -> Result<NfseDocument> {
    Ok(NfseDocument {
      header:    self.header.into_header()?,
      emitter:   self.emitter.into_emitter()?,
      recipient: self
        .recipient
        .map(|(id, r)| r.into_recipient(id))
        .transpose()?,
      services:  self
        .services
        .into_iter()
        .map(RawStoredServiceLine::into_service_line)
        .collect::<Result<_>>()?,
    })
  }
}

// ─── Event ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RawEvent {
  /// Zero until the row is inserted.
  pub evento_id:     i64,
  pub chave_nfe:     String,
  pub tipo_evento:   String,
  pub sequencia:     i64,
  pub data_evento:   String,
  pub descricao:     Option<String>,
  pub justificativa: Option<String>,
  pub protocolo:     Option<String>,
  pub recorded_at:   String,
}

impl RawEvent {
  pub fn encode(e: &NewDocumentEvent, now: DateTime<Utc>) -> Self {
    Self {
      evento_id:     0,
      chave_nfe:     e.key.to_string(),
      tipo_evento:   e.event_type.code().to_owned(),
      sequencia:     i64::from(e.sequence),
      data_evento:   encode_local_dt(&e.occurred_at),
      descricao:     e.description.clone(),
      justificativa: e.justification.clone(),
      protocolo:     e.protocol.clone(),
      recorded_at:   encode_dt(now),
    }
  }

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      evento_id:     row.get("evento_id")?,
      chave_nfe:     row.get("chave_nfe")?,
      tipo_evento:   row.get("tipo_evento")?,
      sequencia:     row.get("sequencia")?,
      data_evento:   row.get("data_evento")?,
      descricao:     row.get("descricao")?,
      justificativa: row.get("justificativa")?,
      protocolo:     row.get("protocolo")?,
      recorded_at:   row.get("recorded_at")?,
    })
  }

  pub fn into_event(self) -> Result<DocumentEvent> {
    Ok(DocumentEvent {
      event_id:    self.evento_id,
      event:       NewDocumentEvent {
        key:           NfeKey::parse(&self.chave_nfe)?,
        event_type:    EventType::from_code(&self.tipo_evento),
        sequence:      decode_u32("sequencia", self.sequencia)?,
        occurred_at:   decode_local_dt(&self.data_evento)?,
        description:   self.descricao,
        justification: self.justificativa,
        protocol:      self.protocolo,
      },
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

// ─── Job ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RawJob {
  pub job_id:       String,
  pub file_name:    String,
  pub digest:       String,
  pub status:       String,
  pub failed_stage: Option<String>,
  pub error:        Option<String>,
  pub payload_kind: Option<String>,
  pub document_id:  Option<String>,
  pub duplicate_of: Option<String>,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawJob {
  pub const COLUMNS: &'static str = "job_id, file_name, digest, status, failed_stage, error, \
    payload_kind, document_id, duplicate_of, created_at, updated_at";

  pub fn encode(job: &IngestJob) -> Self {
    Self {
      job_id:       encode_uuid(job.job_id),
      file_name:    job.file_name.clone(),
      digest:       job.digest.clone(),
      status:       job.status.as_str().to_owned(),
      failed_stage: job.failed_stage.map(|s| s.as_str().to_owned()),
      error:        job.error.clone(),
      payload_kind: job.payload_kind.map(|k| k.as_str().to_owned()),
      document_id:  job.document_id.clone(),
      duplicate_of: job.duplicate_of.map(encode_uuid),
      created_at:   encode_dt(job.created_at),
      updated_at:   encode_dt(job.updated_at),
    }
  }

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      job_id:       row.get("job_id")?,
      file_name:    row.get("file_name")?,
      digest:       row.get("digest")?,
      status:       row.get("status")?,
      failed_stage: row.get("failed_stage")?,
      error:        row.get("error")?,
      payload_kind: row.get("payload_kind")?,
      document_id:  row.get("document_id")?,
      duplicate_of: row.get("duplicate_of")?,
      created_at:   row.get("created_at")?,
      updated_at:   row.get("updated_at")?,
    })
  }

  pub fn into_job(self) -> Result<IngestJob> {
    Ok(IngestJob {
      job_id:       decode_uuid(&self.job_id)?,
      file_name:    self.file_name,
      digest:       self.digest,
      status:       JobStatus::parse(&self.status)?,
      failed_stage: self.failed_stage.as_deref().map(Stage::parse).transpose()?,
      error:        self.error,
      payload_kind: self
        .payload_kind
        .as_deref()
        .map(PayloadKind::parse)
        .transpose()?,
      document_id:  self.document_id,
      duplicate_of: self.duplicate_of.as_deref().map(decode_uuid).transpose()?,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

// ─── View rows ───────────────────────────────────────────────────────────────

/// A `vw_documentos_unificados` row.
pub struct RawUnified {
  pub tipo_documento: String,
  pub documento_id:   String,
  pub numero:         String,
  pub emitente_id:    String,
  pub razao_social:   String,
  pub data_emissao:   String,
  pub periodo:        String,
  pub valor_total:    i64,
  pub valor_impostos: i64,
  pub cancelado:      bool,
}

impl RawUnified {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      tipo_documento: row.get("tipo_documento")?,
      documento_id:   row.get("documento_id")?,
      numero:         row.get("numero")?,
      emitente_id:    row.get("emitente_id")?,
      razao_social:   row.get("razao_social")?,
      data_emissao:   row.get("data_emissao")?,
      periodo:        row.get("periodo")?,
      valor_total:    row.get("valor_total")?,
      valor_impostos: row.get("valor_impostos")?,
      cancelado:      row.get("cancelado")?,
    })
  }

  pub fn into_unified(self) -> Result<UnifiedDocument> {
    Ok(UnifiedDocument {
      kind:        DocumentKind::parse(&self.tipo_documento)?,
      document_id: self.documento_id,
      number:      self.numero,
      emitter_id:  self.emitente_id,
      legal_name:  self.razao_social,
      issued_at:   decode_local_dt(&self.data_emissao)?,
      period:      Period::parse(&self.periodo)?,
      total:       decode_money(self.valor_total),
      taxes:       decode_money(self.valor_impostos),
      cancelled:   self.cancelado,
    })
  }
}

/// A `vw_resumo_fornecedores` row.
pub struct RawSupplierSummary {
  pub emitente_id:      String,
  pub razao_social:     String,
  pub nome_fantasia:    Option<String>,
  pub uf:               Option<String>,
  pub qtd_nfe:          i64,
  pub qtd_nfse:         i64,
  pub primeira_emissao: Option<String>,
  pub ultima_emissao:   Option<String>,
  pub valor_total:      i64,
  pub valor_impostos:   i64,
}

impl RawSupplierSummary {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      emitente_id:      row.get("emitente_id")?,
      razao_social:     row.get("razao_social")?,
      nome_fantasia:    row.get("nome_fantasia")?,
      uf:               row.get("uf")?,
      qtd_nfe:          row.get("qtd_nfe")?,
      qtd_nfse:         row.get("qtd_nfse")?,
      primeira_emissao: row.get("primeira_emissao")?,
      ultima_emissao:   row.get("ultima_emissao")?,
      valor_total:      row.get("valor_total")?,
      valor_impostos:   row.get("valor_impostos")?,
    })
  }

  pub fn into_summary(self) -> Result<SupplierSummary> {
    Ok(SupplierSummary {
      emitter_id:      self.emitente_id,
      legal_name:      self.razao_social,
      trade_name:      self.nome_fantasia,
      uf:              self.uf,
      nfe_count:       decode_count("qtd_nfe", self.qtd_nfe)?,
      nfse_count:      decode_count("qtd_nfse", self.qtd_nfse)?,
      first_issued_at: self.primeira_emissao.as_deref().map(decode_local_dt).transpose()?,
      last_issued_at:  self.ultima_emissao.as_deref().map(decode_local_dt).transpose()?,
      total_value:     decode_money(self.valor_total),
      total_taxes:     decode_money(self.valor_impostos),
    })
  }
}

/// A `vw_produtos_mais_comprados` row.
pub struct RawProductRanking {
  pub codigo_produto:   String,
  pub descricao:        String,
  pub ncm:              Option<String>,
  pub categoria:        Option<String>,
  pub quantidade_total: i64,
  pub valor_total:      i64,
  pub qtd_documentos:   i64,
  pub qtd_itens:        i64,
}

impl RawProductRanking {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      codigo_produto:   row.get("codigo_produto")?,
      descricao:        row.get("descricao")?,
      ncm:              row.get("ncm")?,
      categoria:        row.get("categoria")?,
      quantidade_total: row.get("quantidade_total")?,
      valor_total:      row.get("valor_total")?,
      qtd_documentos:   row.get("qtd_documentos")?,
      qtd_itens:        row.get("qtd_itens")?,
    })
  }

  pub fn into_ranking(self) -> Result<ProductRanking> {
    Ok(ProductRanking {
      code:           self.codigo_produto,
      description:    self.descricao,
      ncm:            self.ncm,
      category:       self.categoria,
      total_quantity: decode_decimal(self.quantidade_total, QUANTITY_SCALE),
      total_value:    decode_money(self.valor_total),
      document_count: decode_count("qtd_documentos", self.qtd_documentos)?,
      item_count:     decode_count("qtd_itens", self.qtd_itens)?,
    })
  }
}

/// A `vw_analise_impostos_periodo` row.
pub struct RawTaxPeriod {
  pub periodo:     String,
  pub qtd_nfe:     i64,
  pub total_nfe:   i64,
  pub icms:        i64,
  pub icms_st:     i64,
  pub ipi:         i64,
  pub pis:         i64,
  pub cofins:      i64,
  pub qtd_nfse:    i64,
  pub total_nfse:  i64,
  pub issqn:       i64,
  pub total_geral: i64,
}

impl RawTaxPeriod {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      periodo:     row.get("periodo")?,
      qtd_nfe:     row.get("qtd_nfe")?,
      total_nfe:   row.get("total_nfe")?,
      icms:        row.get("icms")?,
      icms_st:     row.get("icms_st")?,
      ipi:         row.get("ipi")?,
      pis:         row.get("pis")?,
      cofins:      row.get("cofins")?,
      qtd_nfse:    row.get("qtd_nfse")?,
      total_nfse:  row.get("total_nfse")?,
      issqn:       row.get("issqn")?,
      total_geral: row.get("total_geral")?,
    })
  }

  pub fn into_summary(self) -> Result<TaxPeriodSummary> {
    Ok(TaxPeriodSummary {
      period:      Period::parse(&self.periodo)?,
      nfe_count:   decode_count("qtd_nfe", self.qtd_nfe)?,
      nfe_total:   decode_money(self.total_nfe),
      icms:        decode_money(self.icms),
      icms_st:     decode_money(self.icms_st),
      ipi:         decode_money(self.ipi),
      pis:         decode_money(self.pis),
      cofins:      decode_money(self.cofins),
      nfse_count:  decode_count("qtd_nfse", self.qtd_nfse)?,
      nfse_total:  decode_money(self.total_nfse),
      issqn:       decode_money(self.issqn),
      grand_total: decode_money(self.total_geral),
    })
  }
}
