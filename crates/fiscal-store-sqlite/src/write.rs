//! Transactional writes.
//!
//! Every public function opens one `IMMEDIATE` transaction, so the write
//! lock is taken before the existence checks run and no other writer can
//! slip in between a check and the insert it guards. Any error drops the
//! transaction, which rolls it back.

use std::collections::HashSet;

use rusqlite::{Connection, ToSql, Transaction, TransactionBehavior, named_params, params};

use crate::{
  Error, Result, read,
  rows::{
    RawEmitter, RawEvent, RawItem, RawJob, RawNewNfe, RawNewNfse, RawNfeDocument,
    RawNfeHeader, RawNfseDocument, RawNfseHeader, RawProduct, RawRecipient,
    RawService, RawServiceLine, RawStoredItem,
  },
};

fn bind<'a>(name: &'a str, value: &'a dyn ToSql) -> (&'a str, &'a dyn ToSql) { (name, value) }

fn immediate(conn: &mut Connection) -> Result<Transaction<'_>> {
  Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

// ─── Dimensions ──────────────────────────────────────────────────────────────

/// Insert or merge an emitter. Incoming non-null fields win; null fields
/// keep what is stored.
fn upsert_emitter(tx: &Transaction<'_>, e: &RawEmitter, now: &str) -> Result<()> {
  tx.execute(
    "INSERT INTO dim_emitente (
       emitente_id, cnpj, cpf, razao_social, nome_fantasia, inscricao_estadual,
       inscricao_municipal, regime_tributario, email, uf, codigo_municipio,
       endereco, created_at, updated_at
     ) VALUES (
       :emitente_id, :cnpj, :cpf, :razao_social, :nome_fantasia, :inscricao_estadual,
       :inscricao_municipal, :regime_tributario, :email, :uf, :codigo_municipio,
       :endereco, :now, :now
     )
     ON CONFLICT (emitente_id) DO UPDATE SET
       razao_social        = excluded.razao_social,
       nome_fantasia       = COALESCE(excluded.nome_fantasia, dim_emitente.nome_fantasia),
       inscricao_estadual  = COALESCE(excluded.inscricao_estadual, dim_emitente.inscricao_estadual),
       inscricao_municipal = COALESCE(excluded.inscricao_municipal, dim_emitente.inscricao_municipal),
       regime_tributario   = COALESCE(excluded.regime_tributario, dim_emitente.regime_tributario),
       email               = COALESCE(excluded.email, dim_emitente.email),
       uf                  = COALESCE(excluded.uf, dim_emitente.uf),
       codigo_municipio    = COALESCE(excluded.codigo_municipio, dim_emitente.codigo_municipio),
       endereco            = COALESCE(excluded.endereco, dim_emitente.endereco),
       updated_at          = excluded.updated_at",
    named_params! {
      ":emitente_id": e.emitente_id,
      ":cnpj": e.cnpj,
      ":cpf": e.cpf,
      ":razao_social": e.razao_social,
      ":nome_fantasia": e.nome_fantasia,
      ":inscricao_estadual": e.inscricao_estadual,
      ":inscricao_municipal": e.inscricao_municipal,
      ":regime_tributario": e.regime_tributario,
      ":email": e.email,
      ":uf": e.uf,
      ":codigo_municipio": e.codigo_municipio,
      ":endereco": e.endereco,
      ":now": now,
    },
  )?;
  Ok(())
}

fn insert_recipient(tx: &Transaction<'_>, r: &RawRecipient, now: &str) -> Result<i64> {
  tx.execute(
    "INSERT INTO dim_destinatario (
       cnpj, cpf, documento, nome, inscricao_estadual, email, uf,
       codigo_municipio, endereco, created_at
     ) VALUES (
       :cnpj, :cpf, :documento, :nome, :inscricao_estadual, :email, :uf,
       :codigo_municipio, :endereco, :now
     )",
    named_params! {
      ":cnpj": r.cnpj,
      ":cpf": r.cpf,
      ":documento": r.documento,
      ":nome": r.nome,
      ":inscricao_estadual": r.inscricao_estadual,
      ":email": r.email,
      ":uf": r.uf,
      ":codigo_municipio": r.codigo_municipio,
      ":endereco": r.endereco,
      ":now": now,
    },
  )?;
  Ok(tx.last_insert_rowid())
}

/// Drop a recipient row once no header points at it.
fn delete_orphan_recipient(tx: &Transaction<'_>, id: i64) -> Result<()> {
  tx.execute(
    "DELETE FROM dim_destinatario
     WHERE destinatario_id = ?1
       AND NOT EXISTS (SELECT 1 FROM nfe_main  WHERE destinatario_id = ?1)
       AND NOT EXISTS (SELECT 1 FROM nfse_main WHERE destinatario_id = ?1)",
    params![id],
  )?;
  Ok(())
}

/// Insert or merge a product. A stored category survives an incoming row
/// without one, so re-ingestion never undoes classification.
fn upsert_product(tx: &Transaction<'_>, p: &RawProduct, now: &str) -> Result<()> {
  tx.execute(
    "INSERT INTO dim_produtos (
       codigo_produto, descricao, ean, ncm, cest, cfop, unidade,
       categoria, subcategoria, created_at, updated_at
     ) VALUES (
       :codigo_produto, :descricao, :ean, :ncm, :cest, :cfop, :unidade,
       :categoria, :subcategoria, :now, :now
     )
     ON CONFLICT (codigo_produto) DO UPDATE SET
       descricao    = excluded.descricao,
       ean          = COALESCE(excluded.ean, dim_produtos.ean),
       ncm          = COALESCE(excluded.ncm, dim_produtos.ncm),
       cest         = COALESCE(excluded.cest, dim_produtos.cest),
       cfop         = COALESCE(excluded.cfop, dim_produtos.cfop),
       unidade      = COALESCE(excluded.unidade, dim_produtos.unidade),
       categoria    = COALESCE(excluded.categoria, dim_produtos.categoria),
       subcategoria = CASE WHEN excluded.categoria IS NULL
                           THEN dim_produtos.subcategoria
                           ELSE excluded.subcategoria END,
       updated_at   = excluded.updated_at",
    named_params! {
      ":codigo_produto": p.codigo_produto,
      ":descricao": p.descricao,
      ":ean": p.ean,
      ":ncm": p.ncm,
      ":cest": p.cest,
      ":cfop": p.cfop,
      ":unidade": p.unidade,
      ":categoria": p.categoria,
      ":subcategoria": p.subcategoria,
      ":now": now,
    },
  )?;
  Ok(())
}

fn upsert_service(tx: &Transaction<'_>, s: &RawService, now: &str) -> Result<()> {
  tx.execute(
    "INSERT INTO dim_servicos (
       codigo_servico, descricao, cnae, codigo_tributacao_nacional,
       codigo_tributacao_municipal, nbs, created_at, updated_at
     ) VALUES (
       :codigo_servico, :descricao, :cnae, :codigo_tributacao_nacional,
       :codigo_tributacao_municipal, :nbs, :now, :now
     )
     ON CONFLICT (codigo_servico) DO UPDATE SET
       descricao                   = excluded.descricao,
       cnae                        = COALESCE(excluded.cnae, dim_servicos.cnae),
       codigo_tributacao_nacional  = COALESCE(excluded.codigo_tributacao_nacional,
                                              dim_servicos.codigo_tributacao_nacional),
       codigo_tributacao_municipal = COALESCE(excluded.codigo_tributacao_municipal,
                                              dim_servicos.codigo_tributacao_municipal),
       nbs                         = COALESCE(excluded.nbs, dim_servicos.nbs),
       updated_at                  = excluded.updated_at",
    named_params! {
      ":codigo_servico": s.codigo_servico,
      ":descricao": s.descricao,
      ":cnae": s.cnae,
      ":codigo_tributacao_nacional": s.codigo_tributacao_nacional,
      ":codigo_tributacao_municipal": s.codigo_tributacao_municipal,
      ":nbs": s.nbs,
      ":now": now,
    },
  )?;
  Ok(())
}

// ─── Facts ───────────────────────────────────────────────────────────────────

/// Upsert the item's product, then insert the item.
fn insert_item(tx: &Transaction<'_>, key: &str, item: &RawItem, now: &str) -> Result<()> {
  upsert_product(tx, &item.product, now)?;
  tx.execute(
    "INSERT INTO fact_itens_nfe (
       chave_nfe, numero_item, codigo_produto, cfop, unidade, quantidade,
       valor_unitario, valor_bruto, valor_desconto, valor_frete,
       cst_icms, base_icms, aliquota_icms, valor_icms,
       cst_icms_st, base_icms_st, aliquota_icms_st, valor_icms_st,
       cst_ipi, base_ipi, aliquota_ipi, valor_ipi,
       cst_pis, base_pis, aliquota_pis, valor_pis,
       cst_cofins, base_cofins, aliquota_cofins, valor_cofins,
       created_at, updated_at
     ) VALUES (
       :chave_nfe, :numero_item, :codigo_produto, :cfop, :unidade, :quantidade,
       :valor_unitario, :valor_bruto, :valor_desconto, :valor_frete,
       :cst_icms, :base_icms, :aliquota_icms, :valor_icms,
       :cst_icms_st, :base_icms_st, :aliquota_icms_st, :valor_icms_st,
       :cst_ipi, :base_ipi, :aliquota_ipi, :valor_ipi,
       :cst_pis, :base_pis, :aliquota_pis, :valor_pis,
       :cst_cofins, :base_cofins, :aliquota_cofins, :valor_cofins,
       :now, :now
     )",
    named_params! {
      ":chave_nfe": key,
      ":numero_item": item.numero_item,
      ":codigo_produto": item.product.codigo_produto,
      ":cfop": item.cfop,
      ":unidade": item.unidade,
      ":quantidade": item.quantidade,
      ":valor_unitario": item.valor_unitario,
      ":valor_bruto": item.valor_bruto,
      ":valor_desconto": item.valor_desconto,
      ":valor_frete": item.valor_frete,
      ":cst_icms": item.icms.cst,
      ":base_icms": item.icms.base,
      ":aliquota_icms": item.icms.aliquota,
      ":valor_icms": item.icms.valor,
      ":cst_icms_st": item.icms_st.cst,
      ":base_icms_st": item.icms_st.base,
      ":aliquota_icms_st": item.icms_st.aliquota,
      ":valor_icms_st": item.icms_st.valor,
      ":cst_ipi": item.ipi.cst,
      ":base_ipi": item.ipi.base,
      ":aliquota_ipi": item.ipi.aliquota,
      ":valor_ipi": item.ipi.valor,
      ":cst_pis": item.pis.cst,
      ":base_pis": item.pis.base,
      ":aliquota_pis": item.pis.aliquota,
      ":valor_pis": item.pis.valor,
      ":cst_cofins": item.cofins.cst,
      ":base_cofins": item.cofins.base,
      ":aliquota_cofins": item.cofins.aliquota,
      ":valor_cofins": item.cofins.valor,
      ":now": now,
    },
  )?;
  Ok(())
}

fn insert_service_line(
  tx: &Transaction<'_>,
  id: &str,
  line: &RawServiceLine,
  now: &str,
) -> Result<()> {
  upsert_service(tx, &line.service, now)?;
  tx.execute(
    "INSERT INTO fact_servicos_nfse (
       id_nfse, numero_linha, codigo_servico, discriminacao, quantidade,
       valor_servico, cst_issqn, base_issqn, aliquota_issqn, valor_issqn,
       issqn_retido, created_at, updated_at
     ) VALUES (
       :id_nfse, :numero_linha, :codigo_servico, :discriminacao, :quantidade,
       :valor_servico, :cst_issqn, :base_issqn, :aliquota_issqn, :valor_issqn,
       :issqn_retido, :now, :now
     )",
    named_params! {
      ":id_nfse": id,
      ":numero_linha": line.numero_linha,
      ":codigo_servico": line.service.codigo_servico,
      ":discriminacao": line.discriminacao,
      ":quantidade": line.quantidade,
      ":valor_servico": line.valor_servico,
      ":cst_issqn": line.issqn.cst,
      ":base_issqn": line.issqn.base,
      ":aliquota_issqn": line.issqn.aliquota,
      ":valor_issqn": line.issqn.valor,
      ":issqn_retido": line.issqn_retido,
      ":now": now,
    },
  )?;
  Ok(())
}

// ─── NF-e ────────────────────────────────────────────────────────────────────

const NFE_HEADER_VALUES: &str = "
  numero = :numero, serie = :serie, modelo = :modelo,
  natureza_operacao = :natureza_operacao, tipo_operacao = :tipo_operacao,
  data_emissao = :data_emissao, data_saida_entrada = :data_saida_entrada,
  protocolo = :protocolo, emitente_id = :emitente_id,
  destinatario_id = :destinatario_id,
  valor_produtos = :valor_produtos, valor_servicos = :valor_servicos,
  valor_frete = :valor_frete, valor_seguro = :valor_seguro,
  valor_desconto = :valor_desconto, valor_outros = :valor_outros,
  base_calculo_icms = :base_calculo_icms, valor_icms = :valor_icms,
  base_calculo_icms_st = :base_calculo_icms_st, valor_icms_st = :valor_icms_st,
  valor_ipi = :valor_ipi, valor_pis = :valor_pis, valor_cofins = :valor_cofins,
  valor_aproximado_tributos = :valor_aproximado_tributos,
  valor_total_nf = :valor_total_nf,
  updated_at = :updated_at";

/// Writes the header with either `INSERT` or `UPDATE`, sharing one set of
/// bound parameters.
fn write_nfe_header(tx: &Transaction<'_>, h: &RawNfeHeader, update: bool) -> Result<()> {
  let sql = if update {
    format!("UPDATE nfe_main SET {NFE_HEADER_VALUES} WHERE chave_nfe = :chave_nfe")
  } else {
    "INSERT INTO nfe_main (
       chave_nfe, numero, serie, modelo, natureza_operacao, tipo_operacao,
       data_emissao, data_saida_entrada, protocolo, emitente_id, destinatario_id,
       valor_produtos, valor_servicos, valor_frete, valor_seguro, valor_desconto,
       valor_outros, base_calculo_icms, valor_icms, base_calculo_icms_st,
       valor_icms_st, valor_ipi, valor_pis, valor_cofins,
       valor_aproximado_tributos, valor_total_nf, created_at, updated_at
     ) VALUES (
       :chave_nfe, :numero, :serie, :modelo, :natureza_operacao, :tipo_operacao,
       :data_emissao, :data_saida_entrada, :protocolo, :emitente_id, :destinatario_id,
       :valor_produtos, :valor_servicos, :valor_frete, :valor_seguro, :valor_desconto,
       :valor_outros, :base_calculo_icms, :valor_icms, :base_calculo_icms_st,
       :valor_icms_st, :valor_ipi, :valor_pis, :valor_cofins,
       :valor_aproximado_tributos, :valor_total_nf, :created_at, :updated_at
     )"
      .to_owned()
  };
  let t = &h.totals;
  let mut stmt = tx.prepare(&sql)?;
  let mut params = vec![
    bind(":chave_nfe", &h.chave_nfe),
    bind(":numero", &h.numero),
    bind(":serie", &h.serie),
    bind(":modelo", &h.modelo),
    bind(":natureza_operacao", &h.natureza_operacao),
    bind(":tipo_operacao", &h.tipo_operacao),
    bind(":data_emissao", &h.data_emissao),
    bind(":data_saida_entrada", &h.data_saida_entrada),
    bind(":protocolo", &h.protocolo),
    bind(":emitente_id", &h.emitente_id),
    bind(":destinatario_id", &h.destinatario_id),
    bind(":valor_produtos", &t.valor_produtos),
    bind(":valor_servicos", &t.valor_servicos),
    bind(":valor_frete", &t.valor_frete),
    bind(":valor_seguro", &t.valor_seguro),
    bind(":valor_desconto", &t.valor_desconto),
    bind(":valor_outros", &t.valor_outros),
    bind(":base_calculo_icms", &t.base_calculo_icms),
    bind(":valor_icms", &t.valor_icms),
    bind(":base_calculo_icms_st", &t.base_calculo_icms_st),
    bind(":valor_icms_st", &t.valor_icms_st),
    bind(":valor_ipi", &t.valor_ipi),
    bind(":valor_pis", &t.valor_pis),
    bind(":valor_cofins", &t.valor_cofins),
    bind(":valor_aproximado_tributos", &t.valor_aproximado_tributos),
    bind(":valor_total_nf", &t.valor_total_nf),
    bind(":updated_at", &h.updated_at),
  ];
  if !update {
    params.push(bind(":created_at", &h.created_at));
  }
  stmt.execute(params.as_slice())?;
  Ok(())
}

pub fn insert_nfe(conn: &mut Connection, mut doc: RawNewNfe) -> Result<RawNfeDocument> {
  let tx = immediate(conn)?;
  let key = doc.header.chave_nfe.clone();
  if read::nfe_exists(&tx, &key)? {
    return Err(Error::DuplicateDocument(key));
  }
  let now = doc.header.created_at.clone();

  upsert_emitter(&tx, &doc.emitter, &now)?;
  doc.header.destinatario_id = doc
    .recipient
    .as_ref()
    .map(|r| insert_recipient(&tx, r, &now))
    .transpose()?;
  write_nfe_header(&tx, &doc.header, false)?;
  for item in &doc.items {
    insert_item(&tx, &key, item, &now)?;
  }

  let stored = read::nfe_document(&tx, &key)?.ok_or_else(|| Error::DocumentNotFound(key))?;
  tx.commit()?;
  Ok(stored)
}

/// Replace header values and items of an existing NF-e. `created_at` and
/// the event log are kept.
pub fn replace_nfe(conn: &mut Connection, mut doc: RawNewNfe) -> Result<RawNfeDocument> {
  let tx = immediate(conn)?;
  let key = doc.header.chave_nfe.clone();
  let Some(previous) = read::nfe_header(&tx, &key)? else {
    return Err(Error::DocumentNotFound(key));
  };
  let now = doc.header.updated_at.clone();

  upsert_emitter(&tx, &doc.emitter, &now)?;
  doc.header.destinatario_id = doc
    .recipient
    .as_ref()
    .map(|r| insert_recipient(&tx, r, &now))
    .transpose()?;
  tx.execute("DELETE FROM fact_itens_nfe WHERE chave_nfe = ?1", params![key])?;
  write_nfe_header(&tx, &doc.header, true)?;
  if let Some(old) = previous.destinatario_id {
    delete_orphan_recipient(&tx, old)?;
  }
  for item in &doc.items {
    insert_item(&tx, &key, item, &now)?;
  }

  let stored = read::nfe_document(&tx, &key)?.ok_or_else(|| Error::DocumentNotFound(key))?;
  tx.commit()?;
  Ok(stored)
}

/// Append items to an existing header; all or none are written.
pub fn insert_nfe_items(
  conn: &mut Connection,
  key: &str,
  items: Vec<RawItem>,
  now: &str,
) -> Result<Vec<RawStoredItem>> {
  let tx = immediate(conn)?;
  if !read::nfe_exists(&tx, key)? {
    return Err(Error::ReferentialIntegrity(format!("no NF-e with key {key}")));
  }
  for item in &items {
    if read::item_exists(&tx, key, item.numero_item)? {
      return Err(Error::DuplicateItem {
        document:    key.to_owned(),
        item_number: u32::try_from(item.numero_item).unwrap_or(u32::MAX),
      });
    }
    insert_item(&tx, key, item, now)?;
  }
  tx.execute(
    "UPDATE nfe_main SET updated_at = ?2 WHERE chave_nfe = ?1",
    params![key, now],
  )?;

  let added: HashSet<i64> = items.iter().map(|i| i.numero_item).collect();
  let stored = read::nfe_items(&tx, key)?
    .into_iter()
    .filter(|i| added.contains(&i.item.numero_item))
    .collect();
  tx.commit()?;
  Ok(stored)
}

pub fn record_event(conn: &mut Connection, mut event: RawEvent) -> Result<RawEvent> {
  let tx = immediate(conn)?;
  if !read::nfe_exists(&tx, &event.chave_nfe)? {
    return Err(Error::ReferentialIntegrity(format!(
      "no NF-e with key {}",
      event.chave_nfe
    )));
  }
  if read::event_exists(&tx, &event.chave_nfe, &event.tipo_evento, event.sequencia)? {
    return Err(Error::DuplicateEvent {
      key:        event.chave_nfe,
      event_type: event.tipo_evento,
      sequence:   u32::try_from(event.sequencia).unwrap_or(u32::MAX),
    });
  }
  tx.execute(
    "INSERT INTO nfe_eventos (
       chave_nfe, tipo_evento, sequencia, data_evento, descricao,
       justificativa, protocolo, recorded_at
     ) VALUES (
       :chave_nfe, :tipo_evento, :sequencia, :data_evento, :descricao,
       :justificativa, :protocolo, :recorded_at
     )",
    named_params! {
      ":chave_nfe": event.chave_nfe,
      ":tipo_evento": event.tipo_evento,
      ":sequencia": event.sequencia,
      ":data_evento": event.data_evento,
      ":descricao": event.descricao,
      ":justificativa": event.justificativa,
      ":protocolo": event.protocolo,
      ":recorded_at": event.recorded_at,
    },
  )?;
  event.evento_id = tx.last_insert_rowid();
  tx.commit()?;
  Ok(event)
}

// ─── NFS-e ───────────────────────────────────────────────────────────────────

const NFSE_HEADER_VALUES: &str = "
  numero = :numero, serie_dps = :serie_dps, numero_dps = :numero_dps,
  data_emissao = :data_emissao, data_competencia = :data_competencia,
  codigo_municipio_emissao = :codigo_municipio_emissao,
  codigo_municipio_incidencia = :codigo_municipio_incidencia,
  situacao = :situacao, emitente_id = :emitente_id,
  destinatario_id = :destinatario_id,
  valor_total_servicos = :valor_total_servicos,
  valor_deducoes = :valor_deducoes,
  valor_desconto_incondicionado = :valor_desconto_incondicionado,
  base_calculo_issqn = :base_calculo_issqn, aliquota_issqn = :aliquota_issqn,
  valor_issqn = :valor_issqn, issqn_retido = :issqn_retido,
  valor_total_retencoes = :valor_total_retencoes,
  valor_liquido = :valor_liquido,
  updated_at = :updated_at";

fn write_nfse_header(tx: &Transaction<'_>, h: &RawNfseHeader, update: bool) -> Result<()> {
  let sql = if update {
    format!("UPDATE nfse_main SET {NFSE_HEADER_VALUES} WHERE id_nfse = :id_nfse")
  } else {
    "INSERT INTO nfse_main (
       id_nfse, numero, serie_dps, numero_dps, data_emissao, data_competencia,
       codigo_municipio_emissao, codigo_municipio_incidencia, situacao,
       emitente_id, destinatario_id, valor_total_servicos, valor_deducoes,
       valor_desconto_incondicionado, base_calculo_issqn, aliquota_issqn,
       valor_issqn, issqn_retido, valor_total_retencoes, valor_liquido,
       created_at, updated_at
     ) VALUES (
       :id_nfse, :numero, :serie_dps, :numero_dps, :data_emissao, :data_competencia,
       :codigo_municipio_emissao, :codigo_municipio_incidencia, :situacao,
       :emitente_id, :destinatario_id, :valor_total_servicos, :valor_deducoes,
       :valor_desconto_incondicionado, :base_calculo_issqn, :aliquota_issqn,
       :valor_issqn, :issqn_retido, :valor_total_retencoes, :valor_liquido,
       :created_at, :updated_at
     )"
      .to_owned()
  };
  let t = &h.totals;
  let mut stmt = tx.prepare(&sql)?;
  let mut params = vec![
    bind(":id_nfse", &h.id_nfse),
    bind(":numero", &h.numero),
    bind(":serie_dps", &h.serie_dps),
    bind(":numero_dps", &h.numero_dps),
    bind(":data_emissao", &h.data_emissao),
    bind(":data_competencia", &h.data_competencia),
    bind(":codigo_municipio_emissao", &h.codigo_municipio_emissao),
    bind(":codigo_municipio_incidencia", &h.codigo_municipio_incidencia),
    bind(":situacao", &h.situacao),
    bind(":emitente_id", &h.emitente_id),
    bind(":destinatario_id", &h.destinatario_id),
    bind(":valor_total_servicos", &t.valor_total_servicos),
    bind(":valor_deducoes", &t.valor_deducoes),
    bind(":valor_desconto_incondicionado", &t.valor_desconto_incondicionado),
    bind(":base_calculo_issqn", &t.base_calculo_issqn),
    bind(":aliquota_issqn", &t.aliquota_issqn),
    bind(":valor_issqn", &t.valor_issqn),
    bind(":issqn_retido", &t.issqn_retido),
    bind(":valor_total_retencoes", &t.valor_total_retencoes),
    bind(":valor_liquido", &t.valor_liquido),
    bind(":updated_at", &h.updated_at),
  ];
  if !update {
    params.push(bind(":created_at", &h.created_at));
  }
  stmt.execute(params.as_slice())?;
  Ok(())
}

pub fn insert_nfse(conn: &mut Connection, mut doc: RawNewNfse) -> Result<RawNfseDocument> {
  let tx = immediate(conn)?;
  let id = doc.header.id_nfse.clone();
  if read::nfse_exists(&tx, &id)? {
    return Err(Error::DuplicateDocument(id));
  }
  let now = doc.header.created_at.clone();

  upsert_emitter(&tx, &doc.emitter, &now)?;
  doc.header.destinatario_id = doc
    .recipient
    .as_ref()
    .map(|r| insert_recipient(&tx, r, &now))
    .transpose()?;
  write_nfse_header(&tx, &doc.header, false)?;
  for line in &doc.services {
    insert_service_line(&tx, &id, line, &now)?;
  }

  let stored = read::nfse_document(&tx, &id)?.ok_or_else(|| Error::DocumentNotFound(id))?;
  tx.commit()?;
  Ok(stored)
}

pub fn replace_nfse(conn: &mut Connection, mut doc: RawNewNfse) -> Result<RawNfseDocument> {
  let tx = immediate(conn)?;
  let id = doc.header.id_nfse.clone();
  let Some(previous) = read::nfse_header(&tx, &id)? else {
    return Err(Error::DocumentNotFound(id));
  };
  let now = doc.header.updated_at.clone();

  upsert_emitter(&tx, &doc.emitter, &now)?;
  doc.header.destinatario_id = doc
    .recipient
    .as_ref()
    .map(|r| insert_recipient(&tx, r, &now))
    .transpose()?;
  tx.execute("DELETE FROM fact_servicos_nfse WHERE id_nfse = ?1", params![id])?;
  write_nfse_header(&tx, &doc.header, true)?;
  if let Some(old) = previous.destinatario_id {
    delete_orphan_recipient(&tx, old)?;
  }
  for line in &doc.services {
    insert_service_line(&tx, &id, line, &now)?;
  }

  let stored = read::nfse_document(&tx, &id)?.ok_or_else(|| Error::DocumentNotFound(id))?;
  tx.commit()?;
  Ok(stored)
}

// ─── Jobs ────────────────────────────────────────────────────────────────────

pub fn insert_job(conn: &Connection, job: &RawJob) -> Result<()> {
  conn.execute(
    "INSERT INTO ingest_jobs (
       job_id, file_name, digest, status, failed_stage, error, payload_kind,
       document_id, duplicate_of, created_at, updated_at
     ) VALUES (
       :job_id, :file_name, :digest, :status, :failed_stage, :error, :payload_kind,
       :document_id, :duplicate_of, :created_at, :updated_at
     )",
    named_params! {
      ":job_id": job.job_id,
      ":file_name": job.file_name,
      ":digest": job.digest,
      ":status": job.status,
      ":failed_stage": job.failed_stage,
      ":error": job.error,
      ":payload_kind": job.payload_kind,
      ":document_id": job.document_id,
      ":duplicate_of": job.duplicate_of,
      ":created_at": job.created_at,
      ":updated_at": job.updated_at,
    },
  )?;
  Ok(())
}

/// Returns `false` if no job has this id.
pub fn update_job(conn: &Connection, job: &RawJob) -> Result<bool> {
  let changed = conn.execute(
    "UPDATE ingest_jobs SET
       status = :status, failed_stage = :failed_stage, error = :error,
       payload_kind = :payload_kind, document_id = :document_id,
       duplicate_of = :duplicate_of, updated_at = :updated_at
     WHERE job_id = :job_id",
    named_params! {
      ":job_id": job.job_id,
      ":status": job.status,
      ":failed_stage": job.failed_stage,
      ":error": job.error,
      ":payload_kind": job.payload_kind,
      ":document_id": job.document_id,
      ":duplicate_of": job.duplicate_of,
      ":updated_at": job.updated_at,
    },
  )?;
  Ok(changed > 0)
}
