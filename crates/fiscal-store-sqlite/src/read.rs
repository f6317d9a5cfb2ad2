//! Read queries. Each function runs on the connection thread and returns
//! raw rows; decoding happens after the connection call returns.

use rusqlite::{Connection, OptionalExtension as _, params};

use crate::rows::{
  EMITTER_COLUMNS, PRODUCT_COLUMNS, RECIPIENT_COLUMNS, RawEmitter, RawEvent, RawJob,
  RawNfeDocument, RawNfeHeader, RawNfseDocument, RawNfseHeader, RawProduct,
  RawProductRanking, RawRecipient, RawService, RawStoredItem, RawStoredServiceLine,
  RawSupplierSummary, RawTaxPeriod, RawUnified, SERVICE_COLUMNS,
};

// ─── Existence checks ────────────────────────────────────────────────────────

fn exists(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> rusqlite::Result<bool> {
  Ok(conn.query_row(sql, params, |_| Ok(())).optional()?.is_some())
}

pub fn nfe_exists(conn: &Connection, key: &str) -> rusqlite::Result<bool> {
  exists(conn, "SELECT 1 FROM nfe_main WHERE chave_nfe = ?1", params![key])
}

pub fn nfse_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
  exists(conn, "SELECT 1 FROM nfse_main WHERE id_nfse = ?1", params![id])
}

pub fn item_exists(conn: &Connection, key: &str, numero_item: i64) -> rusqlite::Result<bool> {
  exists(
    conn,
    "SELECT 1 FROM fact_itens_nfe WHERE chave_nfe = ?1 AND numero_item = ?2",
    params![key, numero_item],
  )
}

pub fn event_exists(
  conn: &Connection,
  key: &str,
  tipo_evento: &str,
  sequencia: i64,
) -> rusqlite::Result<bool> {
  exists(
    conn,
    "SELECT 1 FROM nfe_eventos
     WHERE chave_nfe = ?1 AND tipo_evento = ?2 AND sequencia = ?3",
    params![key, tipo_evento, sequencia],
  )
}

// ─── Dimensions ──────────────────────────────────────────────────────────────

pub fn emitter(conn: &Connection, emitente_id: &str) -> rusqlite::Result<Option<RawEmitter>> {
  conn
    .query_row(
      &format!("SELECT {EMITTER_COLUMNS} FROM dim_emitente e WHERE e.emitente_id = ?1"),
      params![emitente_id],
      RawEmitter::from_row,
    )
    .optional()
}

pub fn emitters(conn: &Connection) -> rusqlite::Result<Vec<RawEmitter>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {EMITTER_COLUMNS} FROM dim_emitente e ORDER BY e.razao_social, e.emitente_id"
  ))?;
  stmt.query_map([], RawEmitter::from_row)?.collect()
}

fn recipient(conn: &Connection, id: i64) -> rusqlite::Result<Option<(i64, RawRecipient)>> {
  conn
    .query_row(
      &format!(
        "SELECT {RECIPIENT_COLUMNS} FROM dim_destinatario d WHERE d.destinatario_id = ?1"
      ),
      params![id],
      RawRecipient::from_row,
    )
    .optional()
}

pub fn product(conn: &Connection, code: &str) -> rusqlite::Result<Option<RawProduct>> {
  conn
    .query_row(
      &format!("SELECT {PRODUCT_COLUMNS} FROM dim_produtos p WHERE p.codigo_produto = ?1"),
      params![code],
      RawProduct::from_row,
    )
    .optional()
}

pub fn products(conn: &Connection) -> rusqlite::Result<Vec<RawProduct>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {PRODUCT_COLUMNS} FROM dim_produtos p ORDER BY p.codigo_produto"
  ))?;
  stmt.query_map([], RawProduct::from_row)?.collect()
}

pub fn service(conn: &Connection, code: &str) -> rusqlite::Result<Option<RawService>> {
  conn
    .query_row(
      &format!("SELECT {SERVICE_COLUMNS} FROM dim_servicos sv WHERE sv.codigo_servico = ?1"),
      params![code],
      RawService::from_row,
    )
    .optional()
}

// ─── NF-e ────────────────────────────────────────────────────────────────────

pub fn nfe_header(conn: &Connection, key: &str) -> rusqlite::Result<Option<RawNfeHeader>> {
  conn
    .query_row(
      "SELECT * FROM nfe_main WHERE chave_nfe = ?1",
      params![key],
      RawNfeHeader::from_row,
    )
    .optional()
}

pub fn nfe_items(conn: &Connection, key: &str) -> rusqlite::Result<Vec<RawStoredItem>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT i.*, {PRODUCT_COLUMNS}
     FROM fact_itens_nfe i
     JOIN dim_produtos p ON p.codigo_produto = i.codigo_produto
     WHERE i.chave_nfe = ?1
     ORDER BY i.numero_item"
  ))?;
  stmt.query_map(params![key], RawStoredItem::from_row)?.collect()
}

pub fn nfe_events(conn: &Connection, key: &str) -> rusqlite::Result<Vec<RawEvent>> {
  let mut stmt = conn.prepare(
    "SELECT * FROM nfe_eventos WHERE chave_nfe = ?1 ORDER BY evento_id",
  )?;
  stmt.query_map(params![key], RawEvent::from_row)?.collect()
}

pub fn nfe_document(conn: &Connection, key: &str) -> rusqlite::Result<Option<RawNfeDocument>> {
  let Some(header) = nfe_header(conn, key)? else {
    return Ok(None);
  };
  let Some(emitter) = emitter(conn, &header.emitente_id)? else {
    return Err(rusqlite::Error::QueryReturnedNoRows);
  };
  let recipient = match header.destinatario_id {
    Some(id) => recipient(conn, id)?,
    None => None,
  };
  Ok(Some(RawNfeDocument {
    emitter,
    recipient,
    items: nfe_items(conn, key)?,
    events: nfe_events(conn, key)?,
    header,
  }))
}

// ─── NFS-e ───────────────────────────────────────────────────────────────────

pub fn nfse_header(conn: &Connection, id: &str) -> rusqlite::Result<Option<RawNfseHeader>> {
  conn
    .query_row(
      "SELECT * FROM nfse_main WHERE id_nfse = ?1",
      params![id],
      RawNfseHeader::from_row,
    )
    .optional()
}

pub fn nfse_services(conn: &Connection, id: &str) -> rusqlite::Result<Vec<RawStoredServiceLine>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT f.*, {SERVICE_COLUMNS}
     FROM fact_servicos_nfse f
     JOIN dim_servicos sv ON sv.codigo_servico = f.codigo_servico
     WHERE f.id_nfse = ?1
     ORDER BY f.numero_linha"
  ))?;
  stmt.query_map(params![id], RawStoredServiceLine::from_row)?.collect()
}

pub fn nfse_document(conn: &Connection, id: &str) -> rusqlite::Result<Option<RawNfseDocument>> {
  let Some(header) = nfse_header(conn, id)? else {
    return Ok(None);
  };
  let Some(emitter) = emitter(conn, &header.emitente_id)? else {
    return Err(rusqlite::Error::QueryReturnedNoRows);
  };
  let recipient = match header.destinatario_id {
    Some(rid) => recipient(conn, rid)?,
    None => None,
  };
  Ok(Some(RawNfseDocument {
    emitter,
    recipient,
    services: nfse_services(conn, id)?,
    header,
  }))
}

// ─── Views ───────────────────────────────────────────────────────────────────

/// Filters on the unified view. `None` disables a filter.
pub struct UnifiedFilter {
  pub tipo_documento: Option<String>,
  pub periodo_de:     Option<String>,
  pub periodo_ate:    Option<String>,
  pub emitente_id:    Option<String>,
  pub limit:          i64,
  pub offset:         i64,
}

pub fn unified(conn: &Connection, f: &UnifiedFilter) -> rusqlite::Result<Vec<RawUnified>> {
  let mut stmt = conn.prepare(
    "SELECT * FROM vw_documentos_unificados
     WHERE (?1 IS NULL OR tipo_documento = ?1)
       AND (?2 IS NULL OR periodo >= ?2)
       AND (?3 IS NULL OR periodo <= ?3)
       AND (?4 IS NULL OR emitente_id = ?4)
     ORDER BY julianday(data_emissao) DESC, documento_id
     LIMIT ?5 OFFSET ?6",
  )?;
  stmt
    .query_map(
      params![
        f.tipo_documento,
        f.periodo_de,
        f.periodo_ate,
        f.emitente_id,
        f.limit,
        f.offset,
      ],
      RawUnified::from_row,
    )?
    .collect()
}

pub fn supplier_summary(conn: &Connection) -> rusqlite::Result<Vec<RawSupplierSummary>> {
  let mut stmt = conn.prepare(
    "SELECT * FROM vw_resumo_fornecedores ORDER BY valor_total DESC, emitente_id",
  )?;
  stmt.query_map([], RawSupplierSummary::from_row)?.collect()
}

pub fn top_products(conn: &Connection, limit: i64) -> rusqlite::Result<Vec<RawProductRanking>> {
  let mut stmt = conn.prepare(
    "SELECT * FROM vw_produtos_mais_comprados
     ORDER BY valor_total DESC, codigo_produto
     LIMIT ?1",
  )?;
  stmt.query_map(params![limit], RawProductRanking::from_row)?.collect()
}

pub fn tax_analysis(
  conn: &Connection,
  periodo_de: Option<&str>,
  periodo_ate: Option<&str>,
) -> rusqlite::Result<Vec<RawTaxPeriod>> {
  let mut stmt = conn.prepare(
    "SELECT * FROM vw_analise_impostos_periodo
     WHERE (?1 IS NULL OR periodo >= ?1)
       AND (?2 IS NULL OR periodo <= ?2)
     ORDER BY periodo",
  )?;
  stmt
    .query_map(params![periodo_de, periodo_ate], RawTaxPeriod::from_row)?
    .collect()
}

// ─── Jobs ────────────────────────────────────────────────────────────────────

pub fn job(conn: &Connection, job_id: &str) -> rusqlite::Result<Option<RawJob>> {
  conn
    .query_row(
      &format!("SELECT {} FROM ingest_jobs WHERE job_id = ?1", RawJob::COLUMNS),
      params![job_id],
      RawJob::from_row,
    )
    .optional()
}

/// The earliest stored job for a digest.
pub fn stored_job_by_digest(conn: &Connection, digest: &str) -> rusqlite::Result<Option<RawJob>> {
  conn
    .query_row(
      &format!(
        "SELECT {} FROM ingest_jobs
         WHERE digest = ?1 AND status = 'stored'
         ORDER BY created_at
         LIMIT 1",
        RawJob::COLUMNS
      ),
      params![digest],
      RawJob::from_row,
    )
    .optional()
}

pub fn jobs(conn: &Connection, limit: i64) -> rusqlite::Result<Vec<RawJob>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {} FROM ingest_jobs ORDER BY created_at DESC, job_id LIMIT ?1",
    RawJob::COLUMNS
  ))?;
  stmt.query_map(params![limit], RawJob::from_row)?.collect()
}

pub fn job_counts(conn: &Connection) -> rusqlite::Result<Vec<(String, i64)>> {
  let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM ingest_jobs GROUP BY status")?;
  stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?.collect()
}
