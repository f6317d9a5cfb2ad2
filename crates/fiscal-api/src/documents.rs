//! Handlers for `/documents` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/documents` | Unified NF-e/NFS-e rows; optional `kind`, `from`, `to`, `emitter`, `limit` (max 1000), `offset` |
//! | `GET`  | `/documents/nfe/:key` | Full NF-e with items and events |
//! | `GET`  | `/documents/nfse/:id` | Full NFS-e with service lines |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use fiscal_core::{
  document::{DocumentKind, NfeDocument, NfseDocument},
  ids::{NfeKey, NfseId, TaxId},
  report::{DocumentQuery, Period, PeriodRange, UnifiedDocument},
  store::FiscalStore,
};
use serde::Deserialize;

use crate::{ApiState, error::ApiError};

pub(crate) const MAX_DOCUMENT_LIMIT: usize = 1000;

/// Parse optional `YYYY-MM` bounds into a range.
pub(crate) fn period_range(
  from: Option<String>,
  to: Option<String>,
) -> Result<PeriodRange, ApiError> {
  let parse = |value: Option<String>| {
    value
      .map(|s| Period::parse(&s))
      .transpose()
      .map_err(|e| ApiError::BadRequest(e.to_string()))
  };
  let range = PeriodRange { from: parse(from)?, to: parse(to)? };
  if let (Some(from), Some(to)) = (&range.from, &range.to)
    && from > to
  {
    return Err(ApiError::BadRequest(format!("period range {from}..{to} is empty")));
  }
  Ok(range)
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  /// `nfe` or `nfse`, case-insensitive.
  pub kind:    Option<String>,
  /// First period, `YYYY-MM`, inclusive.
  pub from:    Option<String>,
  /// Last period, `YYYY-MM`, inclusive.
  pub to:      Option<String>,
  /// Emitter CNPJ/CPF, with or without punctuation.
  pub emitter: Option<String>,
  pub limit:   Option<usize>,
  pub offset:  Option<usize>,
}

/// Turn query-string filters into a store query. `limit` is clamped to
/// [`MAX_DOCUMENT_LIMIT`].
pub(crate) fn document_query(params: ListParams) -> Result<DocumentQuery, ApiError> {
  let kind = params
    .kind
    .map(|k| DocumentKind::parse(&k))
    .transpose()
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
  let emitter = params
    .emitter
    .map(|e| TaxId::parse(&e))
    .transpose()
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

  Ok(DocumentQuery {
    kind,
    periods: period_range(params.from, params.to)?,
    emitter: emitter.map(|id| id.digits().to_owned()),
    limit: params.limit.map(|l| l.min(MAX_DOCUMENT_LIMIT)),
    offset: params.offset,
  })
}

/// `GET /documents[?kind=...][&from=...][&to=...][&emitter=...][&limit=...][&offset=...]`
pub async fn list<S: FiscalStore>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<UnifiedDocument>>, ApiError> {
  let query = document_query(params)?;
  let rows = state
    .store
    .unified_documents(&query)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(rows))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /documents/nfe/:key`
pub async fn nfe<S: FiscalStore>(
  State(state): State<ApiState<S>>,
  Path(key): Path<String>,
) -> Result<Json<NfeDocument>, ApiError> {
  let key = NfeKey::parse(&key).map_err(|e| ApiError::BadRequest(e.to_string()))?;
  let doc = state
    .store
    .get_nfe(key.clone())
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("NF-e {key} not found")))?;
  Ok(Json(doc))
}

/// `GET /documents/nfse/:id`
pub async fn nfse<S: FiscalStore>(
  State(state): State<ApiState<S>>,
  Path(id): Path<String>,
) -> Result<Json<NfseDocument>, ApiError> {
  let id = NfseId::parse(&id).map_err(|e| ApiError::BadRequest(e.to_string()))?;
  let doc = state
    .store
    .get_nfse(id.clone())
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("NFS-e {id} not found")))?;
  Ok(Json(doc))
}
