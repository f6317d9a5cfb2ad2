//! Handlers for `/analytics` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/analytics/suppliers` | Per-supplier totals, highest value first |
//! | `GET`  | `/analytics/products` | Most-purchased products, `?limit=` (default 10) |
//! | `GET`  | `/analytics/taxes` | Tax totals per period, optional `from`, `to` |

use axum::{
  Json,
  extract::{Query, State},
};
use fiscal_core::{
  report::{ProductRanking, SupplierSummary, TaxPeriodSummary},
  store::FiscalStore,
};
use serde::Deserialize;

use crate::{ApiState, documents::period_range, error::ApiError};

const DEFAULT_PRODUCT_LIMIT: usize = 10;
const MAX_PRODUCT_LIMIT: usize = 1000;

/// `GET /analytics/suppliers`
pub async fn suppliers<S: FiscalStore>(
  State(state): State<ApiState<S>>,
) -> Result<Json<Vec<SupplierSummary>>, ApiError> {
  let rows = state.store.supplier_summary().await.map_err(ApiError::store)?;
  Ok(Json(rows))
}

#[derive(Debug, Deserialize, Default)]
pub struct ProductParams {
  pub limit: Option<usize>,
}

/// `GET /analytics/products[?limit=...]`
pub async fn products<S: FiscalStore>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ProductParams>,
) -> Result<Json<Vec<ProductRanking>>, ApiError> {
  let limit = match params.limit {
    Some(0) => return Err(ApiError::BadRequest("limit must be positive".into())),
    Some(n) => n.min(MAX_PRODUCT_LIMIT),
    None => DEFAULT_PRODUCT_LIMIT,
  };
  let rows = state.store.top_products(limit).await.map_err(ApiError::store)?;
  Ok(Json(rows))
}

#[derive(Debug, Deserialize, Default)]
pub struct TaxParams {
  pub from: Option<String>,
  pub to:   Option<String>,
}

/// `GET /analytics/taxes[?from=YYYY-MM][&to=YYYY-MM]`
pub async fn taxes<S: FiscalStore>(
  State(state): State<ApiState<S>>,
  Query(params): Query<TaxParams>,
) -> Result<Json<Vec<TaxPeriodSummary>>, ApiError> {
  let range = period_range(params.from, params.to)?;
  let rows = state.store.tax_analysis(&range).await.map_err(ApiError::store)?;
  Ok(Json(rows))
}
