//! HTTP server wiring for the fiscal document warehouse.
//!
//! Loads [`ServerConfig`], builds the ingestion [`Pipeline`] over a
//! [`SqliteStore`], and mounts the JSON API under `/api/v1` next to a
//! `/health` probe.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use fiscal_core::catalog::Classification;
use fiscal_pipeline::{NcmPrefixClassifier, Pipeline, ReingestPolicy, WatchConfig};
use fiscal_store_sqlite::SqliteStore;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `FISCAL_*` environment variables. Every field has a default.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                    String,
  pub port:                    u16,
  pub store_path:              PathBuf,
  pub watch_enabled:           bool,
  pub xml_watch_directory:     PathBuf,
  pub xml_processed_directory: PathBuf,
  pub xml_error_directory:     PathBuf,
  pub poll_interval_secs:      u64,
  pub reingest_policy:         ReingestPolicy,
  /// NCM prefix → category, for the classify stage. Empty disables
  /// classification.
  pub ncm_categories:          BTreeMap<String, Classification>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                    "127.0.0.1".to_owned(),
      port:                    8080,
      store_path:              PathBuf::from("fiscal.db"),
      watch_enabled:           false,
      xml_watch_directory:     PathBuf::from("xml/inbox"),
      xml_processed_directory: PathBuf::from("xml/processed"),
      xml_error_directory:     PathBuf::from("xml/error"),
      poll_interval_secs:      30,
      reingest_policy:         ReingestPolicy::Reject,
      ncm_categories:          BTreeMap::new(),
    }
  }
}

impl ServerConfig {
  /// Layer the optional TOML file at `path` under `FISCAL_*` variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    Self::load_with(path, config::Environment::with_prefix("FISCAL"))
  }

  fn load_with(path: &Path, env: config::Environment) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(env.try_parsing(true))
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn watch_config(&self) -> WatchConfig {
    WatchConfig {
      watch_dir:     self.xml_watch_directory.clone(),
      processed_dir: self.xml_processed_directory.clone(),
      error_dir:     self.xml_error_directory.clone(),
      poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
    }
  }

  /// A pipeline over `store` with this configuration's policy and
  /// classifier.
  pub fn pipeline(&self, store: Arc<SqliteStore>) -> Pipeline<SqliteStore> {
    let pipeline = Pipeline::new(store).with_policy(self.reingest_policy);
    if self.ncm_categories.is_empty() {
      return pipeline;
    }
    pipeline.with_classifier(NcmPrefixClassifier::new(self.ncm_categories.clone()))
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router.
pub fn router(pipeline: Pipeline<SqliteStore>) -> Router {
  let store = Arc::clone(pipeline.store());
  Router::new()
    .route("/health", get(health).with_state(store))
    .nest("/api/v1", fiscal_api::api_router(pipeline))
    .layer(TraceLayer::new_for_http())
}

/// `GET /health`: 200 when the database answers, 503 otherwise.
async fn health(State(store): State<Arc<SqliteStore>>) -> (StatusCode, Json<Value>) {
  match store.ping().await {
    Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
    Err(e) => {
      tracing::warn!(error = %e, "health check failed");
      (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "status": "unavailable", "error": e.to_string() })),
      )
    }
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use axum::{body::Body, http::Request};
  use tower::ServiceExt as _;

  use super::*;

  fn env(vars: &[(&str, &str)]) -> config::Environment {
    let map: HashMap<String, String> = vars
      .iter()
      .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
      .collect();
    config::Environment::with_prefix("FISCAL").source(Some(map))
  }

  #[test]
  fn defaults_without_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ServerConfig::load_with(&dir.path().join("missing.toml"), env(&[])).unwrap();
    assert_eq!(cfg.address(), "127.0.0.1:8080");
    assert_eq!(cfg.reingest_policy, ReingestPolicy::Reject);
    assert!(!cfg.watch_enabled);
    assert_eq!(cfg.watch_config().poll_interval, Duration::from_secs(30));
  }

  #[test]
  fn file_then_environment() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
      &path,
      r#"
        port = 9000
        store_path = "/var/lib/fiscal/fiscal.db"
        reingest_policy = "replace"
        watch_enabled = true

        [ncm_categories."8471"]
        category = "Informatica"

        [ncm_categories."7318"]
        category = "Ferragens"
        subcategory = "Parafusos"
      "#,
    )
    .unwrap();

    let cfg = ServerConfig::load_with(&path, env(&[
      ("FISCAL_PORT", "9100"),
      ("FISCAL_POLL_INTERVAL_SECS", "5"),
      ("FISCAL_XML_WATCH_DIRECTORY", "/srv/xml/in"),
    ]))
    .unwrap();

    assert_eq!(cfg.port, 9100);
    assert_eq!(cfg.store_path, PathBuf::from("/var/lib/fiscal/fiscal.db"));
    assert_eq!(cfg.reingest_policy, ReingestPolicy::Replace);
    assert!(cfg.watch_enabled);
    assert_eq!(cfg.poll_interval_secs, 5);
    assert_eq!(cfg.xml_watch_directory, PathBuf::from("/srv/xml/in"));
    assert_eq!(cfg.ncm_categories.len(), 2);
    assert_eq!(
      cfg.ncm_categories["7318"].subcategory.as_deref(),
      Some("Parafusos")
    );
  }

  #[tokio::test]
  async fn health_and_api_are_mounted() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let app = router(ServerConfig::default().pipeline(store));

    for uri in ["/health", "/api/v1/status", "/api/v1/documents"] {
      let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
      let resp = app.clone().oneshot(req).await.unwrap();
      assert_eq!(resp.status(), StatusCode::OK, "{uri}");
    }

    let req = Request::builder().uri("/status").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }
}
