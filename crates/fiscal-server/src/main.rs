//! fiscald: fiscal document warehouse server.
//!
//! Reads `config.toml` (or the path given with `--config`) plus `FISCAL_*`
//! environment variables, opens the SQLite store and either serves the HTTP
//! API or ingests the files named on the command line.
//!
//! ```text
//! fiscald serve
//! fiscald ingest notas/*.xml
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use fiscal_pipeline::{DirectoryWatcher, PipelineError};
use fiscal_server::ServerConfig;
use fiscal_store_sqlite::SqliteStore;
use tokio::{net::TcpListener, sync::watch};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Fiscal document warehouse server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml", global = true)]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API and, if enabled, the watch-directory worker.
  Serve,
  /// Run the given XML files through the pipeline and exit.
  Ingest {
    #[arg(required = true)]
    files: Vec<PathBuf>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let server_cfg =
    ServerConfig::load(&cli.config).context("failed to load server configuration")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(server_cfg, store).await,
    Command::Ingest { files } => ingest(&server_cfg, store, &files).await,
  }
}

async fn serve(server_cfg: ServerConfig, store: Arc<SqliteStore>) -> anyhow::Result<()> {
  let pipeline = server_cfg.pipeline(store);
  let (shutdown_tx, shutdown_rx) = watch::channel(false);

  let worker = server_cfg.watch_enabled.then(|| {
    let watcher = DirectoryWatcher::new(pipeline.clone(), server_cfg.watch_config());
    tokio::spawn(watcher.run(shutdown_rx))
  });

  let app = fiscal_server::router(pipeline);
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
      }
      tracing::info!("shutting down");
    })
    .await
    .context("server error")?;

  // The receiver may already be gone if the worker never started.
  let _ = shutdown_tx.send(true);
  if let Some(worker) = worker {
    worker.await.context("watch-directory worker panicked")?;
  }
  Ok(())
}

async fn ingest(
  server_cfg: &ServerConfig,
  store: Arc<SqliteStore>,
  files: &[PathBuf],
) -> anyhow::Result<()> {
  let pipeline = server_cfg.pipeline(store);
  let mut failed = 0usize;

  for path in files {
    let bytes = tokio::fs::read(path)
      .await
      .with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.display().to_string());

    match pipeline.ingest(&file_name, &bytes).await {
      Ok(job) => println!(
        "{}\t{}\t{}",
        path.display(),
        job.status.as_str(),
        job.document_id.as_deref().unwrap_or("-")
      ),
      Err(PipelineError::StageFailure { stage, error, .. }) => {
        failed += 1;
        println!("{}\tfailed\t{stage}: {error}", path.display());
      }
      Err(other) => return Err(other).context("job ledger unavailable"),
    }
  }

  if failed > 0 {
    anyhow::bail!("{failed} of {} files failed", files.len());
  }
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
