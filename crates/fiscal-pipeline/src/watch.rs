//! Watch-directory worker.
//!
//! Polls a directory for `*.xml` files and feeds each one through the
//! [`Pipeline`]. Stored and duplicate files move to the processed directory;
//! files that fail a stage move to the error directory. A file that hits a
//! ledger error, or cannot be read, stays where it is and is retried on the
//! next poll. A file that was ingested but could not be moved is not ingested
//! again; only the move is retried.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  time::Duration,
};

use fiscal_core::store::FiscalStore;
use tokio::{sync::watch, time::MissedTickBehavior};

use crate::{
  error::{PipelineError, Result},
  pipeline::{Pipeline, digest},
};

#[derive(Debug, Clone)]
pub struct WatchConfig {
  pub watch_dir:     PathBuf,
  pub processed_dir: PathBuf,
  pub error_dir:     PathBuf,
  pub poll_interval: Duration,
}

/// Outcome of one pass over the watch directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
  pub processed: usize,
  pub failed:    usize,
  /// Left in place after a ledger, read or move error.
  pub retained:  usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
  Processed,
  Failed,
}

/// A file whose job is already in the ledger but which is still sitting in
/// the watch directory. While its bytes are unchanged only the move is
/// retried.
struct Unmoved {
  digest:  String,
  outcome: Outcome,
  job_id:  String,
}

pub struct DirectoryWatcher<S> {
  pipeline: Pipeline<S>,
  config:   WatchConfig,
  unmoved:  HashMap<PathBuf, Unmoved>,
}

impl<S: FiscalStore> DirectoryWatcher<S> {
  pub fn new(pipeline: Pipeline<S>, config: WatchConfig) -> Self {
    Self { pipeline, config, unmoved: HashMap::new() }
  }

  /// Poll until `shutdown` turns `true` or its sender is dropped.
  pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
    tracing::info!(
      dir = %self.config.watch_dir.display(),
      interval_secs = self.config.poll_interval.as_secs(),
      "watch-directory worker started"
    );

    let mut ticker = tokio::time::interval(self.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        changed = shutdown.changed() => {
          if changed.is_err() || *shutdown.borrow() {
            break;
          }
        }
        _ = ticker.tick() => {
          match self.scan_once().await {
            Ok(report) if report != ScanReport::default() => {
              tracing::info!(
                processed = report.processed,
                failed = report.failed,
                retained = report.retained,
                "watch directory scanned"
              );
            }
            Ok(_) => {}
            Err(err) => tracing::error!(%err, "watch directory scan failed"),
          }
        }
      }
    }

    tracing::info!("watch-directory worker stopped");
  }

  /// Ingest every `*.xml` file currently in the watch directory, in name
  /// order. A file that cannot be read or moved is counted as retained and
  /// the scan carries on with the next one.
  pub async fn scan_once(&mut self) -> Result<ScanReport> {
    for dir in [
      &self.config.watch_dir,
      &self.config.processed_dir,
      &self.config.error_dir,
    ] {
      tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PipelineError::io(dir, e))?;
    }

    let files = self.pending_files().await?;
    self.unmoved.retain(|path, _| files.contains(path));

    let mut report = ScanReport::default();
    for path in files {
      let Some(file_name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
        continue;
      };
      let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) => {
          tracing::error!(file = %file_name, %err, "cannot read file, leaving it for the next poll");
          report.retained += 1;
          continue;
        }
      };

      let file_digest = digest(&bytes);
      let recorded = self
        .unmoved
        .remove(&path)
        .filter(|prev| prev.digest == file_digest)
        .map(|prev| (prev.outcome, prev.job_id));

      let (outcome, job_id) = match recorded {
        Some(recorded) => recorded,
        None => match self.pipeline.ingest(&file_name, &bytes).await {
          Ok(job) => (Outcome::Processed, job.job_id.to_string()),
          Err(PipelineError::StageFailure { job, .. }) => {
            (Outcome::Failed, job.job_id.to_string())
          }
          Err(err) => {
            tracing::error!(file = %file_name, %err, "leaving file for the next poll");
            report.retained += 1;
            continue;
          }
        },
      };

      let dir = match outcome {
        Outcome::Processed => &self.config.processed_dir,
        Outcome::Failed => &self.config.error_dir,
      };
      match move_file(&path, dir, &file_name, &job_id).await {
        Ok(_) if outcome == Outcome::Processed => report.processed += 1,
        Ok(_) => report.failed += 1,
        Err(err) => {
          tracing::error!(file = %file_name, %job_id, %err, "cannot move file, will retry the move");
          let unmoved = Unmoved { digest: file_digest, outcome, job_id };
          self.unmoved.insert(path, unmoved);
          report.retained += 1;
        }
      }
    }
    Ok(report)
  }

  async fn pending_files(&self) -> Result<Vec<PathBuf>> {
    let dir = &self.config.watch_dir;
    let mut entries = tokio::fs::read_dir(dir)
      .await
      .map_err(|e| PipelineError::io(dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
      .next_entry()
      .await
      .map_err(|e| PipelineError::io(dir, e))?
    {
      let path = entry.path();
      let is_file = entry
        .file_type()
        .await
        .map_err(|e| PipelineError::io(&path, e))?
        .is_file();
      if is_file && is_xml(&path) {
        files.push(path);
      }
    }
    files.sort();
    Ok(files)
  }
}

fn is_xml(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}

/// Move into `dir`, prefixing the job id when the name is already taken.
async fn move_file(from: &Path, dir: &Path, file_name: &str, job_id: &str) -> Result<PathBuf> {
  let mut to = dir.join(file_name);
  if tokio::fs::try_exists(&to)
    .await
    .map_err(|e| PipelineError::io(&to, e))?
  {
    to = dir.join(format!("{job_id}-{file_name}"));
  }
  tokio::fs::rename(from, &to)
    .await
    .map_err(|e| PipelineError::io(from, e))?;
  tracing::debug!(from = %from.display(), to = %to.display(), "file moved");
  Ok(to)
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use fiscal_core::job::JobStatus;
  use fiscal_store_sqlite::SqliteStore;
  use tempfile::TempDir;

  use super::*;

  const NFE: &[u8] = include_bytes!("../../fiscal-xml/fixtures/nfe_proc.xml");

  async fn watcher(root: &TempDir) -> (DirectoryWatcher<SqliteStore>, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let config = WatchConfig {
      watch_dir:     root.path().join("inbox"),
      processed_dir: root.path().join("processed"),
      error_dir:     root.path().join("error"),
      poll_interval: Duration::from_millis(20),
    };
    (DirectoryWatcher::new(Pipeline::new(Arc::clone(&store)), config), store)
  }

  fn names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
      .collect();
    names.sort();
    names
  }

  #[tokio::test]
  async fn scan_sorts_files_into_processed_and_error() {
    let root = TempDir::new().unwrap();
    let (mut watcher, store) = watcher(&root).await;
    let inbox = root.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();
    std::fs::write(inbox.join("a-nota.xml"), NFE).unwrap();
    std::fs::write(inbox.join("b-broken.XML"), b"<nfeProc>").unwrap();
    std::fs::write(inbox.join("notes.txt"), b"ignored").unwrap();

    let report = watcher.scan_once().await.unwrap();
    assert_eq!(report, ScanReport { processed: 1, failed: 1, retained: 0 });

    assert_eq!(names(&inbox), vec!["notes.txt"]);
    assert_eq!(names(&root.path().join("processed")), vec!["a-nota.xml"]);
    assert_eq!(names(&root.path().join("error")), vec!["b-broken.XML"]);

    let counts = store.job_counts().await.unwrap();
    assert_eq!(counts.stored, 1);
    assert_eq!(counts.failed, 1);
  }

  #[tokio::test]
  async fn duplicate_name_gets_job_prefix() {
    let root = TempDir::new().unwrap();
    let (mut watcher, store) = watcher(&root).await;
    let inbox = root.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();

    std::fs::write(inbox.join("nota.xml"), NFE).unwrap();
    watcher.scan_once().await.unwrap();
    std::fs::write(inbox.join("nota.xml"), NFE).unwrap();
    let report = watcher.scan_once().await.unwrap();
    assert_eq!(report.processed, 1);

    let processed = names(&root.path().join("processed"));
    assert_eq!(processed.len(), 2);
    assert!(processed.iter().any(|n| n.len() > "nota.xml".len() && n.ends_with("-nota.xml")));

    let jobs = store.list_jobs(10).await.unwrap();
    assert!(jobs.iter().any(|j| j.status == JobStatus::Duplicate));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn unmovable_file_is_not_ingested_again() {
    let root = TempDir::new().unwrap();
    let (mut watcher, store) = watcher(&root).await;
    let inbox = root.path().join("inbox");
    let processed = root.path().join("processed");
    std::fs::create_dir_all(&inbox).unwrap();
    std::fs::create_dir_all(&processed).unwrap();
    std::fs::write(inbox.join("a-nota.xml"), NFE).unwrap();
    std::fs::write(inbox.join("b-broken.xml"), b"<nfeProc>").unwrap();

    // A self-referencing link makes the destination check fail with ELOOP.
    let blocker = processed.join("a-nota.xml");
    std::os::unix::fs::symlink("a-nota.xml", &blocker).unwrap();

    for _ in 0..3 {
      let report = watcher.scan_once().await.unwrap();
      assert_eq!(report.retained, 1);
      assert!(inbox.join("a-nota.xml").exists());
    }
    assert_eq!(names(&root.path().join("error")), vec!["b-broken.xml"]);
    assert_eq!(store.list_jobs(10).await.unwrap().len(), 2);

    std::fs::remove_file(&blocker).unwrap();
    let report = watcher.scan_once().await.unwrap();
    assert_eq!(report, ScanReport { processed: 1, failed: 0, retained: 0 });
    assert_eq!(names(&processed), vec!["a-nota.xml"]);
    assert!(names(&inbox).is_empty());

    let counts = store.job_counts().await.unwrap();
    assert_eq!(counts.stored, 1);
    assert_eq!(counts.duplicate, 0);
    assert_eq!(counts.failed, 1);
  }

  #[tokio::test]
  async fn run_stops_on_shutdown() {
    let root = TempDir::new().unwrap();
    let (watcher, store) = watcher(&root).await;
    let inbox = root.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();
    std::fs::write(inbox.join("nota.xml"), NFE).unwrap();

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(watcher.run(rx));

    for _ in 0..100 {
      if store.job_counts().await.unwrap().stored == 1 {
        break;
      }
      tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
      .await
      .unwrap()
      .unwrap();

    assert_eq!(store.job_counts().await.unwrap().stored, 1);
    assert_eq!(names(&root.path().join("processed")), vec!["nota.xml"]);
  }
}
