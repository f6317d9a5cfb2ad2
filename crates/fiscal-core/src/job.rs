//! Ingestion job records.
//!
//! Every file handed to the pipeline gets a job. The job is persisted when
//! it is received and again after every stage, so its status survives a
//! crash between stages.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
  Received,
  Parsed,
  Classified,
  Stored,
  Failed,
  /// Byte-identical to a file already stored; see `duplicate_of`.
  Duplicate,
}

impl JobStatus {
  pub const ALL: [Self; 6] = [
    Self::Received,
    Self::Parsed,
    Self::Classified,
    Self::Stored,
    Self::Failed,
    Self::Duplicate,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Received => "received",
      Self::Parsed => "parsed",
      Self::Classified => "classified",
      Self::Stored => "stored",
      Self::Failed => "failed",
      Self::Duplicate => "duplicate",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|status| status.as_str() == s)
      .ok_or_else(|| Error::UnknownDiscriminant {
        kind:  "job status",
        value: s.to_owned(),
      })
  }

  /// No further transitions happen from a terminal status.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Stored | Self::Failed | Self::Duplicate)
  }
}

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  Parse,
  Classify,
  Store,
}

impl Stage {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Parse => "parse",
      Self::Classify => "classify",
      Self::Store => "store",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "parse" => Ok(Self::Parse),
      "classify" => Ok(Self::Classify),
      "store" => Ok(Self::Store),
      other => Err(Error::UnknownDiscriminant {
        kind:  "stage",
        value: other.to_owned(),
      }),
    }
  }

  /// Status a job reaches once this stage succeeds.
  pub fn completed_status(self) -> JobStatus {
    match self {
      Self::Parse => JobStatus::Parsed,
      Self::Classify => JobStatus::Classified,
      Self::Store => JobStatus::Stored,
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// What the parse stage found in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
  Nfe,
  Nfse,
  NfeEvent,
}

impl PayloadKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Nfe => "nfe",
      Self::Nfse => "nfse",
      Self::NfeEvent => "nfe_event",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "nfe" => Ok(Self::Nfe),
      "nfse" => Ok(Self::Nfse),
      "nfe_event" => Ok(Self::NfeEvent),
      other => Err(Error::UnknownDiscriminant {
        kind:  "payload kind",
        value: other.to_owned(),
      }),
    }
  }
}

/// Input for a new job.
#[derive(Debug, Clone)]
pub struct NewIngestJob {
  pub file_name: String,
  /// Hex SHA-256 of the file bytes.
  pub digest:    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestJob {
  pub job_id:       Uuid,
  pub file_name:    String,
  pub digest:       String,
  pub status:       JobStatus,
  pub failed_stage: Option<Stage>,
  pub error:        Option<String>,
  pub payload_kind: Option<PayloadKind>,
  /// NF-e key or NFS-e id once known.
  pub document_id:  Option<String>,
  /// The stored job this one duplicates.
  pub duplicate_of: Option<Uuid>,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

impl IngestJob {
  pub fn new(input: NewIngestJob) -> Self {
    let now = Utc::now();
    Self {
      job_id:       Uuid::new_v4(),
      file_name:    input.file_name,
      digest:       input.digest,
      status:       JobStatus::Received,
      failed_stage: None,
      error:        None,
      payload_kind: None,
      document_id:  None,
      duplicate_of: None,
      created_at:   now,
      updated_at:   now,
    }
  }

  pub fn advance(&mut self, stage: Stage) {
    self.status = stage.completed_status();
    self.updated_at = Utc::now();
  }

  pub fn fail(&mut self, stage: Stage, error: impl fmt::Display) {
    self.status = JobStatus::Failed;
    self.failed_stage = Some(stage);
    self.error = Some(error.to_string());
    self.updated_at = Utc::now();
  }

  pub fn mark_duplicate(&mut self, original: Uuid) {
    self.status = JobStatus::Duplicate;
    self.duplicate_of = Some(original);
    self.updated_at = Utc::now();
  }
}

/// Number of jobs per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
  pub received:   u64,
  pub parsed:     u64,
  pub classified: u64,
  pub stored:     u64,
  pub failed:     u64,
  pub duplicate:  u64,
}

impl JobCounts {
  pub fn add(&mut self, status: JobStatus, n: u64) {
    let slot = match status {
      JobStatus::Received => &mut self.received,
      JobStatus::Parsed => &mut self.parsed,
      JobStatus::Classified => &mut self.classified,
      JobStatus::Stored => &mut self.stored,
      JobStatus::Failed => &mut self.failed,
      JobStatus::Duplicate => &mut self.duplicate,
    };
    *slot += n;
  }

  pub fn total(&self) -> u64 {
    self.received + self.parsed + self.classified + self.stored + self.failed + self.duplicate
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn job() -> IngestJob {
    IngestJob::new(NewIngestJob {
      file_name: "nota.xml".into(),
      digest:    "ab".repeat(32),
    })
  }

  #[test]
  fn stages_advance_status() {
    let mut job = job();
    assert_eq!(job.status, JobStatus::Received);
    job.advance(Stage::Parse);
    job.advance(Stage::Classify);
    assert_eq!(job.status, JobStatus::Classified);
    job.advance(Stage::Store);
    assert!(job.status.is_terminal());
  }

  #[test]
  fn failure_records_stage_and_message() {
    let mut job = job();
    job.fail(Stage::Store, "duplicate document");
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failed_stage, Some(Stage::Store));
    assert_eq!(job.error.as_deref(), Some("duplicate document"));
  }

  #[test]
  fn status_text_round_trips() {
    for status in JobStatus::ALL {
      assert_eq!(JobStatus::parse(status.as_str()).unwrap(), status);
    }
    assert!(JobStatus::parse("pending").is_err());
  }

  #[test]
  fn counts_total_every_status() {
    let mut counts = JobCounts::default();
    counts.add(JobStatus::Stored, 3);
    counts.add(JobStatus::Failed, 1);
    assert_eq!(counts.total(), 4);
    assert_eq!(counts.stored, 3);
  }
}
