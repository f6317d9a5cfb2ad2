//! The `Parse → Classify → Store` ingestion pipeline.

use std::sync::Arc;

use fiscal_core::{
  document::{NewNfeDocument, NewNfseDocument},
  job::{IngestJob, NewIngestJob, Stage},
  store::{FiscalStore, StoreError, StoreErrorKind},
};
use fiscal_xml::ParsedDocument;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
  classify::{Classifier, NoopClassifier},
  error::{PipelineError, Result, StageError},
};

/// What to do with a new file whose document is already stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReingestPolicy {
  /// Fail the store stage with a duplicate-document error.
  #[default]
  Reject,
  /// Overwrite the stored header and lines. Events are kept.
  Replace,
}

/// Hex SHA-256 of a file's bytes, used to recognise byte-identical uploads.
pub fn digest(bytes: &[u8]) -> String { hex::encode(Sha256::digest(bytes)) }

/// Runs files through the stages and keeps the job ledger current.
pub struct Pipeline<S> {
  store:      Arc<S>,
  classifier: Arc<dyn Classifier>,
  policy:     ReingestPolicy,
}

impl<S> Clone for Pipeline<S> {
  fn clone(&self) -> Self {
    Self {
      store:      Arc::clone(&self.store),
      classifier: Arc::clone(&self.classifier),
      policy:     self.policy,
    }
  }
}

impl<S: FiscalStore> Pipeline<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self {
      store,
      classifier: Arc::new(NoopClassifier),
      policy: ReingestPolicy::default(),
    }
  }

  pub fn with_classifier(mut self, classifier: impl Classifier + 'static) -> Self {
    self.classifier = Arc::new(classifier);
    self
  }

  pub fn with_policy(mut self, policy: ReingestPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn policy(&self) -> ReingestPolicy { self.policy }

  /// Ingest one file.
  ///
  /// Returns the job once it is `Stored`, or `Duplicate` when a stored job
  /// already has the same digest. A stage failure is persisted on the job
  /// before it is returned as [`PipelineError::StageFailure`].
  pub async fn ingest(&self, file_name: &str, xml: &[u8]) -> Result<IngestJob> {
    let digest = digest(xml);
    let mut job = IngestJob::new(NewIngestJob {
      file_name: file_name.to_owned(),
      digest:    digest.clone(),
    });

    let original = self
      .store
      .find_job_by_digest(digest)
      .await
      .map_err(PipelineError::ledger)?;
    if let Some(original) = original {
      job.mark_duplicate(original.job_id);
      job.payload_kind = original.payload_kind;
      job.document_id = original.document_id;
      tracing::info!(
        job_id = %job.job_id,
        original = %original.job_id,
        file = file_name,
        "skipping byte-identical file"
      );
      return self.store.create_job(job).await.map_err(PipelineError::ledger);
    }

    let mut job = self.store.create_job(job).await.map_err(PipelineError::ledger)?;
    tracing::debug!(job_id = %job.job_id, file = file_name, "job received");

    let parsed = match parse(xml) {
      Ok(parsed) => parsed,
      Err(error) => return Err(self.fail(job, Stage::Parse, error).await),
    };
    job.payload_kind = Some(parsed.kind());
    job.document_id = Some(parsed.document_id());
    job = self.checkpoint(job, Stage::Parse).await?;

    let parsed = match parsed {
      ParsedDocument::Event(ev) => ParsedDocument::Event(ev),
      doc => {
        let doc = self.classify(doc);
        job = self.checkpoint(job, Stage::Classify).await?;
        doc
      }
    };

    if let Err(error) = self.store_document(parsed).await {
      return Err(self.fail(job, Stage::Store, error).await);
    }
    let job = self.checkpoint(job, Stage::Store).await?;

    tracing::info!(
      job_id = %job.job_id,
      file = file_name,
      document = job.document_id.as_deref().unwrap_or_default(),
      "file ingested"
    );
    Ok(job)
  }

  async fn checkpoint(&self, mut job: IngestJob, stage: Stage) -> Result<IngestJob> {
    job.advance(stage);
    self.store.update_job(job).await.map_err(PipelineError::ledger)
  }

  async fn fail(&self, mut job: IngestJob, stage: Stage, error: StageError) -> PipelineError {
    tracing::warn!(job_id = %job.job_id, %stage, %error, "ingestion failed");
    job.fail(stage, &error);
    match self.store.update_job(job).await {
      Ok(job) => PipelineError::StageFailure { stage, error, job: Box::new(job) },
      Err(err) => PipelineError::ledger(err),
    }
  }

  // ─── Stages ────────────────────────────────────────────────────────────────

  fn classify(&self, doc: ParsedDocument) -> ParsedDocument {
    let mut nfe = match doc {
      ParsedDocument::Nfe(nfe) => nfe,
      other => return other,
    };
    let mut assigned = 0usize;
    for item in nfe.items.iter_mut().filter(|i| !i.product.is_classified()) {
      if let Some(class) = self.classifier.classify(&item.product) {
        item.product.apply(class);
        assigned += 1;
      }
    }
    tracing::debug!(key = %nfe.key, assigned, items = nfe.items.len(), "products classified");
    ParsedDocument::Nfe(nfe)
  }

  async fn store_document(&self, doc: ParsedDocument) -> Result<(), StageError> {
    match doc {
      ParsedDocument::Nfe(doc) => self.store_nfe(doc).await,
      ParsedDocument::Nfse(doc) => self.store_nfse(doc).await,
      ParsedDocument::Event(ev) => {
        let recorded = self.store.record_event(ev).await.map_err(StageError::store)?;
        tracing::info!(
          key = %recorded.event.key,
          event_type = recorded.event.event_type.code(),
          sequence = recorded.event.sequence,
          "event recorded"
        );
        Ok(())
      }
    }
  }

  async fn store_nfe(&self, doc: NewNfeDocument) -> Result<(), StageError> {
    let emitter = doc.emitter.tax_id.digits();
    if !doc.key.issuer_tax_id().ends_with(emitter) {
      tracing::warn!(key = %doc.key, emitter, "NF-e key names a different issuer than emit");
    }

    let key = doc.key.clone();
    let stored = match self.policy {
      ReingestPolicy::Reject => self.store.insert_nfe(doc).await,
      ReingestPolicy::Replace => match self.store.insert_nfe(doc.clone()).await {
        Err(err) if err.kind() == StoreErrorKind::Duplicate => {
          tracing::info!(%key, "replacing stored NF-e");
          self.store.replace_nfe(doc).await
        }
        other => other,
      },
    }
    .map_err(StageError::store)?;

    tracing::debug!(%key, items = stored.items.len(), "NF-e stored");
    Ok(())
  }

  async fn store_nfse(&self, doc: NewNfseDocument) -> Result<(), StageError> {
    if let Some(issuer) = doc.id.issuer_tax_id()
      && issuer != doc.emitter.tax_id
    {
      tracing::warn!(
        id = %doc.id,
        emitter = doc.emitter.tax_id.digits(),
        "NFS-e id names a different issuer than emit"
      );
    }

    let id = doc.id.clone();
    let stored = match self.policy {
      ReingestPolicy::Reject => self.store.insert_nfse(doc).await,
      ReingestPolicy::Replace => match self.store.insert_nfse(doc.clone()).await {
        Err(err) if err.kind() == StoreErrorKind::Duplicate => {
          tracing::info!(%id, "replacing stored NFS-e");
          self.store.replace_nfse(doc).await
        }
        other => other,
      },
    }
    .map_err(StageError::store)?;

    tracing::debug!(%id, lines = stored.services.len(), "NFS-e stored");
    Ok(())
  }
}

/// Decode and validate. Validation failures count as parse failures.
fn parse(xml: &[u8]) -> Result<ParsedDocument, StageError> {
  let parsed = fiscal_xml::parse(xml)?;
  match &parsed {
    ParsedDocument::Nfe(doc) => doc.validate().map_err(fiscal_xml::Error::from)?,
    ParsedDocument::Nfse(doc) => doc.validate().map_err(fiscal_xml::Error::from)?,
    ParsedDocument::Event(ev) => ev.validate().map_err(fiscal_xml::Error::from)?,
  }
  Ok(parsed)
}
