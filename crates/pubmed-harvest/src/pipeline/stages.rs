//! Per-paper state machine.
//!
//! metadata -> filter -> citations? -> pdf? -> markdown? -> done. Every
//! stage failure is recorded on the record; nothing here returns early with
//! an error except the metadata lookup, which single-identifier callers need
//! to surface.

use crate::error::{ClientError, StoreError};
use crate::filter::{self, FilterDecision};
use crate::fulltext::{is_fetchable, pmc_pdf_url};
use crate::models::{FailureKind, PaperRecord, ProcessingStatus, SearchCriteria, Stage};
use crate::store::{ArtifactKind, sha256_hex};

use super::Pipeline;

/// Where a paper starts.
pub(super) enum Begin {
    /// Served from the dedup index; no further work.
    Reused(PaperRecord),
    /// Metadata in hand; run the remaining stages.
    Start(PaperRecord),
}

/// A stage failure, to be recorded on the record.
struct StageFailure {
    kind: FailureKind,
    message: String,
}

impl StageFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl From<StoreError> for StageFailure {
    fn from(err: StoreError) -> Self {
        Self::new(FailureKind::Storage, err.to_string())
    }
}

impl Pipeline {
    /// Process one identifier while holding its lock.
    ///
    /// Returns the final record and whether it came from the index.
    pub(super) async fn process_one(
        &self,
        pmid: &str,
        criteria: &SearchCriteria,
    ) -> Result<(PaperRecord, bool), ClientError> {
        let _guard = self.storage.locks().lock(pmid).await;

        match self.begin(pmid, criteria).await? {
            Begin::Reused(record) => {
                tracing::debug!(pmid, status = %record.status.label(), "reused indexed record");
                Ok((record, true))
            }
            Begin::Start(record) => Ok((self.run_stages(record, criteria).await, false)),
        }
    }

    /// Consult the index, falling back to a metadata fetch.
    async fn begin(&self, pmid: &str, criteria: &SearchCriteria) -> Result<Begin, ClientError> {
        if let Some(stored) = self.storage.index().get(pmid).await {
            return Ok(self.reuse(stored, criteria).await);
        }
        self.client.fetch_paper(pmid).await.map(Begin::Start)
    }

    /// Decide whether a stored record covers every requested stage.
    async fn reuse(&self, mut stored: PaperRecord, criteria: &SearchCriteria) -> Begin {
        let pmid = stored.pmid.clone();
        stored.pdf_path = self.store.read_path(&pmid, ArtifactKind::Pdf).await;
        stored.markdown_path = match stored.pdf_path {
            Some(_) => self.store.read_path(&pmid, ArtifactKind::Markdown).await,
            None => None,
        };
        if stored.pdf_path.is_none() {
            stored.pdf_sha256 = None;
        }
        self.classifier.classify(&mut stored);

        let complete = (!criteria.needs_citations() || stored.citation_count.is_some())
            && (!criteria.wants_pdf() || stored.pdf_path.is_some())
            && (!criteria.convert_to_markdown || stored.markdown_path.is_some());

        if !complete {
            tracing::debug!(pmid, "indexed record lacks requested stages, resuming");
            stored.status = ProcessingStatus::Discovered;
            return Begin::Start(stored);
        }

        match filter::matches(&stored, &criteria.filter) {
            FilterDecision::Accept => stored.status = ProcessingStatus::Done,
            FilterDecision::Reject(reason) => {
                stored.status = ProcessingStatus::MetadataFetched;
                stored.reject(reason);
            }
        }
        Begin::Reused(stored)
    }

    /// Run every stage after metadata. Never fails: failures land on the record.
    pub(super) async fn run_stages(
        &self,
        mut record: PaperRecord,
        criteria: &SearchCriteria,
    ) -> PaperRecord {
        record.status = ProcessingStatus::Discovered;
        record.advance(ProcessingStatus::MetadataFetched);
        self.classifier.classify(&mut record);

        if let FilterDecision::Reject(reason) = filter::matches_metadata(&record, &criteria.filter) {
            tracing::debug!(pmid = %record.pmid, %reason, "rejected on metadata");
            record.reject(reason);
            return record;
        }
        record.advance(ProcessingStatus::Accepted);

        if criteria.needs_citations() {
            if let Err(failure) = self.citations_stage(&mut record).await {
                return self.failed(record, Stage::Citations, failure);
            }
            record.advance(ProcessingStatus::CitationsFetched);

            if let FilterDecision::Reject(reason) = filter::check_citations(&record, &criteria.filter)
            {
                tracing::debug!(pmid = %record.pmid, %reason, "rejected on citations");
                record.reject(reason);
                return record;
            }
        }

        if criteria.wants_pdf() {
            if let Err(failure) = self.pdf_stage(&mut record).await {
                return self.failed(record, Stage::Pdf, failure);
            }
            record.advance(ProcessingStatus::PdfDownloaded);
        }

        if criteria.convert_to_markdown {
            if let Err(failure) = self.markdown_stage(&mut record).await {
                return self.failed(record, Stage::Markdown, failure);
            }
            record.advance(ProcessingStatus::MarkdownConverted);
        }

        record.advance(ProcessingStatus::Done);
        if let Err(e) = self.storage.index().mark_processed(&record).await {
            tracing::warn!(pmid = %record.pmid, error = %e, "failed to update dedup index");
        }
        record
    }

    fn failed(&self, mut record: PaperRecord, stage: Stage, failure: StageFailure) -> PaperRecord {
        tracing::warn!(
            pmid = %record.pmid,
            %stage,
            kind = %failure.kind,
            error = %failure.message,
            "paper failed"
        );
        record.fail(stage, failure.kind, failure.message);
        record
    }

    async fn citations_stage(&self, record: &mut PaperRecord) -> Result<(), StageFailure> {
        if record.citation_count.is_some() {
            return Ok(());
        }
        let info = self
            .client
            .fetch_citations(record)
            .await
            .map_err(|e| StageFailure::new(e.kind(), e.to_string()))?;

        record.citation_count = info.citation_count;
        record.influential_citation_count = info.influential_citation_count;
        if record.full_text_url.is_none() {
            record.full_text_url = info.pdf_url().map(str::to_string);
        }
        tracing::debug!(pmid = %record.pmid, citations = ?record.citation_count, "citations fetched");
        Ok(())
    }

    async fn pdf_stage(&self, record: &mut PaperRecord) -> Result<(), StageFailure> {
        let pmid = record.pmid.clone();

        if let Some(path) = self.store.read_path(&pmid, ArtifactKind::Pdf).await {
            if record.pdf_sha256.is_none() {
                record.pdf_sha256 =
                    self.store.read(&pmid, ArtifactKind::Pdf).await?.map(|b| sha256_hex(&b));
            }
            record.pdf_path = Some(path);
            tracing::debug!(pmid, "pdf artifact present, skipping download");
            return Ok(());
        }

        let url = self.full_text_location(record).await?;
        record.full_text_url = Some(url.clone());

        let bytes = self
            .fetcher
            .fetch(&url)
            .await
            .map_err(|e| StageFailure::new(e.kind(), e.to_string()))?;
        let stored = self.store.write(&pmid, ArtifactKind::Pdf, &bytes).await?;

        record.pdf_sha256 = Some(sha256_hex(&bytes));
        record.pdf_path = Some(stored.path);
        tracing::info!(pmid, bytes = bytes.len(), "pdf downloaded");
        Ok(())
    }

    /// PMC first, then any open-access location, looked up on demand.
    async fn full_text_location(&self, record: &mut PaperRecord) -> Result<String, StageFailure> {
        if let Some(url) = record.pmcid.as_deref().and_then(|id| pmc_pdf_url(&self.config.pmc_url, id))
        {
            return Ok(url);
        }

        if record.full_text_url.is_none() && record.citation_count.is_none() {
            match self.client.fetch_citations(record).await {
                Ok(info) => {
                    record.citation_count = info.citation_count;
                    record.influential_citation_count = info.influential_citation_count;
                    record.full_text_url = info.pdf_url().map(str::to_string);
                }
                Err(ClientError::NotFound { .. }) => {}
                Err(e) => return Err(StageFailure::new(e.kind(), e.to_string())),
            }
        }

        record
            .full_text_url
            .clone()
            .filter(|u| is_fetchable(u))
            .ok_or_else(|| StageFailure::new(FailureKind::NotFound, "no full-text location"))
    }

    async fn markdown_stage(&self, record: &mut PaperRecord) -> Result<(), StageFailure> {
        let pmid = record.pmid.clone();

        if let Some(path) = self.store.read_path(&pmid, ArtifactKind::Markdown).await {
            record.markdown_path = Some(path);
            tracing::debug!(pmid, "markdown artifact present, skipping conversion");
            return Ok(());
        }

        let pdf = self
            .store
            .read(&pmid, ArtifactKind::Pdf)
            .await?
            .ok_or_else(|| StageFailure::new(FailureKind::Storage, "pdf artifact missing"))?;

        let timeout = self.config.conversion_timeout;
        let markdown =
            match tokio::time::timeout(timeout, self.converter.convert(&pdf, record.title_or_default()))
                .await
            {
                Ok(Ok(markdown)) => markdown,
                Ok(Err(e)) => return Err(StageFailure::new(FailureKind::Conversion, e.to_string())),
                Err(_) => {
                    return Err(StageFailure::new(
                        FailureKind::Timeout,
                        format!("conversion exceeded {timeout:?}"),
                    ));
                }
            };

        let stored = self.store.write(&pmid, ArtifactKind::Markdown, markdown.as_bytes()).await?;
        record.markdown_path = Some(stored.path);
        tracing::info!(pmid, chars = markdown.len(), "markdown converted");
        Ok(())
    }
}
