//! Retrieval, filtering and enrichment orchestration.
//!
//! A batch resolves candidate PMIDs with one search call, then hands each
//! candidate to a bounded pool of workers. Workers pull from a shared job
//! queue and report `(position, record)` on a result channel, so output order
//! follows the search regardless of completion order.
//!
//! Only the search call and configuration can fail a batch. Everything that
//! goes wrong for one paper is recorded on that paper's record.

mod batch;
mod stages;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tracing::Instrument;

pub use batch::{BatchResult, BatchStats, CancelHandle, RunControl};

use crate::classify::{PaperClassifier, TableClassifier};
use crate::client::PubMedClient;
use crate::config::Config;
use crate::convert::{MarkdownConverter, PdfTextConverter};
use crate::error::{ClientError, PipelineError, PipelineResult};
use crate::fulltext::{HttpPdfFetcher, PdfFetcher};
use crate::models::{FailureKind, PaperRecord, SearchCriteria, Stage};
use crate::store::{ArtifactStore, DedupIndex, SharedStorage};

/// Enrichment flags for single-identifier lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Fetch citation counts.
    pub retrieve_citations: bool,
    /// Download the full-text PDF.
    pub download_pdf: bool,
    /// Convert the PDF to markdown (implies the download).
    pub convert_to_markdown: bool,
}

impl FetchOptions {
    fn criteria(self, id: &str) -> SearchCriteria {
        SearchCriteria {
            retrieve_citations: self.retrieve_citations,
            download_pdf: self.download_pdf,
            convert_to_markdown: self.convert_to_markdown,
            ..SearchCriteria::new(id)
        }
    }
}

/// The harvesting pipeline.
///
/// Cheap to clone; clones share the client throttle. Every pipeline in the
/// process on the same index path shares one dedup index and one set of
/// per-identifier locks, so overlapping runs never enrich the same paper
/// twice at once.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<Config>,
    client: PubMedClient,
    classifier: Arc<dyn PaperClassifier>,
    fetcher: Arc<dyn PdfFetcher>,
    converter: Arc<dyn MarkdownConverter>,
    store: ArtifactStore,
    storage: Arc<SharedStorage>,
}

impl Pipeline {
    /// Build a pipeline with the default collaborators.
    ///
    /// Validates the configuration and loads the dedup index before any
    /// network work.
    pub async fn new(config: Config) -> PipelineResult<Self> {
        config.validate()?;
        let client = PubMedClient::new(&config)?;
        let fetcher = HttpPdfFetcher::new(&config)?;
        let storage = SharedStorage::open(&config.index_path).await?;

        Ok(Self {
            classifier: Arc::new(TableClassifier::new(&config.journal_tiers)),
            fetcher: Arc::new(fetcher),
            converter: Arc::new(PdfTextConverter),
            store: ArtifactStore::from_config(&config),
            storage,
            client,
            config: Arc::new(config),
        })
    }

    /// Replace the PDF fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn PdfFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replace the markdown converter.
    #[must_use]
    pub fn with_converter(mut self, converter: Arc<dyn MarkdownConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Replace the classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn PaperClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Underlying API client.
    #[must_use]
    pub const fn client(&self) -> &PubMedClient {
        &self.client
    }

    /// Artifact store.
    #[must_use]
    pub const fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Dedup index.
    #[must_use]
    pub fn index(&self) -> &DedupIndex {
        self.storage.index()
    }

    /// Run a batch to completion.
    pub async fn run(&self, criteria: &SearchCriteria) -> PipelineResult<BatchResult> {
        self.run_with(criteria, RunControl::default()).await
    }

    /// Run a batch under cancellation and deadline control.
    pub async fn run_with(
        &self,
        criteria: &SearchCriteria,
        control: RunControl,
    ) -> PipelineResult<BatchResult> {
        criteria.validate()?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("batch", run_id = %run_id, query = %criteria.query);
        self.run_batch(run_id, criteria, control).instrument(span).await
    }

    async fn run_batch(
        &self,
        run_id: String,
        criteria: &SearchCriteria,
        control: RunControl,
    ) -> PipelineResult<BatchResult> {
        let hits = self
            .client
            .search(&criteria.query, criteria.max_results)
            .await
            .map_err(PipelineError::Search)?;

        let mut seen = HashSet::with_capacity(hits.pmids.len());
        let mut candidates: Vec<String> =
            hits.pmids.into_iter().filter(|pmid| seen.insert(pmid.clone())).collect();
        candidates.truncate(criteria.max_results as usize);
        tracing::info!(candidates = candidates.len(), total = hits.total, "search resolved");

        let deadline = control.deadline.map(|d| Instant::now() + d);
        let (slots, reused) = self.dispatch(&candidates, criteria, control.cancel, deadline).await;

        let cancelled = slots.iter().any(Option::is_none);
        let records: Vec<PaperRecord> = slots
            .into_iter()
            .zip(&candidates)
            .map(|(slot, pmid)| slot.unwrap_or_else(|| not_started(pmid)))
            .collect();

        let stats = BatchStats::tally(&records, reused);
        tracing::info!(
            done = stats.done,
            rejected = stats.rejected,
            failed = stats.failed,
            reused = stats.reused,
            cancelled,
            "batch finished"
        );

        let papers =
            if criteria.accepted_only { records.into_iter().filter(PaperRecord::is_done).collect() } else { records };

        Ok(BatchResult {
            run_id,
            query: criteria.query.clone(),
            total_results: hits.total,
            papers,
            stats,
            cancelled,
        })
    }

    /// Fan candidates out to the worker pool and collect results by position.
    ///
    /// Positions left `None` were never started.
    async fn dispatch(
        &self,
        candidates: &[String],
        criteria: &SearchCriteria,
        cancel: Option<CancelHandle>,
        deadline: Option<Instant>,
    ) -> (Vec<Option<PaperRecord>>, usize) {
        let (job_tx, job_rx) = mpsc::unbounded_channel::<(usize, String)>();
        for job in candidates.iter().cloned().enumerate() {
            // receiver is alive until the workers finish
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let jobs = Arc::new(Mutex::new(job_rx));
        let criteria = Arc::new(criteria.clone());
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(usize, PaperRecord, bool)>();

        let workers = self.config.concurrency.min(candidates.len());
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let pipeline = self.clone();
            let jobs = Arc::clone(&jobs);
            let criteria = Arc::clone(&criteria);
            let results = result_tx.clone();
            let cancel = cancel.clone();

            let task = async move {
                loop {
                    if cancel.as_ref().is_some_and(CancelHandle::is_cancelled)
                        || deadline.is_some_and(|d| Instant::now() >= d)
                    {
                        tracing::info!(worker, "cancelled, not starting further papers");
                        break;
                    }
                    let Some((position, pmid)) = jobs.lock().await.recv().await else { break };

                    let span = tracing::info_span!("paper", pmid = %pmid);
                    let (record, reused) = async {
                        match pipeline.process_one(&pmid, &criteria).await {
                            Ok(outcome) => outcome,
                            Err(e) => (metadata_failed(&pmid, &e), false),
                        }
                    }
                    .instrument(span)
                    .await;

                    if results.send((position, record, reused)).is_err() {
                        break;
                    }
                }
            };
            handles.push(tokio::spawn(task.in_current_span()));
        }
        drop(result_tx);

        let mut slots: Vec<Option<PaperRecord>> = vec![None; candidates.len()];
        let mut reused_count = 0;
        while let Some((position, record, reused)) = result_rx.recv().await {
            reused_count += usize::from(reused);
            if let Some(slot) = slots.get_mut(position) {
                *slot = Some(record);
            }
        }

        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "worker task ended abnormally");
            }
        }

        (slots, reused_count)
    }

    /// Fetch one paper by PMID, running the requested enrichment stages.
    ///
    /// # Errors
    ///
    /// Metadata lookup failures are returned; `NotFound` when the PMID is
    /// unknown. Enrichment failures are recorded on the returned record.
    pub async fn fetch_by_pmid(&self, pmid: &str, options: FetchOptions) -> PipelineResult<PaperRecord> {
        let pmid = pmid.trim();
        if pmid.is_empty() || !pmid.chars().all(|c| c.is_ascii_digit()) {
            return Err(PipelineError::invalid_criteria("pmid", format!("'{pmid}' is not a PMID")));
        }
        let criteria = options.criteria(pmid);
        let span = tracing::info_span!("paper", pmid = %pmid);
        let (record, _) =
            self.process_one(pmid, &criteria).instrument(span).await.map_err(PipelineError::Lookup)?;
        Ok(record)
    }

    /// Fetch one paper by DOI, running the requested enrichment stages.
    ///
    /// # Errors
    ///
    /// As [`fetch_by_pmid`](Self::fetch_by_pmid); `NotFound` when no PubMed
    /// record carries the DOI.
    pub async fn fetch_by_doi(&self, doi: &str, options: FetchOptions) -> PipelineResult<PaperRecord> {
        let doi = doi.trim();
        if doi.is_empty() {
            return Err(PipelineError::invalid_criteria("doi", "must not be empty"));
        }
        let pmid = self.client.pmid_for_doi(doi).await.map_err(PipelineError::Lookup)?;
        self.fetch_by_pmid(&pmid, options).await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("client", &self.client)
            .field("store", &self.store)
            .field("concurrency", &self.config.concurrency)
            .finish()
    }
}

fn metadata_failed(pmid: &str, err: &ClientError) -> PaperRecord {
    tracing::warn!(pmid, kind = %err.kind(), error = %err, "metadata lookup failed");
    let mut record = PaperRecord::discovered(pmid);
    record.fail(Stage::Metadata, err.kind(), err.to_string());
    record
}

fn not_started(pmid: &str) -> PaperRecord {
    let mut record = PaperRecord::discovered(pmid);
    record.fail(Stage::Metadata, FailureKind::Cancelled, "batch cancelled before this paper started");
    record
}
