//! Batch output and run control.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::models::{FailureKind, PaperRecord, ProcessingStatus};

/// Outcome of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    /// Correlates log lines for this run.
    pub run_id: String,
    /// Query as submitted.
    pub query: String,
    /// Matches upstream, before `max_results`.
    pub total_results: u64,
    /// Records in candidate order.
    pub papers: Vec<PaperRecord>,
    /// Counts over every candidate, before any output filtering.
    pub stats: BatchStats,
    /// True when the run was cancelled or hit its deadline.
    pub cancelled: bool,
}

impl BatchResult {
    /// Records that were accepted and finished every requested stage.
    pub fn accepted(&self) -> impl Iterator<Item = &PaperRecord> {
        self.papers.iter().filter(|p| p.is_done())
    }

    /// Record for `pmid`, if it is in the output.
    #[must_use]
    pub fn get(&self, pmid: &str) -> Option<&PaperRecord> {
        self.papers.iter().find(|p| p.pmid == pmid)
    }
}

/// Per-status tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Distinct candidates resolved by the search.
    pub candidates: usize,
    /// Reached `Done`.
    pub done: usize,
    /// Rejected by the filter.
    pub rejected: usize,
    /// Failed in some stage (including cancelled).
    pub failed: usize,
    /// Served from the dedup index without network work.
    pub reused: usize,
    /// Not started because the run was cancelled.
    pub cancelled: usize,
}

impl BatchStats {
    pub(crate) fn tally(records: &[PaperRecord], reused: usize) -> Self {
        let mut stats = Self { candidates: records.len(), reused, ..Self::default() };
        for record in records {
            match &record.status {
                ProcessingStatus::Done => stats.done += 1,
                ProcessingStatus::Rejected { .. } => stats.rejected += 1,
                ProcessingStatus::Failed { kind, .. } => {
                    stats.failed += 1;
                    if *kind == FailureKind::Cancelled {
                        stats.cancelled += 1;
                    }
                }
                _ => {}
            }
        }
        stats
    }
}

/// Cooperative cancellation for a running batch.
///
/// Cancelling stops workers from starting new papers; papers already in
/// flight run to completion.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// A handle that has not fired.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Receiver that observes the flag.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Optional limits on a batch run.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    /// External cancellation.
    pub cancel: Option<CancelHandle>,
    /// Stop starting new papers after this long.
    pub deadline: Option<Duration>,
}

impl RunControl {
    /// Cancel through `handle`.
    #[must_use]
    pub fn with_cancel(mut self, handle: CancelHandle) -> Self {
        self.cancel = Some(handle);
        self
    }

    /// Stop launching work after `deadline`.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}
