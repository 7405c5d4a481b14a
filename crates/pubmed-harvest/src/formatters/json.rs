//! JSON output formatting.

use serde_json::{Value, json};

use crate::models::{PaperRecord, ProcessingStatus};
use crate::pipeline::BatchResult;

/// Create a compact paper representation for JSON output.
///
/// Optional fields are omitted when unknown.
#[must_use]
pub fn compact_paper(paper: &PaperRecord) -> Value {
    let mut obj = json!({
        "pmid": paper.pmid,
        "title": paper.title_or_default(),
        "status": paper.status.label(),
        "journal_tier": paper.journal_tier,
        "study_type": paper.study_type,
    });

    match &paper.status {
        ProcessingStatus::Rejected { reason } => obj["reason"] = json!(reason),
        ProcessingStatus::Failed { stage, kind, message } => {
            obj["failure"] = json!({ "stage": stage, "kind": kind, "message": message });
        }
        _ => {}
    }

    if !paper.authors.is_empty() {
        obj["authors"] = json!(paper.authors.iter().map(|a| a.display_name()).collect::<Vec<_>>());
    }
    if let Some(journal) = paper.journal_name() {
        obj["journal"] = json!(journal);
    }
    if let Some(date) = paper.publication_date {
        obj["publication_date"] = json!(date);
    }
    if let Some(doi) = &paper.doi {
        obj["doi"] = json!(doi);
    }
    if let Some(pmcid) = &paper.pmcid {
        obj["pmcid"] = json!(pmcid);
    }
    if let Some(citations) = paper.citation_count {
        obj["citations"] = json!(citations);
    }
    if let Some(path) = &paper.pdf_path {
        obj["pdf_path"] = json!(path);
    }
    if let Some(path) = &paper.markdown_path {
        obj["markdown_path"] = json!(path);
    }

    obj
}

/// Batch summary plus compact papers.
#[must_use]
pub fn compact_batch(batch: &BatchResult) -> Value {
    json!({
        "run_id": batch.run_id,
        "query": batch.query,
        "total_results": batch.total_results,
        "cancelled": batch.cancelled,
        "stats": batch.stats,
        "papers": batch.papers.iter().map(compact_paper).collect::<Vec<_>>(),
    })
}
