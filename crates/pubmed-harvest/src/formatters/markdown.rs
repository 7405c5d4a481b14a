//! Markdown output formatting.

use std::borrow::Cow;

use crate::models::{PaperRecord, ProcessingStatus};
use crate::pipeline::BatchResult;

const ABSTRACT_PREVIEW_CHARS: usize = 300;

/// Format a batch result as Markdown: summary counts, then one section per paper.
#[must_use]
pub fn format_batch_markdown(batch: &BatchResult) -> String {
    let stats = &batch.stats;
    let mut output = format!("# PubMed: {}\n\n", batch.query);

    output.push_str(&format!(
        "**Matches**: {} | **Candidates**: {} | **Done**: {} | **Rejected**: {} | **Failed**: {} | **Reused**: {}\n\n",
        batch.total_results, stats.candidates, stats.done, stats.rejected, stats.failed, stats.reused
    ));
    if batch.cancelled {
        output.push_str(&format!(
            "> Run cancelled; {} paper(s) were not started.\n\n",
            stats.cancelled
        ));
    }
    output.push_str(&format!("Run `{}`\n\n", batch.run_id));

    if batch.papers.is_empty() {
        output.push_str("No papers found.\n");
        return output;
    }

    for (i, paper) in batch.papers.iter().enumerate() {
        output.push_str(&format_paper_markdown(paper, i + 1));
        output.push_str("\n---\n\n");
    }

    output
}

/// Format a single paper record as Markdown.
#[must_use]
pub fn format_paper_markdown(paper: &PaperRecord, index: usize) -> String {
    let mut output = String::new();

    if index > 0 {
        output.push_str(&format!("## {}. {}\n\n", index, paper.title_or_default()));
    } else {
        output.push_str(&format!("## {}\n\n", paper.title_or_default()));
    }

    output.push_str(&format!("**Status**: {}\n\n", status_line(&paper.status)));

    if !paper.authors.is_empty() {
        output.push_str(&format!("**Authors**: {}\n\n", paper.author_names()));
    }

    let mut meta = Vec::new();
    if let Some(journal) = paper.journal_name() {
        meta.push(format!("**Journal**: {journal}"));
    }
    if let Some(date) = paper.publication_date {
        meta.push(format!("**Published**: {date}"));
    }
    meta.push(format!("**Tier**: {}", paper.journal_tier));
    meta.push(format!("**Study type**: {}", paper.study_type));
    if let Some(citations) = paper.citation_count {
        meta.push(format!("**Citations**: {citations}"));
    }
    output.push_str(&format!("{}\n\n", meta.join(" | ")));

    let mut ids = vec![format!("[PMID {0}](https://pubmed.ncbi.nlm.nih.gov/{0}/)", paper.pmid)];
    if let Some(doi) = &paper.doi {
        ids.push(format!("[DOI](https://doi.org/{doi})"));
    }
    if let Some(pmcid) = &paper.pmcid {
        ids.push(pmcid.clone());
    }
    output.push_str(&format!("**Links**: {}\n\n", ids.join(" | ")));

    if let Some(path) = &paper.pdf_path {
        output.push_str(&format!("**PDF**: `{}`\n\n", path.display()));
    }
    if let Some(path) = &paper.markdown_path {
        output.push_str(&format!("**Markdown**: `{}`\n\n", path.display()));
    }

    if let Some(abs) = &paper.r#abstract {
        let truncated: Cow<'_, str> = if abs.chars().count() > ABSTRACT_PREVIEW_CHARS {
            Cow::Owned(format!("{}...", abs.chars().take(ABSTRACT_PREVIEW_CHARS).collect::<String>()))
        } else {
            Cow::Borrowed(abs)
        };
        output.push_str(&format!("**Abstract**: {truncated}\n"));
    }

    output
}

fn status_line(status: &ProcessingStatus) -> String {
    match status {
        ProcessingStatus::Rejected { reason } => format!("rejected ({reason})"),
        ProcessingStatus::Failed { stage, kind, message } => {
            format!("failed in {stage} ({kind}): {message}")
        }
        other => other.label(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureKind, Journal, Stage};

    #[test]
    fn test_format_paper_markdown() {
        let mut paper = PaperRecord::discovered("31978945");
        paper.title = "A Novel Coronavirus".to_string();
        paper.journal = Some(Journal { name: "The Lancet".into(), ..Journal::default() });
        paper.citation_count = Some(1200);
        paper.status = ProcessingStatus::Done;

        let md = format_paper_markdown(&paper, 1);
        assert!(md.contains("## 1. A Novel Coronavirus"));
        assert!(md.contains("**Status**: done"));
        assert!(md.contains("**Journal**: The Lancet"));
        assert!(md.contains("**Citations**: 1200"));
        assert!(md.contains("pubmed.ncbi.nlm.nih.gov/31978945/"));
    }

    #[test]
    fn test_failed_status_line() {
        let mut paper = PaperRecord::discovered("1");
        paper.fail(Stage::Pdf, FailureKind::Network, "connection refused");
        let md = format_paper_markdown(&paper, 0);
        assert!(md.contains("failed in pdf (network): connection refused"));
    }

    #[test]
    fn test_abstract_preview_is_char_safe() {
        let mut paper = PaperRecord::discovered("1");
        paper.r#abstract = Some("é".repeat(400));
        let md = format_paper_markdown(&paper, 1);
        assert!(md.contains("..."));
    }
}
