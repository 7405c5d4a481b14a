//! Paper record and its processing state machine.

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{FailureKind, JournalTier, Stage, StudyType};

/// A paper as it moves through the pipeline.
///
/// Created when metadata is first resolved and mutated in place by each
/// later stage. Never deleted; a failing stage marks it [`ProcessingStatus::Failed`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// PubMed id (primary identifier).
    pub pmid: String,

    /// Digital object identifier (secondary identifier).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    /// PubMed Central id, e.g. `PMC1234567`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmcid: Option<String>,

    /// Article title.
    #[serde(default)]
    pub title: String,

    /// Abstract, labelled sections flattened as `LABEL: text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#abstract: Option<String>,

    /// Authors in byline order.
    #[serde(default)]
    pub authors: Vec<Author>,

    /// Publishing journal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<Journal>,

    /// Derived journal tier.
    #[serde(default)]
    pub journal_tier: JournalTier,

    /// Publication date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<NaiveDate>,

    /// Raw PubMed publication types, used for classification.
    #[serde(default)]
    pub publication_types: Vec<String>,

    /// Derived study type.
    #[serde(default)]
    pub study_type: StudyType,

    /// Author keywords.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// MeSH descriptor names.
    #[serde(default)]
    pub mesh_terms: Vec<String>,

    /// Citation count, absent until the citation stage runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u32>,

    /// Influential citation count, when the citation source reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub influential_citation_count: Option<u32>,

    /// Resolved full-text PDF location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text_url: Option<String>,

    /// PDF artifact path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<PathBuf>,

    /// SHA-256 of the PDF artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_sha256: Option<String>,

    /// Markdown artifact path. Only ever set alongside `pdf_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown_path: Option<PathBuf>,

    /// Processing state.
    #[serde(default)]
    pub status: ProcessingStatus,
}

impl PaperRecord {
    /// A freshly discovered identifier with no metadata yet.
    #[must_use]
    pub fn discovered(pmid: impl Into<String>) -> Self {
        Self { pmid: pmid.into(), ..Self::default() }
    }

    /// Journal name if known.
    #[must_use]
    pub fn journal_name(&self) -> Option<&str> {
        self.journal.as_ref().map(|j| j.name.as_str())
    }

    /// Title, falling back to "Untitled".
    #[must_use]
    pub fn title_or_default(&self) -> &str {
        if self.title.is_empty() { "Untitled" } else { &self.title }
    }

    /// Author display names as a comma-separated string.
    #[must_use]
    pub fn author_names(&self) -> String {
        self.authors.iter().map(Author::display_name).collect::<Vec<_>>().join(", ")
    }

    /// Move to `next` if the state machine allows it.
    ///
    /// Returns false (and leaves the record untouched) for an illegal move.
    pub fn advance(&mut self, next: ProcessingStatus) -> bool {
        if !self.status.can_advance_to(&next) {
            tracing::warn!(pmid = %self.pmid, from = ?self.status, to = ?next, "Ignoring illegal status transition");
            return false;
        }
        self.status = next;
        true
    }

    /// Mark the paper failed in `stage`.
    pub fn fail(&mut self, stage: Stage, kind: FailureKind, message: impl Into<String>) {
        self.advance(ProcessingStatus::Failed { stage, kind, message: message.into() });
    }

    /// Mark the paper rejected by the filter.
    ///
    /// Artifact paths are cleared: a rejected paper never carries artifacts.
    pub fn reject(&mut self, reason: impl Into<String>) {
        if self.advance(ProcessingStatus::Rejected { reason: reason.into() }) {
            self.pdf_path = None;
            self.pdf_sha256 = None;
            self.markdown_path = None;
        }
    }

    /// Accepted and every requested stage finished.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self.status, ProcessingStatus::Done)
    }

    /// Rejected by the filter.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self.status, ProcessingStatus::Rejected { .. })
    }

    /// Failed in some stage.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.status, ProcessingStatus::Failed { .. })
    }
}

/// Per-paper state.
///
/// ```text
/// Discovered -> MetadataFetched -> Accepted -> CitationsFetched? -> PdfDownloaded?
///            -> MarkdownConverted? -> Done
/// ```
/// `Rejected`, `Done` and `Failed` are terminal; `Failed` is reachable from
/// every non-terminal state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Identifier known, nothing fetched.
    #[default]
    Discovered,
    /// Metadata resolved.
    MetadataFetched,
    /// Passed the metadata filter.
    Accepted,
    /// Failed the filter. Terminal.
    Rejected {
        /// First failed criterion.
        reason: String,
    },
    /// Citation count known.
    CitationsFetched,
    /// PDF artifact present.
    PdfDownloaded,
    /// Markdown artifact present.
    MarkdownConverted,
    /// Every requested stage finished. Terminal.
    Done,
    /// A stage failed. Terminal.
    Failed {
        /// Stage that failed.
        stage: Stage,
        /// Failure classification.
        kind: FailureKind,
        /// Human-readable detail.
        message: String,
    },
}

impl ProcessingStatus {
    /// Position in the forward order; terminal states share the top rank.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Discovered => 0,
            Self::MetadataFetched => 1,
            Self::Accepted => 2,
            Self::CitationsFetched => 3,
            Self::PdfDownloaded => 4,
            Self::MarkdownConverted => 5,
            Self::Rejected { .. } | Self::Done | Self::Failed { .. } => 6,
        }
    }

    /// True for `Rejected`, `Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Done | Self::Failed { .. })
    }

    /// Transitions are monotonic and nothing leaves a terminal state.
    #[must_use]
    pub const fn can_advance_to(&self, next: &Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed { .. } => true,
            Self::Rejected { .. } => {
                matches!(self, Self::MetadataFetched | Self::Accepted | Self::CitationsFetched)
            }
            Self::Done => matches!(
                self,
                Self::Accepted | Self::CitationsFetched | Self::PdfDownloaded | Self::MarkdownConverted
            ),
            _ => next.rank() > self.rank(),
        }
    }

    /// Short label for display.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Discovered => "discovered".to_string(),
            Self::MetadataFetched => "metadata_fetched".to_string(),
            Self::Accepted => "accepted".to_string(),
            Self::Rejected { .. } => "rejected".to_string(),
            Self::CitationsFetched => "citations_fetched".to_string(),
            Self::PdfDownloaded => "pdf_downloaded".to_string(),
            Self::MarkdownConverted => "markdown_converted".to_string(),
            Self::Done => "done".to_string(),
            Self::Failed { stage, kind, .. } => format!("failed({stage}, {kind})"),
        }
    }
}

/// Author information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Family name.
    pub last_name: String,

    /// Given names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fore_name: Option<String>,

    /// Initials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initials: Option<String>,

    /// Affiliation strings.
    #[serde(default)]
    pub affiliations: Vec<String>,
}

impl Author {
    /// `Last, Fore` or just `Last`.
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.fore_name {
            Some(fore) => format!("{}, {}", self.last_name, fore),
            None => self.last_name.clone(),
        }
    }
}

/// Journal information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    /// Full journal title.
    pub name: String,

    /// ISSN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issn: Option<String>,

    /// Volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,

    /// Issue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}
