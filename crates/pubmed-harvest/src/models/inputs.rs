//! Caller-supplied inputs: the quality filter and the batch search criteria.
//!
//! Both are plain immutable values once handed to the pipeline.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{JournalTier, StudyType};
use crate::error::PipelineError;

/// Largest `max_results` the search endpoint accepts.
pub const MAX_RESULTS_LIMIT: u32 = 10_000;

/// Quality criteria a paper must satisfy.
///
/// Every dimension is optional: an empty set, a zero minimum or an absent
/// range places no restriction on that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperFilter {
    /// Acceptable journal tiers.
    pub journal_tiers: BTreeSet<JournalTier>,

    /// Acceptable study types.
    pub study_types: BTreeSet<StudyType>,

    /// Minimum citation count. Non-zero requires a known count.
    pub min_citations: u32,

    /// Publication date window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,

    /// Keywords that must all be present (case-insensitive).
    pub required_keywords: Vec<String>,

    /// MeSH descriptors that must all be present (case-insensitive).
    pub required_mesh_terms: Vec<String>,

    /// Author last names, any of which must appear (case-insensitive).
    pub author_names: Vec<String>,
}

impl PaperFilter {
    /// A filter that accepts everything.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Restrict to the given journal tiers.
    #[must_use]
    pub fn with_tiers(mut self, tiers: impl IntoIterator<Item = JournalTier>) -> Self {
        self.journal_tiers = tiers.into_iter().collect();
        self
    }

    /// Restrict to the given study types.
    #[must_use]
    pub fn with_study_types(mut self, types: impl IntoIterator<Item = StudyType>) -> Self {
        self.study_types = types.into_iter().collect();
        self
    }

    /// Require at least `n` citations.
    #[must_use]
    pub const fn with_min_citations(mut self, n: u32) -> Self {
        self.min_citations = n;
        self
    }

    /// Restrict the publication date.
    #[must_use]
    pub const fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    /// True when the citation count participates in the decision.
    #[must_use]
    pub const fn requires_citations(&self) -> bool {
        self.min_citations > 0
    }
}

/// Inclusive publication date window; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Earliest acceptable date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,

    /// Latest acceptable date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Build a range from optional bounds.
    #[must_use]
    pub const fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// No bound configured.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Whether `date` falls inside the window.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

/// A batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// PubMed query string.
    pub query: String,

    /// Maximum candidates to resolve.
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Quality filter.
    #[serde(default)]
    pub filter: PaperFilter,

    /// Fetch citation counts for accepted papers.
    #[serde(default)]
    pub retrieve_citations: bool,

    /// Download full-text PDFs for accepted papers.
    #[serde(default)]
    pub download_pdf: bool,

    /// Convert downloaded PDFs to markdown.
    #[serde(default)]
    pub convert_to_markdown: bool,

    /// Return only accepted papers that reached `Done`.
    #[serde(default)]
    pub accepted_only: bool,
}

const fn default_max_results() -> u32 {
    20
}

impl SearchCriteria {
    /// Criteria for `query` with defaults everywhere else.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: default_max_results(),
            filter: PaperFilter::default(),
            retrieve_citations: false,
            download_pdf: false,
            convert_to_markdown: false,
            accepted_only: false,
        }
    }

    /// Set the candidate cap.
    #[must_use]
    pub const fn with_max_results(mut self, n: u32) -> Self {
        self.max_results = n;
        self
    }

    /// Set the quality filter.
    #[must_use]
    pub fn with_filter(mut self, filter: PaperFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Citation stage runs when asked for or when the filter depends on it.
    #[must_use]
    pub const fn needs_citations(&self) -> bool {
        self.retrieve_citations || self.filter.requires_citations()
    }

    /// Markdown needs the PDF that produced it.
    #[must_use]
    pub const fn wants_pdf(&self) -> bool {
        self.download_pdf || self.convert_to_markdown
    }

    /// Reject criteria the pipeline cannot run.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.query.trim().is_empty() {
            return Err(PipelineError::invalid_criteria("query", "must not be empty"));
        }
        if self.max_results == 0 || self.max_results > MAX_RESULTS_LIMIT {
            return Err(PipelineError::invalid_criteria(
                "max_results",
                format!("must be between 1 and {MAX_RESULTS_LIMIT}"),
            ));
        }
        if let Some(DateRange { start: Some(start), end: Some(end) }) = self.filter.date_range {
            if start > end {
                return Err(PipelineError::invalid_criteria(
                    "date_range",
                    format!("start {start} is after end {end}"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_markdown_implies_pdf() {
        let mut criteria = SearchCriteria::new("asthma");
        assert!(!criteria.wants_pdf());
        criteria.convert_to_markdown = true;
        assert!(criteria.wants_pdf());
    }

    #[test]
    fn test_min_citations_implies_citation_stage() {
        let criteria = SearchCriteria::new("asthma")
            .with_filter(PaperFilter::default().with_min_citations(5));
        assert!(criteria.needs_citations());
        assert!(!SearchCriteria::new("asthma").needs_citations());
    }

    #[test]
    fn test_validate() {
        assert!(SearchCriteria::new("asthma").validate().is_ok());
        assert!(SearchCriteria::new("   ").validate().is_err());
        assert!(SearchCriteria::new("asthma").with_max_results(0).validate().is_err());

        let inverted = PaperFilter::default()
            .with_date_range(DateRange::new(Some(date(2022, 1, 1)), Some(date(2020, 1, 1))));
        let err = SearchCriteria::new("asthma").with_filter(inverted).validate().unwrap_err();
        assert!(err.to_string().contains("date_range"));
    }

    #[test]
    fn test_date_range_open_ends() {
        let range = DateRange::new(Some(date(2020, 1, 1)), None);
        assert!(range.contains(date(2024, 6, 1)));
        assert!(!range.contains(date(2019, 12, 31)));
        assert!(DateRange::default().is_open());
    }

    #[test]
    fn test_criteria_deserialize_defaults() {
        let criteria: SearchCriteria = serde_json::from_str(r#"{"query":"sleep"}"#).unwrap();
        assert_eq!(criteria.max_results, 20);
        assert!(criteria.filter.journal_tiers.is_empty());
        assert!(!criteria.download_pdf);
    }
}
