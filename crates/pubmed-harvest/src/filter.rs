//! Quality filter evaluation.
//!
//! Pure functions over a record and a [`PaperFilter`]; no I/O, deterministic.
//! The metadata-only pass lets the pipeline reject papers before paying for a
//! citation lookup; the citation check runs after it.

use crate::models::{PaperFilter, PaperRecord};

/// Outcome of evaluating a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    /// Every configured criterion holds.
    Accept,
    /// The first criterion that failed.
    Reject(String),
}

impl FilterDecision {
    /// True for [`FilterDecision::Accept`].
    #[must_use]
    pub const fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }

    /// Rejection reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Accept => None,
            Self::Reject(reason) => Some(reason),
        }
    }
}

/// Full evaluation: metadata criteria, then citations.
#[must_use]
pub fn matches(record: &PaperRecord, filter: &PaperFilter) -> FilterDecision {
    match matches_metadata(record, filter) {
        FilterDecision::Accept => check_citations(record, filter),
        reject => reject,
    }
}

/// Every criterion except the citation minimum.
#[must_use]
pub fn matches_metadata(record: &PaperRecord, filter: &PaperFilter) -> FilterDecision {
    if !filter.journal_tiers.is_empty() && !filter.journal_tiers.contains(&record.journal_tier) {
        return FilterDecision::Reject(format!(
            "journal tier {} not in {}",
            record.journal_tier,
            join(filter.journal_tiers.iter())
        ));
    }

    if !filter.study_types.is_empty() && !filter.study_types.contains(&record.study_type) {
        return FilterDecision::Reject(format!(
            "study type {} not in {}",
            record.study_type,
            join(filter.study_types.iter())
        ));
    }

    if let Some(range) = filter.date_range.filter(|r| !r.is_open()) {
        match record.publication_date {
            None => return FilterDecision::Reject("publication date unknown".to_string()),
            Some(date) if !range.contains(date) => {
                return FilterDecision::Reject(format!("publication date {date} out of range"));
            }
            Some(_) => {}
        }
    }

    if let Some(missing) = first_missing(&filter.required_keywords, &record.keywords) {
        return FilterDecision::Reject(format!("missing keyword '{missing}'"));
    }

    if let Some(missing) = first_missing(&filter.required_mesh_terms, &record.mesh_terms) {
        return FilterDecision::Reject(format!("missing MeSH term '{missing}'"));
    }

    if !filter.author_names.is_empty() {
        let found = record.authors.iter().any(|a| {
            filter.author_names.iter().any(|name| name.eq_ignore_ascii_case(a.last_name.trim()))
        });
        if !found {
            return FilterDecision::Reject("no matching author".to_string());
        }
    }

    FilterDecision::Accept
}

/// Citation minimum only. An unknown count fails a non-zero minimum.
#[must_use]
pub fn check_citations(record: &PaperRecord, filter: &PaperFilter) -> FilterDecision {
    if !filter.requires_citations() {
        return FilterDecision::Accept;
    }
    match record.citation_count {
        None => FilterDecision::Reject("citation count unknown".to_string()),
        Some(n) if n < filter.min_citations => {
            FilterDecision::Reject(format!("citations {n} < {}", filter.min_citations))
        }
        Some(_) => FilterDecision::Accept,
    }
}

fn first_missing<'a>(required: &'a [String], present: &[String]) -> Option<&'a str> {
    required
        .iter()
        .find(|want| !present.iter().any(|have| have.trim().eq_ignore_ascii_case(want.trim())))
        .map(String::as_str)
}

fn join<T: std::fmt::Display>(items: impl Iterator<Item = T>) -> String {
    let parts: Vec<String> = items.map(|i| i.to_string()).collect();
    format!("{{{}}}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{Author, DateRange, JournalTier, StudyType};

    fn record() -> PaperRecord {
        PaperRecord {
            pmid: "100".into(),
            title: "SSRIs for depression".into(),
            journal_tier: JournalTier::Tier1,
            study_type: StudyType::MetaAnalysis,
            publication_date: NaiveDate::from_ymd_opt(2020, 5, 1),
            keywords: vec!["Depression".into(), "SSRI".into()],
            mesh_terms: vec!["Depressive Disorder, Major".into()],
            authors: vec![Author { last_name: "Cipriani".into(), ..Author::default() }],
            ..PaperRecord::default()
        }
    }

    #[test]
    fn test_empty_filter_accepts() {
        assert!(matches(&record(), &PaperFilter::unrestricted()).is_accept());
        assert!(matches(&PaperRecord::default(), &PaperFilter::unrestricted()).is_accept());
    }

    #[test]
    fn test_tier_and_study_type() {
        let filter = PaperFilter::default().with_tiers([JournalTier::Tier2]);
        let decision = matches(&record(), &filter);
        assert!(decision.reason().unwrap().contains("journal tier"));

        let filter = PaperFilter::default()
            .with_tiers([JournalTier::Tier1, JournalTier::Tier2])
            .with_study_types([StudyType::SystematicReview]);
        assert!(matches(&record(), &filter).reason().unwrap().contains("study type"));
    }

    #[test]
    fn test_unknown_citations_fail_nonzero_minimum() {
        let filter = PaperFilter::default().with_min_citations(10);
        assert!(matches_metadata(&record(), &filter).is_accept());
        assert_eq!(
            matches(&record(), &filter),
            FilterDecision::Reject("citation count unknown".into())
        );

        let mut cited = record();
        cited.citation_count = Some(10);
        assert!(matches(&cited, &filter).is_accept());
        cited.citation_count = Some(9);
        assert!(!matches(&cited, &filter).is_accept());
    }

    #[test]
    fn test_date_range() {
        let range = DateRange::new(NaiveDate::from_ymd_opt(2021, 1, 1), None);
        let filter = PaperFilter::default().with_date_range(range);
        assert!(!matches(&record(), &filter).is_accept());

        let mut undated = record();
        undated.publication_date = None;
        assert!(matches(&undated, &filter).reason().unwrap().contains("unknown"));

        let open = PaperFilter::default().with_date_range(DateRange::default());
        assert!(matches(&undated, &open).is_accept());
    }

    #[test]
    fn test_keywords_mesh_and_authors() {
        let mut filter = PaperFilter {
            required_keywords: vec!["ssri".into()],
            required_mesh_terms: vec!["depressive disorder, major".into()],
            author_names: vec!["CIPRIANI".into(), "Smith".into()],
            ..PaperFilter::default()
        };
        assert!(matches(&record(), &filter).is_accept());

        filter.required_keywords.push("ketamine".into());
        assert_eq!(
            matches(&record(), &filter).reason(),
            Some("missing keyword 'ketamine'")
        );

        filter.required_keywords.pop();
        filter.author_names = vec!["Smith".into()];
        assert_eq!(matches(&record(), &filter).reason(), Some("no matching author"));
    }
}
