//! Property tests for the quality filter.

use chrono::NaiveDate;
use proptest::prelude::*;
use pubmed_harvest::filter::{self, FilterDecision};
use pubmed_harvest::models::DateRange;
use pubmed_harvest::{JournalTier, PaperFilter, PaperRecord, StudyType};

fn tier() -> impl Strategy<Value = JournalTier> {
    prop::sample::select(JournalTier::ALL.to_vec())
}

fn study_type() -> impl Strategy<Value = StudyType> {
    prop::sample::select(StudyType::ALL.to_vec())
}

fn date() -> impl Strategy<Value = NaiveDate> {
    (1990i32..2030, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

prop_compose! {
    fn record()(
        tier in tier(),
        study_type in study_type(),
        citations in prop::option::of(0u32..2000),
        date in prop::option::of(date()),
    ) -> PaperRecord {
        PaperRecord {
            journal_tier: tier,
            study_type,
            citation_count: citations,
            publication_date: date,
            ..PaperRecord::discovered("1")
        }
    }
}

prop_compose! {
    fn paper_filter()(
        tiers in prop::collection::btree_set(tier(), 0..3),
        types in prop::collection::btree_set(study_type(), 0..4),
        min_citations in prop_oneof![Just(0u32), 0u32..1000],
        start in prop::option::of(date()),
        end in prop::option::of(date()),
    ) -> PaperFilter {
        PaperFilter {
            journal_tiers: tiers,
            study_types: types,
            min_citations,
            date_range: Some(DateRange::new(start, end)),
            ..PaperFilter::default()
        }
    }
}

/// Reference evaluation, criterion by criterion.
fn expected(record: &PaperRecord, f: &PaperFilter) -> bool {
    let tier_ok = f.journal_tiers.is_empty() || f.journal_tiers.contains(&record.journal_tier);
    let type_ok = f.study_types.is_empty() || f.study_types.contains(&record.study_type);
    let cite_ok = f.min_citations == 0 || record.citation_count.is_some_and(|c| c >= f.min_citations);
    let date_ok = match f.date_range {
        None => true,
        Some(r) if r.start.is_none() && r.end.is_none() => true,
        Some(r) => record.publication_date.is_some_and(|d| {
            r.start.is_none_or(|s| d >= s) && r.end.is_none_or(|e| d <= e)
        }),
    };
    tier_ok && type_ok && cite_ok && date_ok
}

proptest! {
    #[test]
    fn filter_matches_reference(record in record(), f in paper_filter()) {
        let decision = filter::matches(&record, &f);
        prop_assert_eq!(decision.is_accept(), expected(&record, &f), "decision {:?}", decision);
    }

    #[test]
    fn filter_is_deterministic(record in record(), f in paper_filter()) {
        prop_assert_eq!(filter::matches(&record, &f), filter::matches(&record, &f));
    }

    #[test]
    fn rejection_always_has_reason(record in record(), f in paper_filter()) {
        if let FilterDecision::Reject(reason) = filter::matches(&record, &f) {
            prop_assert!(!reason.is_empty());
        }
    }

    #[test]
    fn unrestricted_filter_accepts_everything(record in record()) {
        prop_assert!(filter::matches(&record, &PaperFilter::unrestricted()).is_accept());
    }

    #[test]
    fn metadata_pass_never_rejects_what_full_accepts(record in record(), f in paper_filter()) {
        if filter::matches(&record, &f).is_accept() {
            prop_assert!(filter::matches_metadata(&record, &f).is_accept());
        }
    }
}

#[test]
fn unknown_citations_fail_a_nonzero_minimum() {
    let record = PaperRecord::discovered("1");
    let f = PaperFilter::unrestricted().with_min_citations(1);
    assert_eq!(filter::matches(&record, &f), FilterDecision::Reject("citation count unknown".into()));
}
