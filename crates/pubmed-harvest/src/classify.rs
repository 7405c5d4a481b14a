//! Journal tier and study type derivation.
//!
//! Classification is a collaborator with a single-valued output per record.
//! [`TableClassifier`] resolves ambiguity by taking the first match in a
//! fixed priority order.

use std::collections::HashMap;

use crate::models::{Journal, JournalTier, PaperRecord, StudyType};

/// Derives the closed-set labels the quality filter works on.
pub trait PaperClassifier: Send + Sync {
    /// Tier of the publishing journal.
    fn journal_tier(&self, journal: &Journal) -> JournalTier;

    /// Research design of the paper.
    fn study_type(&self, record: &PaperRecord) -> StudyType;

    /// Fill both derived fields on `record`.
    fn classify(&self, record: &mut PaperRecord) {
        record.journal_tier =
            record.journal.as_ref().map_or(JournalTier::Unknown, |j| self.journal_tier(j));
        record.study_type = self.study_type(record);
    }
}

const BUILTIN_TIERS: &[(&str, JournalTier)] = &[
    ("nature", JournalTier::Tier1),
    ("science", JournalTier::Tier1),
    ("cell", JournalTier::Tier1),
    ("the new england journal of medicine", JournalTier::Tier1),
    ("new england journal of medicine", JournalTier::Tier1),
    ("n engl j med", JournalTier::Tier1),
    ("the lancet", JournalTier::Tier1),
    ("lancet", JournalTier::Tier1),
    ("jama", JournalTier::Tier1),
    ("bmj", JournalTier::Tier1),
    ("bmj (clinical research ed.)", JournalTier::Tier1),
    ("proceedings of the national academy of sciences of the united states of america", JournalTier::Tier2),
    ("proceedings of the national academy of sciences", JournalTier::Tier2),
    ("plos one", JournalTier::Tier3),
];

/// Publication-type patterns in priority order. Matched as lowercase substrings.
const PUBLICATION_TYPE_RULES: &[(&str, StudyType)] = &[
    ("meta-analysis", StudyType::MetaAnalysis),
    ("systematic review", StudyType::SystematicReview),
    ("randomized controlled trial", StudyType::RandomizedControlledTrial),
    ("cohort", StudyType::CohortStudy),
    ("observational study", StudyType::CohortStudy),
    ("case-control", StudyType::CaseControl),
    ("case control", StudyType::CaseControl),
    ("case series", StudyType::CaseSeries),
    ("case reports", StudyType::CaseReport),
    ("case report", StudyType::CaseReport),
    ("editorial", StudyType::ExpertOpinion),
    ("comment", StudyType::ExpertOpinion),
    ("expert opinion", StudyType::ExpertOpinion),
];

/// Title/abstract fallbacks, same priority order.
const TEXT_RULES: &[(&str, StudyType)] = &[
    ("meta-analysis", StudyType::MetaAnalysis),
    ("meta analysis", StudyType::MetaAnalysis),
    ("systematic review", StudyType::SystematicReview),
    ("randomized controlled trial", StudyType::RandomizedControlledTrial),
    ("randomised controlled trial", StudyType::RandomizedControlledTrial),
    ("cohort study", StudyType::CohortStudy),
    ("case-control", StudyType::CaseControl),
    ("case series", StudyType::CaseSeries),
    ("case report", StudyType::CaseReport),
];

/// Lookup-table classifier.
#[derive(Debug, Clone)]
pub struct TableClassifier {
    tiers: HashMap<String, JournalTier>,
}

impl TableClassifier {
    /// Built-in journal table with `overrides` merged on top.
    #[must_use]
    pub fn new(overrides: &HashMap<String, JournalTier>) -> Self {
        let mut tiers: HashMap<String, JournalTier> =
            BUILTIN_TIERS.iter().map(|(name, tier)| ((*name).to_string(), *tier)).collect();
        for (name, tier) in overrides {
            tiers.insert(normalize(name), *tier);
        }
        Self { tiers }
    }
}

impl Default for TableClassifier {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

impl PaperClassifier for TableClassifier {
    fn journal_tier(&self, journal: &Journal) -> JournalTier {
        self.tiers.get(&normalize(&journal.name)).copied().unwrap_or(JournalTier::Unknown)
    }

    fn study_type(&self, record: &PaperRecord) -> StudyType {
        let types: Vec<String> =
            record.publication_types.iter().map(|t| t.to_lowercase()).collect();
        for (pattern, study_type) in PUBLICATION_TYPE_RULES {
            if types.iter().any(|t| t.contains(pattern)) {
                return *study_type;
            }
        }

        let text = format!(
            "{} {}",
            record.title.to_lowercase(),
            record.r#abstract.as_deref().unwrap_or_default().to_lowercase()
        );
        for (pattern, study_type) in TEXT_RULES {
            if text.contains(pattern) {
                return *study_type;
            }
        }

        if types.iter().any(|t| t == "journal article" || t == "review") {
            StudyType::Other
        } else {
            StudyType::Unknown
        }
    }
}

/// Lowercase, trim and drop a trailing period.
fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_lowercase()
}
