//! Closed enumerations shared by the filter, the pipeline and the outer surfaces.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Output format for rendered batch results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Human-readable Markdown format.
    #[default]
    Markdown,
    /// Machine-readable JSON format.
    Json,
}

impl FromStr for ResponseFormat {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            _ => Err(UnknownVariant::new("response format", s)),
        }
    }
}

/// Quality ranking of the publishing journal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JournalTier {
    /// Top general journals (Nature, Science, NEJM, ...).
    #[serde(rename = "tier_1")]
    Tier1,
    /// High-impact specialised journals.
    #[serde(rename = "tier_2")]
    Tier2,
    /// Mid-tier journals.
    #[serde(rename = "tier_3")]
    Tier3,
    /// Other indexed journals.
    #[serde(rename = "tier_4")]
    Tier4,
    /// Journal not in the classification table.
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl JournalTier {
    /// Every variant, in rank order.
    pub const ALL: [Self; 5] = [Self::Tier1, Self::Tier2, Self::Tier3, Self::Tier4, Self::Unknown];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tier1 => "tier_1",
            Self::Tier2 => "tier_2",
            Self::Tier3 => "tier_3",
            Self::Tier4 => "tier_4",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JournalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JournalTier {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "tier_1" | "tier1" | "1" => Ok(Self::Tier1),
            "tier_2" | "tier2" | "2" => Ok(Self::Tier2),
            "tier_3" | "tier3" | "3" => Ok(Self::Tier3),
            "tier_4" | "tier4" | "4" => Ok(Self::Tier4),
            "unknown" => Ok(Self::Unknown),
            _ => Err(UnknownVariant::new("journal tier", s)),
        }
    }
}

/// Research design of a paper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyType {
    /// Statistical pooling of several studies.
    MetaAnalysis,
    /// Structured literature review.
    SystematicReview,
    /// Randomised controlled trial.
    RandomizedControlledTrial,
    /// Prospective or retrospective cohort.
    CohortStudy,
    /// Case-control design.
    CaseControl,
    /// Case series.
    CaseSeries,
    /// Single case report.
    CaseReport,
    /// Editorials, opinion and commentary.
    ExpertOpinion,
    /// Classified, but none of the above.
    Other,
    /// Not classifiable from the metadata.
    #[default]
    Unknown,
}

impl StudyType {
    /// Every variant, in evidence-hierarchy order.
    pub const ALL: [Self; 10] = [
        Self::MetaAnalysis,
        Self::SystematicReview,
        Self::RandomizedControlledTrial,
        Self::CohortStudy,
        Self::CaseControl,
        Self::CaseSeries,
        Self::CaseReport,
        Self::ExpertOpinion,
        Self::Other,
        Self::Unknown,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MetaAnalysis => "meta_analysis",
            Self::SystematicReview => "systematic_review",
            Self::RandomizedControlledTrial => "randomized_controlled_trial",
            Self::CohortStudy => "cohort_study",
            Self::CaseControl => "case_control",
            Self::CaseSeries => "case_series",
            Self::CaseReport => "case_report",
            Self::ExpertOpinion => "expert_opinion",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StudyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudyType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let found = match normalized.as_str() {
            "rct" => Some(Self::RandomizedControlledTrial),
            "observational" | "cohort" => Some(Self::CohortStudy),
            other => Self::ALL.into_iter().find(|t| t.as_str() == other),
        };
        found.ok_or_else(|| UnknownVariant::new("study type", s))
    }
}

/// Pipeline stage a paper can fail in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Metadata retrieval.
    Metadata,
    /// Citation lookup.
    Citations,
    /// Full-text location and PDF download.
    Pdf,
    /// PDF to markdown conversion.
    Markdown,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Metadata => "metadata",
            Self::Citations => "citations",
            Self::Pdf => "pdf",
            Self::Markdown => "markdown",
        })
    }
}

/// Why a stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transport failure after retries.
    Network,
    /// Upstream 5xx after retries.
    UpstreamUnavailable,
    /// Upstream throttling after retries.
    RateLimitExceeded,
    /// Identifier or resource does not exist.
    NotFound,
    /// Markdown conversion failed.
    Conversion,
    /// Stage exceeded its deadline.
    Timeout,
    /// Artifact store or index failure.
    Storage,
    /// Downloaded body was not what was expected.
    InvalidContent,
    /// Upstream response could not be parsed.
    Parse,
    /// Upstream rejected the request.
    BadRequest,
    /// Batch was cancelled before the paper started.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Network => "network",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::NotFound => "not_found",
            Self::Conversion => "conversion",
            Self::Timeout => "timeout",
            Self::Storage => "storage",
            Self::InvalidContent => "invalid_content",
            Self::Parse => "parse",
            Self::BadRequest => "bad_request",
            Self::Cancelled => "cancelled",
        })
    }
}

/// A string did not name any variant of a closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parse_and_wire_names() {
        assert_eq!("TIER_1".parse::<JournalTier>().unwrap(), JournalTier::Tier1);
        assert_eq!("tier-3".parse::<JournalTier>().unwrap(), JournalTier::Tier3);
        assert!("tier_9".parse::<JournalTier>().is_err());
        assert_eq!(serde_json::to_string(&JournalTier::Tier2).unwrap(), "\"tier_2\"");
    }

    #[test]
    fn test_study_type_parse_aliases() {
        assert_eq!("RCT".parse::<StudyType>().unwrap(), StudyType::RandomizedControlledTrial);
        assert_eq!("meta-analysis".parse::<StudyType>().unwrap(), StudyType::MetaAnalysis);
        assert_eq!("systematic review".parse::<StudyType>().unwrap(), StudyType::SystematicReview);
        assert!("anecdote".parse::<StudyType>().is_err());
    }

    #[test]
    fn test_study_type_wire_names_match_as_str() {
        for t in StudyType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }
}
