//! Data models for papers, filters and processing state.
//!
//! Records serialize with `snake_case` names; they are both the batch output
//! and the on-disk dedup index format.

mod enums;
mod inputs;
mod paper;

pub use enums::{FailureKind, JournalTier, ResponseFormat, Stage, StudyType, UnknownVariant};
pub use inputs::{DateRange, MAX_RESULTS_LIMIT, PaperFilter, SearchCriteria};
pub use paper::{Author, Journal, PaperRecord, ProcessingStatus};
