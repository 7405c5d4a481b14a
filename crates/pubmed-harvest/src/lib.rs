//! PubMed Harvest
//!
//! Quality-screened literature retrieval from PubMed. A batch searches the
//! E-utilities API, fetches metadata for each candidate, classifies and
//! filters it by journal tier, study type, date and citation count, then
//! optionally downloads the full-text PDF and converts it to markdown.
//!
//! # Features
//!
//! - **Rate-limited**: one shared throttle for every upstream call, retries included
//! - **Resumable**: a dedup index and on-disk artifacts let repeated runs skip finished work
//! - **Partial results**: a paper that fails is recorded as failed; the batch continues
//! - **Cancellable**: a [`CancelHandle`] or deadline stops new work cleanly
//!
//! # Example
//!
//! ```no_run
//! use pubmed_harvest::{Config, Pipeline, PaperFilter, SearchCriteria, JournalTier};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let pipeline = Pipeline::new(config).await?;
//!
//!     let criteria = SearchCriteria::new("depression treatment")
//!         .with_max_results(50)
//!         .with_filter(PaperFilter::unrestricted().with_tiers([JournalTier::Tier1]));
//!     let batch = pipeline.run(&criteria).await?;
//!
//!     for paper in batch.accepted() {
//!         println!("{} {}", paper.pmid, paper.title);
//!     }
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod filter;
pub mod formatters;
pub mod fulltext;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod store;

pub use client::PubMedClient;
pub use config::Config;
pub use error::{ClientError, ConfigError, PipelineError};
pub use models::{
    JournalTier, PaperFilter, PaperRecord, ProcessingStatus, SearchCriteria, StudyType,
};
pub use pipeline::{BatchResult, CancelHandle, FetchOptions, Pipeline, RunControl};
