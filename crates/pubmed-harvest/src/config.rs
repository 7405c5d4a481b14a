//! Configuration for the PubMed harvesting pipeline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::JournalTier;

/// API configuration constants.
pub mod api {
    use std::time::Duration;

    /// NCBI E-utilities base URL.
    pub const EUTILS_API: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

    /// Semantic Scholar Graph API, used for citation counts and open-access links.
    pub const CITATION_API: &str = "https://api.semanticscholar.org/graph/v1";

    /// PubMed Central base URL for full-text PDFs.
    pub const PMC_BASE: &str = "https://www.ncbi.nlm.nih.gov/pmc";

    /// Tool name reported to NCBI.
    pub const TOOL_NAME: &str = "PubMedHarvest";

    /// Request timeout for metadata and citation calls.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Timeout for a single PDF download.
    pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

    /// Timeout for a single PDF to markdown conversion.
    pub const CONVERSION_TIMEOUT: Duration = Duration::from_secs(120);

    /// E-utilities budget without an API key.
    pub const REQUESTS_PER_SECOND: u32 = 3;

    /// E-utilities budget with an API key.
    pub const REQUESTS_PER_SECOND_WITH_KEY: u32 = 10;

    /// Retries after the first attempt for transient failures.
    pub const MAX_RETRIES: u32 = 3;

    /// Lower bound of the exponential backoff window.
    pub const RETRY_MIN_DELAY: Duration = Duration::from_millis(500);

    /// Upper bound of the exponential backoff window.
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

    /// Longest upstream `Retry-After` waited out before giving up.
    pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

    /// Papers processed concurrently within a batch.
    pub const CONCURRENCY: usize = 4;

    /// Cache TTL (5 minutes).
    pub const CACHE_TTL: Duration = Duration::from_secs(300);

    /// Maximum cache size.
    pub const CACHE_MAX_SIZE: u64 = 1000;

    /// Maximum keepalive connections.
    pub const MAX_KEEPALIVE: usize = 10;

    /// Keepalive expiry.
    pub const KEEPALIVE_EXPIRY: Duration = Duration::from_secs(30);

    /// Ids per efetch request.
    pub const EFETCH_BATCH_SIZE: usize = 100;
}

/// Default storage locations.
pub mod paths {
    /// PDF artifact root.
    pub const PDF_DIR: &str = "papers/pdf";

    /// Markdown artifact root.
    pub const MARKDOWN_DIR: &str = "papers/markdown";

    /// Dedup index file.
    pub const INDEX_PATH: &str = "papers/index.json";
}

/// Pipeline configuration.
#[derive(Clone)]
pub struct Config {
    /// Contact email reported to NCBI (required).
    pub email: String,

    /// NCBI API key (optional, raises the request budget).
    pub api_key: Option<String>,

    /// Tool name reported to NCBI.
    pub tool_name: String,

    /// Semantic Scholar API key for the citation lookups (optional).
    pub citation_api_key: Option<String>,

    /// E-utilities base URL (overridable for mock servers).
    pub eutils_url: String,

    /// Citation API base URL.
    pub citation_api_url: String,

    /// PubMed Central base URL.
    pub pmc_url: String,

    /// Request timeout for API calls.
    pub request_timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Timeout for one PDF download.
    pub download_timeout: Duration,

    /// Timeout for one markdown conversion.
    pub conversion_timeout: Duration,

    /// Shared request budget across every concurrent caller.
    pub requests_per_second: u32,

    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Minimum backoff delay.
    pub retry_min_delay: Duration,

    /// Maximum backoff delay.
    pub retry_max_delay: Duration,

    /// Longest `Retry-After` honoured; a longer advised wait fails the request.
    pub max_retry_after: Duration,

    /// Worker pool size for a batch.
    pub concurrency: usize,

    /// Directory for PDF artifacts.
    pub pdf_dir: PathBuf,

    /// Directory for markdown artifacts.
    pub markdown_dir: PathBuf,

    /// Dedup index location.
    pub index_path: PathBuf,

    /// Extra journal name to tier mappings, merged over the built-in table.
    pub journal_tiers: HashMap<String, JournalTier>,

    /// Cache TTL.
    pub cache_ttl: Duration,

    /// Maximum cache size (0 disables the cache).
    pub cache_max_size: u64,
}

impl Config {
    /// Create a configuration for the given contact email.
    ///
    /// The request budget follows the key: 3 req/s without, 10 req/s with.
    #[must_use]
    pub fn new(email: impl Into<String>, api_key: Option<String>) -> Self {
        let requests_per_second = if api_key.is_some() {
            api::REQUESTS_PER_SECOND_WITH_KEY
        } else {
            api::REQUESTS_PER_SECOND
        };

        Self {
            email: email.into(),
            api_key,
            tool_name: api::TOOL_NAME.to_string(),
            citation_api_key: None,
            eutils_url: api::EUTILS_API.to_string(),
            citation_api_url: api::CITATION_API.to_string(),
            pmc_url: api::PMC_BASE.to_string(),
            request_timeout: api::REQUEST_TIMEOUT,
            connect_timeout: api::CONNECT_TIMEOUT,
            download_timeout: api::DOWNLOAD_TIMEOUT,
            conversion_timeout: api::CONVERSION_TIMEOUT,
            requests_per_second,
            max_retries: api::MAX_RETRIES,
            retry_min_delay: api::RETRY_MIN_DELAY,
            retry_max_delay: api::RETRY_MAX_DELAY,
            max_retry_after: api::MAX_RETRY_AFTER,
            concurrency: api::CONCURRENCY,
            pdf_dir: PathBuf::from(paths::PDF_DIR),
            markdown_dir: PathBuf::from(paths::MARKDOWN_DIR),
            index_path: PathBuf::from(paths::INDEX_PATH),
            journal_tiers: HashMap::new(),
            cache_ttl: api::CACHE_TTL,
            cache_max_size: api::CACHE_MAX_SIZE,
        }
    }

    /// Create a test configuration pointing every upstream at a mock server.
    ///
    /// Artifacts land under `root`; retries are fast and the cache is off.
    #[must_use]
    pub fn for_testing(base_url: &str, root: &std::path::Path) -> Self {
        Self {
            email: "test@example.org".to_string(),
            api_key: None,
            tool_name: "pubmed-harvest-tests".to_string(),
            citation_api_key: None,
            eutils_url: format!("{base_url}/entrez/eutils"),
            citation_api_url: format!("{base_url}/graph/v1"),
            pmc_url: format!("{base_url}/pmc"),
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            download_timeout: Duration::from_secs(5),
            conversion_timeout: Duration::from_secs(5),
            requests_per_second: 1000,
            max_retries: 2,
            retry_min_delay: Duration::from_millis(5),
            retry_max_delay: Duration::from_millis(20),
            max_retry_after: Duration::from_secs(2),
            concurrency: 4,
            pdf_dir: root.join("pdf"),
            markdown_dir: root.join("markdown"),
            index_path: root.join("index.json"),
            journal_tiers: HashMap::new(),
            cache_ttl: Duration::from_secs(0),
            cache_max_size: 0,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads `PUBMED_EMAIL`, `PUBMED_API_KEY`, `PUBMED_TOOL_NAME`,
    /// `PUBMED_PDF_DIR`, `PUBMED_MARKDOWN_DIR`, `PUBMED_INDEX_PATH`,
    /// `PUBMED_REQUESTS_PER_SECOND`, `PUBMED_CONCURRENCY` and
    /// `SEMANTIC_SCHOLAR_API_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::from_env_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Read the environment like [`from_env`](Self::from_env), leaving
    /// validation to the caller so command-line overrides can be applied first.
    pub fn from_env_unvalidated() -> Result<Self, ConfigError> {
        let email = std::env::var("PUBMED_EMAIL").unwrap_or_default();
        let api_key = std::env::var("PUBMED_API_KEY").ok().filter(|k| !k.is_empty());
        let mut config = Self::new(email, api_key);

        if let Ok(tool) = std::env::var("PUBMED_TOOL_NAME") {
            config.tool_name = tool;
        }
        if let Ok(dir) = std::env::var("PUBMED_PDF_DIR") {
            config.pdf_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("PUBMED_MARKDOWN_DIR") {
            config.markdown_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("PUBMED_INDEX_PATH") {
            config.index_path = PathBuf::from(path);
        }
        if let Ok(rate) = std::env::var("PUBMED_REQUESTS_PER_SECOND") {
            config.requests_per_second = rate
                .parse()
                .map_err(|_| ConfigError::invalid("PUBMED_REQUESTS_PER_SECOND", rate))?;
        }
        if let Ok(n) = std::env::var("PUBMED_CONCURRENCY") {
            config.concurrency =
                n.parse().map_err(|_| ConfigError::invalid("PUBMED_CONCURRENCY", n))?;
        }
        config.citation_api_key =
            std::env::var("SEMANTIC_SCHOLAR_API_KEY").ok().filter(|k| !k.is_empty());

        Ok(config)
    }

    /// Set the NCBI API key, raising a default request budget to the keyed one.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        if self.requests_per_second == api::REQUESTS_PER_SECOND {
            self.requests_per_second = api::REQUESTS_PER_SECOND_WITH_KEY;
        }
        self.api_key = Some(key.into());
        self
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.email.trim().is_empty() {
            return Err(ConfigError::MissingEmail);
        }
        if self.requests_per_second == 0 {
            return Err(ConfigError::invalid("requests_per_second", "0"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("concurrency", "0"));
        }
        Ok(())
    }

    /// Parse `journal=tier` pairs into tier overrides.
    pub fn with_journal_tiers<I, S>(mut self, pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pair in pairs {
            let pair = pair.as_ref();
            let (journal, tier) = pair
                .rsplit_once('=')
                .ok_or_else(|| ConfigError::invalid("journal_tiers", pair))?;
            let tier: JournalTier =
                tier.trim().parse().map_err(|_| ConfigError::invalid("journal_tiers", pair))?;
            self.journal_tiers.insert(journal.trim().to_string(), tier);
        }
        Ok(self)
    }

    /// Check if an NCBI API key is configured.
    #[must_use]
    pub const fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("email", &self.email)
            .field("has_api_key", &self.has_api_key())
            .field("eutils_url", &self.eutils_url)
            .field("requests_per_second", &self.requests_per_second)
            .field("concurrency", &self.concurrency)
            .field("pdf_dir", &self.pdf_dir)
            .field("markdown_dir", &self.markdown_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_follows_api_key() {
        let config = Config::new("me@example.org", None);
        assert_eq!(config.requests_per_second, api::REQUESTS_PER_SECOND);
        assert!(!config.has_api_key());

        let config = Config::new("me@example.org", Some("key".to_string()));
        assert_eq!(config.requests_per_second, api::REQUESTS_PER_SECOND_WITH_KEY);
        assert!(config.has_api_key());
    }

    #[test]
    fn test_missing_email_is_fatal() {
        let config = Config::new("  ", None);
        assert!(matches!(config.validate(), Err(ConfigError::MissingEmail)));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::new("me@example.org", None);
        config.concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_journal_tier_overrides() {
        let config = Config::new("me@example.org", None)
            .with_journal_tiers(["Journal of Psychiatry=tier_2", "Psych Letters = tier_4"])
            .unwrap();
        assert_eq!(config.journal_tiers.get("Journal of Psychiatry"), Some(&JournalTier::Tier2));
        assert_eq!(config.journal_tiers.get("Psych Letters"), Some(&JournalTier::Tier4));

        let bad = Config::new("me@example.org", None).with_journal_tiers(["Nature"]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = Config::new("me@example.org", Some("super-secret-key".to_string()));
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret-key"));
        assert!(debug.contains("has_api_key"));
    }
}
