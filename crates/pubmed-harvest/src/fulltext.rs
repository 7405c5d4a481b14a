//! Full-text location and PDF download.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use reqwest::Client;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{RetryDecision, RetryPolicy};
use url::Url;

use crate::client::{backoff_policy, retry_after};
use crate::config::Config;
use crate::error::{ConfigError, FetchError};

/// Largest PDF accepted (50 MB).
pub const MAX_PDF_BYTES: usize = 50 * 1024 * 1024;

/// Downloads PDF bytes from a URL.
#[async_trait]
pub trait PdfFetcher: Send + Sync {
    /// Fetch and validate a PDF.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// PDF download over HTTP with retry on transient failures.
///
/// Uses its own connection pool and is not subject to the literature API
/// throttle.
#[derive(Debug, Clone)]
pub struct HttpPdfFetcher {
    client: Client,
    backoff: ExponentialBackoff,
    timeout: Duration,
    max_retry_after: Duration,
}

impl HttpPdfFetcher {
    /// Fetcher using the configured download timeout and backoff.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .user_agent(format!("{}/{}", config.tool_name, env!("CARGO_PKG_VERSION")))
            .timeout(config.download_timeout)
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            backoff: backoff_policy(config),
            timeout: config.download_timeout,
            max_retry_after: config.max_retry_after,
        })
    }

    async fn attempt(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = self.client.get(url).send().await.map_err(|e| self.transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                retry_after: retry_after(response.headers()),
            });
        }

        let declared = response.content_length().and_then(|n| usize::try_from(n).ok());
        if let Some(len) = declared.filter(|&n| n > MAX_PDF_BYTES) {
            return Err(FetchError::TooLarge { url: url.to_string(), bytes: len });
        }

        let mut body = Vec::with_capacity(declared.unwrap_or(0));
        while let Some(chunk) = response.chunk().await.map_err(|e| self.transport(url, e))? {
            if body.len() + chunk.len() > MAX_PDF_BYTES {
                return Err(FetchError::TooLarge { url: url.to_string(), bytes: body.len() + chunk.len() });
            }
            body.extend_from_slice(&chunk);
        }

        validate_pdf(url, &body)?;
        Ok(body)
    }

    fn transport(&self, url: &str, source: reqwest::Error) -> FetchError {
        if source.is_timeout() {
            FetchError::Timeout { url: url.to_string(), timeout: self.timeout }
        } else {
            FetchError::Network { url: url.to_string(), source }
        }
    }
}

#[async_trait]
impl PdfFetcher for HttpPdfFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let started = SystemTime::now();
        let mut retries = 0;

        loop {
            let err = match self.attempt(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.is_retryable() => err,
                Err(err) => return Err(err),
            };

            if err.retry_after().is_some_and(|d| d > self.max_retry_after) {
                return Err(err);
            }

            match self.backoff.should_retry(started, retries) {
                RetryDecision::Retry { execute_after } => {
                    let policy_delay =
                        execute_after.duration_since(SystemTime::now()).unwrap_or_default();
                    let delay = err.retry_after().map_or(policy_delay, |d| d.max(policy_delay));
                    retries += 1;
                    tracing::warn!(
                        url,
                        attempt = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying PDF download"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry => return Err(err),
            }
        }
    }
}

/// Reject bodies that are not a PDF or exceed [`MAX_PDF_BYTES`].
pub fn validate_pdf(url: &str, bytes: &[u8]) -> Result<(), FetchError> {
    if !bytes.starts_with(b"%PDF") {
        return Err(FetchError::NotPdf { url: url.to_string() });
    }
    if bytes.len() > MAX_PDF_BYTES {
        return Err(FetchError::TooLarge { url: url.to_string(), bytes: bytes.len() });
    }
    Ok(())
}

/// PubMed Central PDF location for `pmcid` (`PMC123` or bare `123`).
#[must_use]
pub fn pmc_pdf_url(pmc_base: &str, pmcid: &str) -> Option<String> {
    let digits = pmcid.trim().trim_start_matches("PMC");
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let url = format!("{}/articles/PMC{digits}/pdf/", pmc_base.trim_end_matches('/'));
    Url::parse(&url).ok().map(String::from)
}

/// Accept only absolute http(s) URLs.
#[must_use]
pub fn is_fetchable(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pmc_pdf_url() {
        assert_eq!(
            pmc_pdf_url("https://www.ncbi.nlm.nih.gov/pmc", "PMC8901234").as_deref(),
            Some("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC8901234/pdf/")
        );
        assert_eq!(
            pmc_pdf_url("http://127.0.0.1:9000/pmc/", "42").as_deref(),
            Some("http://127.0.0.1:9000/pmc/articles/PMC42/pdf/")
        );
        assert!(pmc_pdf_url("https://x", "PM12345").is_none());
        assert!(pmc_pdf_url("https://x", "PMC").is_none());
    }

    #[test]
    fn test_validate_pdf() {
        assert!(validate_pdf("u", b"%PDF-1.7\n...").is_ok());
        assert!(matches!(validate_pdf("u", b"<html>"), Err(FetchError::NotPdf { .. })));
        assert!(matches!(validate_pdf("u", b""), Err(FetchError::NotPdf { .. })));
    }

    #[test]
    fn test_is_fetchable() {
        assert!(is_fetchable("https://europepmc.org/pdf/1.pdf"));
        assert!(!is_fetchable("ftp://host/file.pdf"));
        assert!(!is_fetchable("not a url"));
    }
}
