//! PubMed E-utilities and citation API client.
//!
//! Provides async HTTP client with:
//! - Connection pooling via reqwest
//! - One shared request throttle for every concurrent caller
//! - Exponential backoff with jitter on throttling and transient failures
//! - Response caching with 5-minute TTL

mod efetch;
mod throttle;

use std::time::{Duration, SystemTime};

use moka::future::Cache;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{Jitter, RetryDecision, RetryPolicy};
use serde::Deserialize;

pub use efetch::parse_article_set;
pub use throttle::Throttle;

use crate::config::{Config, api};
use crate::error::{ClientError, ClientResult, ConfigError};
use crate::models::PaperRecord;

/// Candidate identifiers for a query, in relevance order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchHits {
    /// PMIDs, most relevant first.
    pub pmids: Vec<String>,
    /// Total matches upstream, which may exceed `pmids.len()`.
    pub total: u64,
}

/// Citation data for one paper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationInfo {
    /// Times cited.
    #[serde(default)]
    pub citation_count: Option<u32>,
    /// Highly influential citations.
    #[serde(default)]
    pub influential_citation_count: Option<u32>,
    /// Open-access PDF, when the citation source knows one.
    #[serde(default)]
    pub open_access_pdf: Option<OpenAccessPdf>,
}

/// Open-access PDF location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OpenAccessPdf {
    /// Direct URL.
    #[serde(default)]
    pub url: Option<String>,
}

impl CitationInfo {
    /// Open-access PDF URL, if present and non-empty.
    #[must_use]
    pub fn pdf_url(&self) -> Option<&str> {
        self.open_access_pdf.as_ref().and_then(|p| p.url.as_deref()).filter(|u| !u.is_empty())
    }
}

#[derive(Deserialize)]
struct ESearchResponse {
    #[serde(default)]
    esearchresult: Option<ESearchResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ESearchResult {
    #[serde(default)]
    count: Option<String>,
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR", default)]
    error: Option<String>,
}

/// Rate-limited PubMed client.
#[derive(Clone)]
pub struct PubMedClient {
    /// HTTP client.
    client: Client,

    /// Shared request throttle.
    throttle: Throttle,

    /// Backoff schedule for retryable failures.
    backoff: ExponentialBackoff,

    /// Response body cache (absent when disabled).
    cache: Option<Cache<String, String>>,

    email: String,
    tool_name: String,
    api_key: Option<String>,
    citation_api_key: Option<String>,
    eutils_url: String,
    citation_api_url: String,
    request_timeout: Duration,
    max_retry_after: Duration,
}

impl PubMedClient {
    /// Create a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an invalid configuration or when the HTTP
    /// client cannot be built. No request is made.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let client = Client::builder()
            .user_agent(format!("{}/{}", config.tool_name, env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(api::MAX_KEEPALIVE)
            .pool_idle_timeout(api::KEEPALIVE_EXPIRY)
            .gzip(true)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let cache = (config.cache_max_size > 0).then(|| {
            Cache::builder()
                .max_capacity(config.cache_max_size)
                .time_to_live(config.cache_ttl)
                .build()
        });

        Ok(Self {
            client,
            throttle: Throttle::per_second(config.requests_per_second)?,
            backoff: backoff_policy(config),
            cache,
            email: config.email.clone(),
            tool_name: config.tool_name.clone(),
            api_key: config.api_key.clone(),
            citation_api_key: config.citation_api_key.clone(),
            eutils_url: config.eutils_url.clone(),
            citation_api_url: config.citation_api_url.clone(),
            request_timeout: config.request_timeout,
            max_retry_after: config.max_retry_after,
        })
    }

    /// Check if an NCBI API key is configured.
    #[must_use]
    pub const fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The throttle every request from this client passes through.
    #[must_use]
    pub const fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// Resolve up to `max_results` PMIDs for `query`, most relevant first.
    ///
    /// # Errors
    ///
    /// Returns error on API failure or an upstream query error.
    pub async fn search(&self, query: &str, max_results: u32) -> ClientResult<SearchHits> {
        let url = format!("{}/esearch.fcgi", self.eutils_url);
        let mut params = vec![
            ("db".to_string(), "pubmed".to_string()),
            ("term".to_string(), query.to_string()),
            ("retmax".to_string(), max_results.to_string()),
            ("sort".to_string(), "relevance".to_string()),
            ("retmode".to_string(), "json".to_string()),
        ];
        params.extend(self.identity_params());

        let body = self.get(&url, &params, &[]).await?;
        let response: ESearchResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::parse(format!("esearch response: {e}")))?;

        if let Some(error) = response.error {
            return Err(ClientError::bad_request(error));
        }
        let result = response
            .esearchresult
            .ok_or_else(|| ClientError::parse("esearch response without esearchresult"))?;
        if let Some(error) = result.error {
            return Err(ClientError::bad_request(error));
        }

        let total = result.count.and_then(|c| c.parse().ok()).unwrap_or(result.idlist.len() as u64);
        tracing::debug!(query, total, returned = result.idlist.len(), "esearch complete");
        Ok(SearchHits { pmids: result.idlist, total })
    }

    /// Fetch metadata for `pmids`, batched. Unknown ids are simply absent.
    ///
    /// # Errors
    ///
    /// Returns error on API failure or malformed XML.
    pub async fn fetch_papers(&self, pmids: &[String]) -> ClientResult<Vec<PaperRecord>> {
        let url = format!("{}/efetch.fcgi", self.eutils_url);
        let mut records = Vec::with_capacity(pmids.len());

        for chunk in pmids.chunks(api::EFETCH_BATCH_SIZE) {
            let mut params = vec![
                ("db".to_string(), "pubmed".to_string()),
                ("id".to_string(), chunk.join(",")),
                ("retmode".to_string(), "xml".to_string()),
            ];
            params.extend(self.identity_params());

            let body = self.get(&url, &params, &[]).await?;
            records.extend(parse_article_set(&body)?);
        }

        Ok(records)
    }

    /// Fetch metadata for a single PMID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the id is unknown upstream.
    pub async fn fetch_paper(&self, pmid: &str) -> ClientResult<PaperRecord> {
        self.fetch_papers(&[pmid.to_string()])
            .await?
            .into_iter()
            .find(|r| r.pmid == pmid)
            .ok_or_else(|| ClientError::not_found(format!("PMID {pmid}")))
    }

    /// Resolve a DOI to its PMID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no PubMed record carries the DOI.
    pub async fn pmid_for_doi(&self, doi: &str) -> ClientResult<String> {
        let hits = self.search(&format!("\"{doi}\"[DOI]"), 1).await?;
        hits.pmids.into_iter().next().ok_or_else(|| ClientError::not_found(format!("DOI {doi}")))
    }

    /// Fetch metadata by DOI.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no PubMed record carries the DOI.
    pub async fn fetch_by_doi(&self, doi: &str) -> ClientResult<PaperRecord> {
        let pmid = self.pmid_for_doi(doi).await?;
        self.fetch_paper(&pmid).await
    }

    /// Citation counts and open-access location for a paper.
    ///
    /// Looked up by DOI when known, otherwise by PMID.
    ///
    /// # Errors
    ///
    /// Returns error on API failure; `NotFound` when the citation source
    /// does not know the paper.
    pub async fn fetch_citations(&self, record: &PaperRecord) -> ClientResult<CitationInfo> {
        let id = match &record.doi {
            Some(doi) => format!("DOI:{doi}"),
            None => format!("PMID:{}", record.pmid),
        };
        let url = format!("{}/paper/{}", self.citation_api_url, id);
        let params = vec![(
            "fields".to_string(),
            "citationCount,influentialCitationCount,openAccessPdf".to_string(),
        )];
        let headers: Vec<(&str, String)> =
            self.citation_api_key.iter().map(|k| ("x-api-key", k.clone())).collect();

        let body = self.get(&url, &params, &headers).await?;
        serde_json::from_str(&body).map_err(|e| ClientError::parse(format!("citation response: {e}")))
    }

    /// Contact and credential parameters NCBI expects on every call.
    fn identity_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("email".to_string(), self.email.clone()),
            ("tool".to_string(), self.tool_name.clone()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key".to_string(), key.clone()));
        }
        params
    }

    /// Make a GET request, returning the body text.
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        headers: &[(&str, String)],
    ) -> ClientResult<String> {
        let cache_key = self.cache_key("GET", url, params);
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&cache_key).await {
                tracing::trace!(url, "cache hit");
                return Ok(cached);
            }
        }

        let body = self
            .send_with_retry(|| {
                let mut request = self.client.get(url).query(params);
                for (name, value) in headers {
                    request = request.header(*name, value);
                }
                request
            })
            .await?;

        if let Some(cache) = &self.cache {
            cache.insert(cache_key, body.clone()).await;
        }
        Ok(body)
    }

    /// Send with throttling, retrying transient failures with backoff.
    ///
    /// Every attempt takes a throttle token. The wait before a retry is the
    /// larger of the backoff delay and any upstream `Retry-After`; an advised
    /// wait beyond `max_retry_after` ends the request at once.
    async fn send_with_retry<F>(&self, build: F) -> ClientResult<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let started = SystemTime::now();
        let mut retries: u32 = 0;

        loop {
            self.throttle.acquire().await;

            let outcome = match build().send().await {
                Ok(response) => self.handle_response(response).await,
                Err(e) => Err(self.transport_error(e)),
            };

            let err = match outcome {
                Ok(body) => return Ok(body),
                Err(err) if err.is_retryable() => err,
                Err(err) => return Err(err),
            };

            match self.backoff.should_retry(started, retries) {
                RetryDecision::Retry { execute_after } => {
                    let policy_delay =
                        execute_after.duration_since(SystemTime::now()).unwrap_or_default();
                    if let Some(advised) = err.retry_after().filter(|d| *d > self.max_retry_after) {
                        tracing::warn!(
                            retry_after_s = advised.as_secs(),
                            limit_s = self.max_retry_after.as_secs(),
                            "Upstream asked for a longer wait than allowed, giving up"
                        );
                        return Err(err.with_attempts(retries + 1));
                    }
                    let delay = err.retry_after().map_or(policy_delay, |d| d.max(policy_delay));
                    retries += 1;
                    tracing::warn!(
                        attempt = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying upstream request"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry => return Err(err.with_attempts(retries + 1)),
            }
        }
    }

    /// Map API response status codes, reading the body on success.
    async fn handle_response(&self, response: Response) -> ClientResult<String> {
        let status = response.status();

        if status.is_success() {
            return response.text().await.map_err(|e| self.transport_error(e));
        }

        match status.as_u16() {
            429 => Err(ClientError::rate_limited(retry_after(response.headers()))),
            404 => {
                let url = response.url().path().to_string();
                Err(ClientError::not_found(url))
            }
            400 => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::bad_request(text))
            }
            500..=599 => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::upstream(status.as_u16(), text))
            }
            _ => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::UnexpectedStatus { status: status.as_u16(), message: text })
            }
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(self.request_timeout)
        } else {
            ClientError::Network(err)
        }
    }

    /// Generate cache key.
    fn cache_key(&self, method: &str, url: &str, params: &[(String, String)]) -> String {
        use md5::{Digest, Md5};

        let mut hasher = Md5::new();
        hasher.update(method.as_bytes());
        hasher.update(b"|");
        hasher.update(url.as_bytes());
        hasher.update(b"|");

        for (k, v) in params {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
            hasher.update(b"&");
        }

        format!("{:x}", hasher.finalize())
    }
}

impl std::fmt::Debug for PubMedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubMedClient")
            .field("has_api_key", &self.has_api_key())
            .field("throttle", &self.throttle)
            .finish()
    }
}

/// Backoff schedule shared by the API client and the PDF fetcher.
#[must_use]
pub fn backoff_policy(config: &Config) -> ExponentialBackoff {
    ExponentialBackoff::builder()
        .retry_bounds(config.retry_min_delay, config.retry_max_delay)
        .jitter(Jitter::Bounded)
        .build_with_max_retries(config.max_retries)
}

/// Upstream-advised delay: delta-seconds or an HTTP-date.
#[must_use]
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = httpdate::parse_http_date(value).ok()?;
    Some(when.duration_since(SystemTime::now()).unwrap_or_default())
}
