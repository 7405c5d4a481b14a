//! API client behaviour against a mock upstream.

mod common;

use std::time::{Duration, Instant};

use pubmed_harvest::{ClientError, Config, PaperRecord, PubMedClient};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{Article, EFETCH, ESEARCH, article_set, esearch_body};

fn client_for(server: &MockServer) -> PubMedClient {
    let dir = tempfile::tempdir().unwrap();
    PubMedClient::new(&Config::for_testing(&server.uri(), dir.path())).unwrap()
}

#[tokio::test]
async fn test_search_sends_identity_and_parses_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ESEARCH))
        .and(query_param("db", "pubmed"))
        .and(query_param("term", "depression treatment"))
        .and(query_param("retmax", "3"))
        .and(query_param("email", "test@example.org"))
        .and(query_param("tool", "pubmed-harvest-tests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(esearch_body(&["3", "1", "2"])))
        .expect(1)
        .mount(&server)
        .await;

    let hits = client_for(&server).search("depression treatment", 3).await.unwrap();
    assert_eq!(hits.pmids, vec!["3", "1", "2"]);
    assert_eq!(hits.total, 30);
}

#[tokio::test]
async fn test_search_error_payload_is_bad_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ESEARCH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "esearchresult": { "ERROR": "Invalid query syntax" }
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).search("((", 5).await.unwrap_err();
    assert!(matches!(err, ClientError::BadRequest { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_rate_limited_then_success_honours_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ESEARCH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ESEARCH))
        .respond_with(ResponseTemplate::new(200).set_body_json(esearch_body(&["42"])))
        .mount(&server)
        .await;

    let start = Instant::now();
    let hits = client_for(&server).search("covid", 1).await.unwrap();
    assert_eq!(hits.pmids, vec!["42"]);
    assert!(start.elapsed() >= Duration::from_secs(1), "retry ignored Retry-After");
}

#[tokio::test]
async fn test_excessive_retry_after_fails_fast() {
    let server = MockServer::start().await;
    // max_retry_after = 2s in the test configuration
    Mock::given(method("GET"))
        .and(path(EFETCH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3600"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let outcome = tokio::time::timeout(Duration::from_secs(3), client.fetch_paper("1")).await;
    let err = outcome.expect("an hour-long Retry-After must not be waited out").unwrap_err();
    match err {
        ClientError::RateLimitExceeded { retry_after, attempts } => {
            assert_eq!(retry_after, Some(Duration::from_secs(3600)));
            assert_eq!(attempts, 1);
        }
        other => panic!("expected RateLimitExceeded, got {other:?}"),
    }
}

#[tokio::test]
async fn test_upstream_errors_exhaust_retries() {
    let server = MockServer::start().await;
    // max_retries = 2 in the test configuration
    Mock::given(method("GET"))
        .and(path(ESEARCH))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client_for(&server).search("covid", 1).await.unwrap_err();
    match err {
        ClientError::UpstreamUnavailable { status, attempts, .. } => {
            assert_eq!(status, 503);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected UpstreamUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bad_request_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ESEARCH))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad term"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server).search("x", 1).await.unwrap_err();
    assert!(matches!(err, ClientError::BadRequest { .. }));
}

#[tokio::test]
async fn test_fetch_paper_parses_and_reports_missing() {
    let server = MockServer::start().await;
    let article = Article::new("31978945", "The Lancet")
        .with_types(&["Journal Article", "Randomized Controlled Trial"])
        .with_pmc("PMC7159299")
        .with_doi("10.1016/S0140-6736(20)30183-5");
    Mock::given(method("GET"))
        .and(path(EFETCH))
        .and(query_param("id", "31978945"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_set([&article])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(EFETCH))
        .and(query_param("id", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_set(std::iter::empty())))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let record = client.fetch_paper("31978945").await.unwrap();
    assert_eq!(record.title, "Paper 31978945");
    assert_eq!(record.journal_name(), Some("The Lancet"));
    assert_eq!(record.pmcid.as_deref(), Some("PMC7159299"));
    assert_eq!(record.doi.as_deref(), Some("10.1016/S0140-6736(20)30183-5"));
    assert_eq!(record.publication_types.len(), 2);

    let err = client.fetch_paper("1").await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound { .. }));
}

#[tokio::test]
async fn test_pmid_for_doi() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ESEARCH))
        .and(query_param("term", "\"10.1000/xyz\"[DOI]"))
        .and(query_param("retmax", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(esearch_body(&["555"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ESEARCH))
        .and(query_param("term", "\"10.1000/none\"[DOI]"))
        .respond_with(ResponseTemplate::new(200).set_body_json(esearch_body(&[])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.pmid_for_doi("10.1000/xyz").await.unwrap(), "555");
    assert!(matches!(
        client.pmid_for_doi("10.1000/none").await,
        Err(ClientError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_citations_by_doi_with_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/DOI:10.1000/xyz"))
        .and(query_param("fields", "citationCount,influentialCitationCount,openAccessPdf"))
        .and(header("x-api-key", "s2-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "citationCount": 321,
            "influentialCitationCount": 12,
            "openAccessPdf": { "url": "https://example.org/paper.pdf" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::for_testing(&server.uri(), dir.path());
    config.citation_api_key = Some("s2-key".to_string());
    let client = PubMedClient::new(&config).unwrap();

    let mut record = PaperRecord::discovered("555");
    record.doi = Some("10.1000/xyz".to_string());
    let info = client.fetch_citations(&record).await.unwrap();
    assert_eq!(info.citation_count, Some(321));
    assert_eq!(info.influential_citation_count, Some(12));
    assert_eq!(info.pdf_url(), Some("https://example.org/paper.pdf"));
}

#[tokio::test]
async fn test_citations_unknown_paper() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/PMID:9"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": "Paper not found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server).fetch_citations(&PaperRecord::discovered("9")).await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound { .. }));
}

#[tokio::test]
async fn test_response_cache_serves_repeat_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ESEARCH))
        .respond_with(ResponseTemplate::new(200).set_body_json(esearch_body(&["7"])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::for_testing(&server.uri(), dir.path());
    config.cache_max_size = 10;
    config.cache_ttl = Duration::from_secs(60);
    let client = PubMedClient::new(&config).unwrap();

    client.search("aspirin", 1).await.unwrap();
    let hits = client.search("aspirin", 1).await.unwrap();
    assert_eq!(hits.pmids, vec!["7"]);
}
