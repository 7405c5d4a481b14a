//! PDF download behaviour against a mock host.

mod common;

use std::time::{Duration, Instant};

use pubmed_harvest::error::FetchError;
use pubmed_harvest::fulltext::{HttpPdfFetcher, MAX_PDF_BYTES, PdfFetcher};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{fake_pdf, test_config};

async fn fetcher_for(server: &MockServer) -> HttpPdfFetcher {
    let dir = tempfile::tempdir().unwrap();
    HttpPdfFetcher::new(&test_config(server, dir.path())).unwrap()
}

#[tokio::test]
async fn test_oversized_pdf_rejected() {
    let server = MockServer::start().await;
    let mut body = fake_pdf("huge");
    body.resize(MAX_PDF_BYTES + 1, b' ');
    Mock::given(method("GET"))
        .and(path("/big.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(1)
        .mount(&server)
        .await;

    let err = fetcher_for(&server).await.fetch(&format!("{}/big.pdf", server.uri())).await.unwrap_err();
    match err {
        FetchError::TooLarge { bytes, .. } => assert!(bytes > MAX_PDF_BYTES),
        other => panic!("expected TooLarge, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limited_download_honours_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/paper.pdf"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/paper.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(fake_pdf("ok")))
        .mount(&server)
        .await;

    let start = Instant::now();
    let bytes = fetcher_for(&server).await.fetch(&format!("{}/paper.pdf", server.uri())).await.unwrap();
    assert_eq!(bytes, fake_pdf("ok"));
    assert!(start.elapsed() >= Duration::from_secs(1), "retry ignored Retry-After");
}

#[tokio::test]
async fn test_excessive_retry_after_not_waited_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/paper.pdf"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3600"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server).await;
    let outcome =
        tokio::time::timeout(Duration::from_secs(3), fetcher.fetch(&format!("{}/paper.pdf", server.uri()))).await;
    match outcome.expect("download should give up promptly") {
        Err(FetchError::Status { status: 429, retry_after, .. }) => {
            assert_eq!(retry_after, Some(Duration::from_secs(3600)));
        }
        other => panic!("expected a 429 failure, got {other:?}"),
    }
}
