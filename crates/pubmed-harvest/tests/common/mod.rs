//! Shared fixtures: a mock PubMed/PMC/citation upstream and pipeline builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pubmed_harvest::convert::MarkdownConverter;
use pubmed_harvest::error::ConversionError;
use pubmed_harvest::{Config, Pipeline};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const ESEARCH: &str = "/entrez/eutils/esearch.fcgi";
pub const EFETCH: &str = "/entrez/eutils/efetch.fcgi";

/// Minimal PubMed article for the mock efetch endpoint.
#[derive(Debug, Clone)]
pub struct Article {
    pub pmid: String,
    pub title: String,
    pub journal: String,
    pub year: Option<i32>,
    pub publication_types: Vec<String>,
    pub pmcid: Option<String>,
    pub doi: Option<String>,
}

impl Article {
    pub fn new(pmid: &str, journal: &str) -> Self {
        Self {
            pmid: pmid.to_string(),
            title: format!("Paper {pmid}"),
            journal: journal.to_string(),
            year: Some(2020),
            publication_types: vec!["Journal Article".to_string()],
            pmcid: None,
            doi: None,
        }
    }

    pub fn with_types(mut self, types: &[&str]) -> Self {
        self.publication_types = types.iter().map(ToString::to_string).collect();
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_pmc(mut self, pmcid: &str) -> Self {
        self.pmcid = Some(pmcid.to_string());
        self
    }

    pub fn with_doi(mut self, doi: &str) -> Self {
        self.doi = Some(doi.to_string());
        self
    }

    pub fn to_xml(&self) -> String {
        let year = self.year.map(|y| format!("<Year>{y}</Year>")).unwrap_or_default();
        let types: String = self
            .publication_types
            .iter()
            .map(|t| format!("<PublicationType>{t}</PublicationType>"))
            .collect();
        let mut ids = format!(r#"<ArticleId IdType="pubmed">{}</ArticleId>"#, self.pmid);
        if let Some(pmc) = &self.pmcid {
            ids.push_str(&format!(r#"<ArticleId IdType="pmc">{pmc}</ArticleId>"#));
        }
        if let Some(doi) = &self.doi {
            ids.push_str(&format!(r#"<ArticleId IdType="doi">{doi}</ArticleId>"#));
        }

        format!(
            r#"<PubmedArticle>
  <MedlineCitation>
    <PMID Version="1">{pmid}</PMID>
    <Article>
      <Journal>
        <JournalIssue><PubDate>{year}</PubDate></JournalIssue>
        <Title>{journal}</Title>
      </Journal>
      <ArticleTitle>{title}</ArticleTitle>
      <AuthorList><Author><LastName>Smith</LastName><ForeName>Jane</ForeName></Author></AuthorList>
      <PublicationTypeList>{types}</PublicationTypeList>
    </Article>
  </MedlineCitation>
  <PubmedData><ArticleIdList>{ids}</ArticleIdList></PubmedData>
</PubmedArticle>"#,
            pmid = self.pmid,
            journal = self.journal,
            title = self.title,
        )
    }
}

pub fn article_set<'a>(articles: impl IntoIterator<Item = &'a Article>) -> String {
    let body: String = articles.into_iter().map(Article::to_xml).collect();
    format!(r#"<?xml version="1.0"?><PubmedArticleSet>{body}</PubmedArticleSet>"#)
}

pub fn esearch_body(pmids: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "esearchresult": {
            "count": (pmids.len() * 10).to_string(),
            "idlist": pmids,
        }
    })
}

/// Every search returns `pmids`.
pub async fn mount_search(server: &MockServer, pmids: &[&str]) {
    Mock::given(method("GET"))
        .and(path(ESEARCH))
        .respond_with(ResponseTemplate::new(200).set_body_json(esearch_body(pmids)))
        .mount(server)
        .await;
}

/// efetch answers with whichever requested ids are known; `expected` bounds the call count.
pub async fn mount_efetch(server: &MockServer, articles: &[Article], expected: Option<u64>) {
    let known: Arc<HashMap<String, Article>> =
        Arc::new(articles.iter().map(|a| (a.pmid.clone(), a.clone())).collect());

    let mock = Mock::given(method("GET")).and(path(EFETCH)).respond_with(move |req: &Request| {
        let ids: Vec<String> = req
            .url
            .query_pairs()
            .find(|(k, _)| k == "id")
            .map(|(_, v)| v.split(',').map(str::to_string).collect())
            .unwrap_or_default();
        let found: Vec<&Article> = ids.iter().filter_map(|id| known.get(id)).collect();
        ResponseTemplate::new(200).set_body_string(article_set(found))
    });

    match expected {
        Some(n) => mock.expect(n).mount(server).await,
        None => mock.mount(server).await,
    }
}

pub fn pdf_path(pmcid: &str) -> String {
    format!("/pmc/articles/{pmcid}/pdf/")
}

pub fn fake_pdf(label: &str) -> Vec<u8> {
    format!("%PDF-1.4\n% {label}\n%%EOF\n").into_bytes()
}

/// Serve a PDF for `pmcid`, optionally slow, optionally with a call-count expectation.
pub async fn mount_pdf(server: &MockServer, pmcid: &str, delay: Duration, expected: Option<u64>) {
    let mock = Mock::given(method("GET")).and(path(pdf_path(pmcid))).respond_with(
        ResponseTemplate::new(200)
            .set_body_bytes(fake_pdf(pmcid))
            .insert_header("content-type", "application/pdf")
            .set_delay(delay),
    );
    match expected {
        Some(n) => mock.expect(n).mount(server).await,
        None => mock.mount(server).await,
    }
}

pub async fn mount_citations(server: &MockServer, pmid: &str, count: u32, oa_url: Option<&str>) {
    let body = serde_json::json!({
        "citationCount": count,
        "influentialCitationCount": count / 10,
        "openAccessPdf": oa_url.map(|u| serde_json::json!({ "url": u })),
    });
    Mock::given(method("GET"))
        .and(path(format!("/graph/v1/paper/PMID:{pmid}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Converter that does not parse the PDF; records the title and byte count.
#[derive(Debug, Default)]
pub struct StubConverter;

#[async_trait]
impl MarkdownConverter for StubConverter {
    async fn convert(&self, pdf: &[u8], title: &str) -> Result<String, ConversionError> {
        Ok(format!("# {title}\n\n{} bytes\n", pdf.len()))
    }
}

pub fn test_config(server: &MockServer, root: &Path) -> Config {
    Config::for_testing(&server.uri(), root)
}

pub async fn test_pipeline(config: Config) -> Pipeline {
    Pipeline::new(config).await.unwrap().with_converter(Arc::new(StubConverter))
}

/// A URL on a local port nothing listens on.
pub fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/gone.pdf")
}
