//! HTTP surface over the pipeline.
//!
//! A thin JSON layer: each handler builds criteria, calls the pipeline and
//! maps [`PipelineError`] onto a status code. Per-paper failures are part of
//! a successful response.

use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{ClientError, PipelineError};
use crate::models::{DateRange, JournalTier, PaperFilter, PaperRecord, SearchCriteria, StudyType};
use crate::pipeline::{FetchOptions, Pipeline};

/// Concurrent HTTP requests served at once. Each may start a whole batch.
const MAX_IN_FLIGHT_REQUESTS: usize = 8;

/// Body of `POST /pubmed/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    /// Free-text or field-tagged PubMed query.
    pub query: String,
    /// Candidate cap.
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Allowed journal tiers.
    #[serde(default)]
    pub journal_tiers: Vec<JournalTier>,
    /// Allowed study types.
    #[serde(default)]
    pub study_types: Vec<StudyType>,
    /// Minimum citation count.
    #[serde(default)]
    pub min_citations: u32,
    /// Earliest publication date.
    #[serde(default)]
    pub min_date: Option<NaiveDate>,
    /// Latest publication date.
    #[serde(default)]
    pub max_date: Option<NaiveDate>,
    /// Keywords that must all be present.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// MeSH terms that must all be present.
    #[serde(default)]
    pub mesh_terms: Vec<String>,
    /// Author last names, any of which matches.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Fetch citation counts.
    #[serde(default)]
    pub retrieve_citations: bool,
    /// Download full-text PDFs.
    #[serde(default)]
    pub download_pdf: bool,
    /// Convert PDFs to markdown (implies the download).
    #[serde(default)]
    pub convert_to_markdown: bool,
    /// Only return accepted papers.
    #[serde(default)]
    pub accepted_only: bool,
}

const fn default_max_results() -> u32 {
    20
}

impl SearchRequest {
    /// Translate into pipeline criteria.
    #[must_use]
    pub fn into_criteria(self) -> SearchCriteria {
        let date_range = (self.min_date.is_some() || self.max_date.is_some())
            .then(|| DateRange::new(self.min_date, self.max_date));
        let filter = PaperFilter {
            journal_tiers: self.journal_tiers.into_iter().collect(),
            study_types: self.study_types.into_iter().collect(),
            min_citations: self.min_citations,
            date_range,
            required_keywords: self.keywords,
            required_mesh_terms: self.mesh_terms,
            author_names: self.authors,
        };
        SearchCriteria {
            max_results: self.max_results,
            filter,
            retrieve_citations: self.retrieve_citations,
            download_pdf: self.download_pdf,
            convert_to_markdown: self.convert_to_markdown,
            accepted_only: self.accepted_only,
            ..SearchCriteria::new(self.query)
        }
    }
}

/// Body returned by `POST /pubmed/search`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// Identifier of this batch run.
    pub run_id: String,
    /// Query as submitted.
    pub query: String,
    /// Upstream match count.
    pub total_results: u64,
    /// Papers that passed the filter and finished every stage.
    pub filtered_results: usize,
    /// True when the run stopped before every candidate was started.
    pub cancelled: bool,
    /// Per-paper outcomes in search order.
    pub papers: Vec<PaperRecord>,
}

/// Flags for the single-paper endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PaperQuery {
    /// Fetch the citation count.
    #[serde(default)]
    pub retrieve_citations: bool,
    /// Download the full-text PDF.
    #[serde(default)]
    pub download_pdf: bool,
    /// Convert the PDF to markdown (implies the download).
    #[serde(default)]
    pub convert_to_markdown: bool,
}

impl From<PaperQuery> for FetchOptions {
    fn from(q: PaperQuery) -> Self {
        Self {
            retrieve_citations: q.retrieve_citations,
            download_pdf: q.download_pdf,
            convert_to_markdown: q.convert_to_markdown,
        }
    }
}

/// Pipeline error rendered as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            PipelineError::InvalidCriteria { .. } => StatusCode::BAD_REQUEST,
            PipelineError::Lookup(ClientError::NotFound { .. }) => StatusCode::NOT_FOUND,
            PipelineError::Lookup(ClientError::BadRequest { .. })
            | PipelineError::Search(ClientError::BadRequest { .. }) => StatusCode::BAD_REQUEST,
            PipelineError::Search(_) | PipelineError::Lookup(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Config(_) | PipelineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Build the HTTP router.
pub fn create_router(pipeline: Pipeline) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/pubmed/search", post(search))
        .route("/pubmed/paper/{pmid}", get(paper_by_pmid))
        .route("/pubmed/paper/doi/{*doi}", get(paper_by_doi))
        .layer(ConcurrencyLimitLayer::new(MAX_IN_FLIGHT_REQUESTS))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

/// Serve on `0.0.0.0:port` until Ctrl-C.
///
/// # Errors
///
/// Returns error if the port cannot be bound or the server fails.
pub async fn serve(pipeline: Pipeline, port: u16) -> anyhow::Result<()> {
    let router = create_router(pipeline);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("HTTP server shut down");
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pubmed-harvest",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn search(
    State(pipeline): State<Pipeline>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let batch = pipeline.run(&request.into_criteria()).await?;
    let filtered_results = batch.accepted().count();

    Ok(Json(SearchResponse {
        run_id: batch.run_id,
        query: batch.query,
        total_results: batch.total_results,
        filtered_results,
        cancelled: batch.cancelled,
        papers: batch.papers,
    }))
}

async fn paper_by_pmid(
    State(pipeline): State<Pipeline>,
    Path(pmid): Path<String>,
    Query(flags): Query<PaperQuery>,
) -> Result<Json<PaperRecord>, ApiError> {
    Ok(Json(pipeline.fetch_by_pmid(&pmid, flags.into()).await?))
}

async fn paper_by_doi(
    State(pipeline): State<Pipeline>,
    Path(doi): Path<String>,
    Query(flags): Query<PaperQuery>,
) -> Result<Json<PaperRecord>, ApiError> {
    Ok(Json(pipeline.fetch_by_doi(&doi, flags.into()).await?))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
