//! PubMed Harvest - Entry Point
//!
//! Runs a single search batch from the command line, or serves the HTTP API.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pubmed_harvest::formatters::render_batch;
use pubmed_harvest::models::{DateRange, ResponseFormat};
use pubmed_harvest::{
    CancelHandle, Config, JournalTier, PaperFilter, Pipeline, RunControl, SearchCriteria, StudyType,
};

#[derive(Parser, Debug)]
#[command(name = "pubmed-harvest")]
#[command(about = "Quality-screened PubMed retrieval with PDF download and markdown conversion")]
#[command(version)]
struct Cli {
    /// Contact email sent to NCBI with every request
    #[arg(long, env = "PUBMED_EMAIL", global = true)]
    email: Option<String>,

    /// NCBI API key (optional, raises the request budget to 10/s)
    #[arg(long, env = "PUBMED_API_KEY", global = true)]
    api_key: Option<String>,

    /// Directory for downloaded PDFs
    #[arg(long, global = true)]
    pdf_dir: Option<PathBuf>,

    /// Directory for converted markdown
    #[arg(long, global = true)]
    markdown_dir: Option<PathBuf>,

    /// Extra journal tier mappings, as journal=tier
    #[arg(long = "journal-tier", value_name = "JOURNAL=TIER", global = true)]
    journal_tier_overrides: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one search batch and print the results
    Search(SearchArgs),
    /// Serve the HTTP API
    Serve {
        /// HTTP server port
        #[arg(long, default_value = "8000", env = "PORT")]
        port: u16,
    },
}

#[derive(clap::Args, Debug)]
struct SearchArgs {
    /// PubMed query
    query: String,

    /// Maximum candidates to process
    #[arg(long, default_value = "20")]
    max_results: u32,

    /// Allowed journal tiers (tier_1..tier_4, unknown)
    #[arg(long, value_delimiter = ',')]
    journal_tiers: Vec<JournalTier>,

    /// Allowed study types (meta_analysis, randomized_controlled_trial, ...)
    #[arg(long, value_delimiter = ',')]
    study_types: Vec<StudyType>,

    /// Minimum citation count (fetches citations when non-zero)
    #[arg(long, default_value = "0")]
    min_citations: u32,

    /// Earliest publication date (YYYY-MM-DD)
    #[arg(long)]
    min_date: Option<NaiveDate>,

    /// Latest publication date (YYYY-MM-DD)
    #[arg(long)]
    max_date: Option<NaiveDate>,

    /// Keywords that must all be present
    #[arg(long, value_delimiter = ',')]
    keywords: Vec<String>,

    /// MeSH terms that must all be present
    #[arg(long, value_delimiter = ',')]
    mesh_terms: Vec<String>,

    /// Author last names; any match accepts
    #[arg(long, value_delimiter = ',')]
    authors: Vec<String>,

    /// Fetch citation counts
    #[arg(long)]
    retrieve_citations: bool,

    /// Download full-text PDFs
    #[arg(long)]
    download_pdf: bool,

    /// Convert PDFs to markdown (implies --download-pdf)
    #[arg(long)]
    convert_to_markdown: bool,

    /// Only print accepted papers
    #[arg(long)]
    accepted_only: bool,

    /// Papers processed in parallel
    #[arg(long, env = "PUBMED_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Stop starting new papers after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Output format
    #[arg(long, default_value = "markdown")]
    format: ResponseFormat,

    /// Also write the full batch result as JSON to this path
    #[arg(long)]
    output_json: Option<PathBuf>,
}

impl SearchArgs {
    fn criteria(&self) -> SearchCriteria {
        let date_range = (self.min_date.is_some() || self.max_date.is_some())
            .then(|| DateRange::new(self.min_date, self.max_date));
        let filter = PaperFilter {
            date_range,
            required_keywords: self.keywords.clone(),
            required_mesh_terms: self.mesh_terms.clone(),
            author_names: self.authors.clone(),
            ..PaperFilter::unrestricted()
                .with_tiers(self.journal_tiers.iter().copied())
                .with_study_types(self.study_types.iter().copied())
                .with_min_citations(self.min_citations)
        };

        SearchCriteria {
            retrieve_citations: self.retrieve_citations,
            download_pdf: self.download_pdf,
            convert_to_markdown: self.convert_to_markdown,
            accepted_only: self.accepted_only,
            ..SearchCriteria::new(self.query.clone())
                .with_max_results(self.max_results)
                .with_filter(filter)
        }
    }
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr)).init();
    }
}

fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::from_env_unvalidated()?;
    if let Some(email) = &cli.email {
        config.email.clone_from(email);
    }
    if let Some(key) = &cli.api_key {
        config = config.with_api_key(key.clone());
    }
    if let Some(dir) = &cli.pdf_dir {
        config.pdf_dir.clone_from(dir);
    }
    if let Some(dir) = &cli.markdown_dir {
        config.markdown_dir.clone_from(dir);
    }
    let mut config = config.with_journal_tiers(&cli.journal_tier_overrides)?;
    if let Command::Search(args) = &cli.command {
        if let Some(n) = args.concurrency {
            config.concurrency = n;
        }
    }
    config.validate()?;
    Ok(config)
}

async fn run_search(pipeline: Pipeline, args: &SearchArgs) -> anyhow::Result<()> {
    let cancel = CancelHandle::new();
    let mut control = RunControl::default().with_cancel(cancel.clone());
    if let Some(secs) = args.deadline_secs {
        control = control.with_deadline(Duration::from_secs(secs));
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing papers in flight");
            cancel.cancel();
        }
    });

    let batch = pipeline.run_with(&args.criteria(), control).await?;

    if let Some(path) = &args.output_json {
        let json = serde_json::to_vec_pretty(&batch)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "batch result written");
    }

    println!("{}", render_batch(&batch, args.format));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting PubMed Harvest");

    let config = build_config(&cli)?;
    tracing::info!(
        requests_per_second = config.requests_per_second,
        concurrency = config.concurrency,
        pdf_dir = %config.pdf_dir.display(),
        "Configuration loaded"
    );
    let pipeline = Pipeline::new(config).await?;

    match &cli.command {
        Command::Search(args) => run_search(pipeline, args).await?,
        Command::Serve { port } => pubmed_harvest::server::serve(pipeline, *port).await?,
    }

    Ok(())
}
