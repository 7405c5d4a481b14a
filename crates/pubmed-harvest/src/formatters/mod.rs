//! Output formatting for batch results and single papers.

mod json;
mod markdown;

pub use json::{compact_batch, compact_paper};
pub use markdown::{format_batch_markdown, format_paper_markdown};

use crate::models::ResponseFormat;
use crate::pipeline::BatchResult;

/// Render a batch in the requested format.
#[must_use]
pub fn render_batch(batch: &BatchResult, format: ResponseFormat) -> String {
    match format {
        ResponseFormat::Markdown => format_batch_markdown(batch),
        ResponseFormat::Json => serde_json::to_string_pretty(&compact_batch(batch))
            .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}")),
    }
}
