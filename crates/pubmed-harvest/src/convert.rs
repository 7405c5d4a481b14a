//! PDF to markdown conversion.
//!
//! Conversion is a collaborator behind [`MarkdownConverter`]. The default
//! [`PdfTextConverter`] extracts the text layer page by page and emits one
//! section per page; it does not attempt layout or table recovery.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::ConversionError;

/// Turns PDF bytes into markdown.
#[async_trait]
pub trait MarkdownConverter: Send + Sync {
    /// Convert `pdf`, using `title` for the document heading.
    async fn convert(&self, pdf: &[u8], title: &str) -> Result<String, ConversionError>;
}

/// Text-layer extraction with `pdf-extract`, run on a blocking thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextConverter;

#[async_trait]
impl MarkdownConverter for PdfTextConverter {
    async fn convert(&self, pdf: &[u8], title: &str) -> Result<String, ConversionError> {
        let bytes = pdf.to_vec();
        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
                .map_err(|e| ConversionError::Parse(e.to_string()))
        })
        .await
        .map_err(|e| ConversionError::Task(e.to_string()))??;

        render_pages(title, &pages)
    }
}

static HYPHEN_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\p{L})-\n(\p{Ll})").expect("valid hyphenation pattern"));
static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid whitespace pattern"));
static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n(\s*\n)+").expect("valid blank-line pattern"));

/// Assemble extracted page text into a markdown document.
///
/// Fails with [`ConversionError::Empty`] when no page carries text.
pub fn render_pages(title: &str, pages: &[String]) -> Result<String, ConversionError> {
    let mut out = format!("# {}\n", title.trim());
    let mut any_text = false;

    for (i, page) in pages.iter().enumerate() {
        let text = normalize_text(page);
        if text.is_empty() {
            continue;
        }
        any_text = true;
        out.push_str(&format!("\n## Page {}\n\n{}\n", i + 1, text));
    }

    if any_text { Ok(out) } else { Err(ConversionError::Empty) }
}

/// Join hyphenated line breaks, collapse inline whitespace and blank runs.
#[must_use]
pub fn normalize_text(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let text = HYPHEN_BREAK.replace_all(&text, "$1$2");
    let text = INLINE_SPACE.replace_all(&text, " ");
    let text: String = text.lines().map(str::trim).collect::<Vec<_>>().join("\n");
    BLANK_RUNS.replace_all(&text, "\n\n").trim().to_string()
}
