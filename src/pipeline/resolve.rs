//! Text source resolution: direct text layer or OCR, per document.
//!
//! Word-generated PDFs carry a text layer and need no model at all. Reports
//! that were scanned, or pasted into Word as screenshots, come out with an
//! empty or near-empty text layer; those go through the OCR engine. The
//! cut-off is [`PipelineConfig::min_text_chars`] characters of trimmed text.
//! A legitimately tiny report is routed to OCR too; the threshold is a
//! heuristic and that outcome is accepted.

use crate::config::PipelineConfig;
use crate::error::{ExtractionError, StageError};
use crate::pipeline::llm::LlmClient;
use crate::pipeline::ocr::ocr_document;
use crate::pipeline::pdf::PdfBackend;
use std::path::Path;
use tracing::{debug, info};

/// Where the raw text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    Direct,
    Ocr { pages: usize },
}

/// The raw report text of one document. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawText {
    pub text: String,
    pub source: TextSource,
}

/// Produce the raw text of `pdf`, falling back to OCR when needed.
pub async fn resolve_text<P, L>(
    pdf: &Path,
    backend: &P,
    vision: &L,
    config: &PipelineConfig,
    on_page: &(dyn Fn(usize, usize) + Sync),
) -> Result<RawText, StageError>
where
    P: PdfBackend,
    L: LlmClient,
{
    if config.force_ocr {
        debug!("OCR forced, skipping text layer");
    } else {
        let text = backend.extract_text(pdf).await?;
        let chars = text.trim().chars().count();
        if chars >= config.min_text_chars {
            info!("Using text layer ({} chars)", chars);
            return Ok(RawText {
                text,
                source: TextSource::Direct,
            });
        }
        info!(
            "Text layer too short ({} < {} chars), falling back to OCR",
            chars, config.min_text_chars
        );
    }

    let transcript = ocr_document(pdf, backend, vision, config, on_page).await?;
    if transcript.text.trim().is_empty() {
        return Err(ExtractionError::Empty.into());
    }

    Ok(RawText {
        text: transcript.text,
        source: TextSource::Ocr {
            pages: transcript.pages,
        },
    })
}
