//! OCR engine: rasterise every page and transcribe it with the vision model.
//!
//! Pages are transcribed one after another, in page order. A failed page
//! fails the whole document: a transcript with a hole in it would silently
//! shift organ descriptions around in the extraction stage.

use crate::config::PipelineConfig;
use crate::error::OcrError;
use crate::pipeline::encode::encode_page;
use crate::pipeline::llm::{LlmClient, LlmRequest, RequestKind};
use crate::pipeline::pdf::PdfBackend;
use crate::pipeline::response::strip_code_fences;
use crate::prompts::OCR_PROMPT;
use std::path::Path;
use tracing::{debug, info, warn};

/// Separator between page transcriptions.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Transcript of a scanned document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrTranscript {
    pub text: String,
    pub pages: usize,
}

/// Transcribe every page of `pdf`.
///
/// `on_page(page, pages)` is called before each page request (1-based).
pub async fn ocr_document<P, L>(
    pdf: &Path,
    backend: &P,
    vision: &L,
    config: &PipelineConfig,
    on_page: &(dyn Fn(usize, usize) + Sync),
) -> Result<OcrTranscript, OcrError>
where
    P: PdfBackend,
    L: LlmClient,
{
    let images = backend.render_pages(pdf).await?;
    if images.is_empty() {
        return Err(OcrError::NoPages);
    }

    let pages = images.len();
    info!("Performing OCR on {} page(s)", pages);

    let mut texts = Vec::with_capacity(pages);
    for (idx, image) in images.iter().enumerate() {
        let page = idx + 1;
        on_page(page, pages);
        debug!("OCR page {}/{}", page, pages);

        let data = encode_page(image).map_err(|e| OcrError::EncodeFailed {
            page,
            detail: e.to_string(),
        })?;

        let request = LlmRequest::vision(
            RequestKind::Ocr { page },
            OCR_PROMPT,
            data,
            config.ocr_max_tokens,
        );
        let raw = vision
            .complete(&request)
            .await
            .map_err(|source| OcrError::Page { page, source })?;

        let text = strip_code_fences(&raw);
        if text.is_empty() {
            warn!("OCR page {} produced no text", page);
        }
        texts.push(text);
    }

    Ok(OcrTranscript {
        text: texts.join(PAGE_SEPARATOR),
        pages,
    })
}
