//! In-process stand-ins for the pipeline's external collaborators.

use crate::error::{ConversionError, ExtractionError, LlmError, OcrError};
use crate::pipeline::discover::Document;
use crate::pipeline::document::{ConvertedPdf, DocumentConverter};
use crate::pipeline::llm::{LlmClient, LlmRequest};
use crate::pipeline::pdf::PdfBackend;
use image::{DynamicImage, Rgba, RgbaImage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type Responder = Box<dyn Fn(&LlmRequest) -> Result<String, LlmError> + Send + Sync>;

/// LLM client answering from a closure and recording every request.
pub(crate) struct ScriptedLlm {
    respond: Responder,
    log: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub(crate) fn new(
        respond: impl Fn(&LlmRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same text.
    pub(crate) fn fixed(answer: &str) -> Self {
        let answer = answer.to_string();
        Self::new(move |_| Ok(answer.clone()))
    }

    pub(crate) fn calls(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<LlmRequest> {
        self.log.lock().unwrap().clone()
    }
}

impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.log.lock().unwrap().push(request.clone());
        (self.respond)(request)
    }
}

/// PDF backend with a fixed text layer and page count.
pub(crate) struct FakePdf {
    text: String,
    pages: usize,
    pub(crate) text_calls: AtomicUsize,
    pub(crate) render_calls: AtomicUsize,
}

impl FakePdf {
    pub(crate) fn with_text(text: &str, pages: usize) -> Self {
        Self {
            text: text.to_string(),
            pages,
            text_calls: AtomicUsize::new(0),
            render_calls: AtomicUsize::new(0),
        }
    }

    /// A scan: no text layer at all.
    pub(crate) fn scanned(pages: usize) -> Self {
        Self::with_text("", pages)
    }

    pub(crate) fn renders(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn text_reads(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }
}

impl PdfBackend for FakePdf {
    async fn extract_text(&self, _pdf: &Path) -> Result<String, ExtractionError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }

    async fn render_pages(&self, _pdf: &Path) -> Result<Vec<DynamicImage>, OcrError> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        Ok((0..self.pages)
            .map(|_| DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]))))
            .collect())
    }
}

/// Converter that hands every document through untouched, except the
/// named files, which fail as if `soffice` had crashed.
#[derive(Default)]
pub(crate) struct FakeConverter {
    failing: Vec<String>,
}

impl FakeConverter {
    pub(crate) fn failing_on(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

impl DocumentConverter for FakeConverter {
    async fn convert(&self, document: &Document) -> Result<ConvertedPdf, ConversionError> {
        if self.failing.contains(&document.file_name()) {
            return Err(ConversionError::ConverterFailed {
                status: "exit status: 1".into(),
                stderr: "source file could not be loaded".into(),
            });
        }
        Ok(ConvertedPdf::Original(document.path.clone()))
    }
}
