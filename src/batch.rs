//! Batch orchestration: drive every discovered document through the stages
//! and collect the aggregate.
//!
//! Documents are processed one at a time, in discovery order. Each moves
//! through
//!
//! ```text
//! Discovered → Converted → TextExtracted → DataExtracted → Translated → Labeled → Aggregated
//!      └────────────┴────────────┴──────────────┴──────────────┴───────────┴──▶ Failed(stage)
//! ```
//!
//! A failure at any stage is caught here, logged with the file name and the
//! stage, and the batch moves on. Only discovery errors abort a run.

use crate::config::{Language, PipelineConfig};
use crate::error::{MrtpError, StageError};
use crate::output::{BatchOutput, DocumentFailure, ReportResult, Stage};
use crate::pipeline::discover::{discover_documents, Document};
use crate::pipeline::document::DocumentConverter;
use crate::pipeline::extract::extract_record;
use crate::pipeline::label::label_captions;
use crate::pipeline::llm::LlmClient;
use crate::pipeline::pdf::PdfBackend;
use crate::pipeline::resolve::{resolve_text, TextSource};
use crate::pipeline::translate::translate;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Where a document is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Discovered,
    Converted,
    TextExtracted,
    DataExtracted,
    Translated,
    Labeled,
    Aggregated,
    Failed(Stage),
}

impl DocumentState {
    /// The stage that moves a document out of this state.
    pub fn pending_stage(self) -> Option<Stage> {
        match self {
            DocumentState::Discovered => Some(Stage::Conversion),
            DocumentState::Converted => Some(Stage::TextExtraction),
            DocumentState::TextExtracted => Some(Stage::DataExtraction),
            DocumentState::DataExtracted => Some(Stage::Translation),
            DocumentState::Translated => Some(Stage::Labeling),
            DocumentState::Labeled | DocumentState::Aggregated | DocumentState::Failed(_) => None,
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentState::Failed(stage) => write!(f, "failed ({stage})"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

/// The report pipeline with its collaborators.
///
/// `text_llm` serves extraction, translation and labeling; `vision_llm`
/// serves OCR. Both may point at the same model.
pub struct Pipeline<C, P, L> {
    converter: C,
    pdf: P,
    text_llm: L,
    vision_llm: L,
    config: PipelineConfig,
}

impl<C, P, L> Pipeline<C, P, L>
where
    C: DocumentConverter,
    P: PdfBackend,
    L: LlmClient,
{
    pub fn new(converter: C, pdf: P, text_llm: L, vision_llm: L, config: PipelineConfig) -> Self {
        Self {
            converter,
            pdf,
            text_llm,
            vision_llm,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Discover and process every document under `input_dir`.
    ///
    /// # Errors
    /// Only discovery errors (missing or unreadable input directory) are
    /// returned. Per-document failures end up in [`BatchOutput::failures`].
    pub async fn run(&self, input_dir: &Path) -> Result<BatchOutput, MrtpError> {
        let documents = discover_documents(input_dir)?;
        Ok(self.run_documents(&documents).await)
    }

    /// Process an already discovered document list, in order.
    pub async fn run_documents(&self, documents: &[Document]) -> BatchOutput {
        let total = documents.len();
        let batch_start = Instant::now();
        let cb = self.config.progress_callback.as_ref();

        if let Some(cb) = cb {
            cb.on_batch_start(total);
        }
        info!("Processing {} document(s)", total);

        let mut output = BatchOutput::default();

        for (i, document) in documents.iter().enumerate() {
            let index = i + 1;
            let name = document.file_name();
            if let Some(cb) = cb {
                cb.on_document_start(index, total, &name);
            }
            info!("[{}/{}] {} ({})", index, total, name, document.patient_group);

            let mut state = DocumentState::Discovered;
            match self.process_document(index, document, &mut state).await {
                Ok(report) => {
                    state = DocumentState::Aggregated;
                    debug!("{}: {}", name, state);
                    output.reports.push(report);
                    if let Some(cb) = cb {
                        cb.on_document_complete(index, total, &name);
                    }
                }
                Err(e) => {
                    let stage = state.pending_stage().unwrap_or(Stage::Labeling);
                    state = DocumentState::Failed(stage);
                    let error = e.to_string();
                    warn!(
                        document = %name,
                        stage = %stage,
                        "[{}/{}] {}: {}",
                        index,
                        total,
                        state,
                        error
                    );
                    if let Some(cb) = cb {
                        cb.on_document_error(index, total, &name, stage, &error);
                    }
                    output.failures.push(DocumentFailure {
                        source_file: name,
                        patient_group: document.patient_group.clone(),
                        stage,
                        error,
                    });
                }
            }
        }

        info!(
            "Batch complete: {}/{} document(s) processed in {:?}",
            output.reports.len(),
            total,
            batch_start.elapsed()
        );
        if let Some(cb) = cb {
            cb.on_batch_complete(total, output.reports.len());
        }
        output
    }

    /// Run one document through every stage. `state` tracks the last
    /// completed transition so the caller can tell where a failure happened.
    async fn process_document(
        &self,
        index: usize,
        document: &Document,
        state: &mut DocumentState,
    ) -> Result<ReportResult, StageError> {
        let start = Instant::now();
        let name = document.file_name();

        self.enter(index, Stage::Conversion);
        let pdf = self.converter.convert(document).await?;
        *state = DocumentState::Converted;

        self.enter(index, Stage::TextExtraction);
        let on_page = |page: usize, pages: usize| {
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_ocr_page(index, page, pages);
            }
        };
        let raw = resolve_text(pdf.path(), &self.pdf, &self.vision_llm, &self.config, &on_page).await?;
        drop(pdf);
        *state = DocumentState::TextExtracted;
        match raw.source {
            TextSource::Direct => debug!("{}: text layer, {} chars", name, raw.text.chars().count()),
            TextSource::Ocr { pages } => debug!("{}: OCR, {} page(s)", name, pages),
        }

        self.enter(index, Stage::DataExtraction);
        let extracted = extract_record(&raw.text, &self.text_llm, &self.config).await?;
        *state = DocumentState::DataExtracted;

        self.enter(index, Stage::Translation);
        let english = translate(&extracted.captions, Language::English, &self.text_llm, &self.config).await?;
        let kazakh = translate(&extracted.captions, Language::Kazakh, &self.text_llm, &self.config).await?;
        *state = DocumentState::Translated;

        self.enter(index, Stage::Labeling);
        let labels = label_captions(&english.captions, &self.text_llm, &self.config).await?;
        *state = DocumentState::Labeled;

        debug!("{}: done in {:?}", name, start.elapsed());
        Ok(ReportResult::assemble(
            name,
            document.patient_group.clone(),
            extracted,
            english,
            kazakh,
            labels,
        ))
    }

    fn enter(&self, index: usize, stage: Stage) {
        debug!("Document {}: {}", index, stage);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage(index, stage);
        }
    }
}

// ── Output files ─────────────────────────────────────────────────────────

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Make sure `path` can be written before any document is processed.
///
/// Creates missing parent directories and probes them with a temp file.
pub fn prepare_output(path: &Path) -> Result<(), MrtpError> {
    let not_writable = |source| MrtpError::OutputNotWritable {
        path: path.to_path_buf(),
        source,
    };
    if path.is_dir() {
        return Err(not_writable(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path is a directory",
        )));
    }
    let parent = parent_dir(path);
    std::fs::create_dir_all(&parent).map_err(not_writable)?;
    NamedTempFile::new_in(&parent).map_err(not_writable)?;
    Ok(())
}

/// Write the report array as 4-space indented UTF-8 JSON.
///
/// Uses atomic write (temp file + rename) so a crash never leaves a
/// truncated dataset behind.
pub fn write_reports(path: &Path, reports: &[ReportResult]) -> Result<(), MrtpError> {
    write_json(path, reports)?;
    info!("Wrote {} report(s) to {}", reports.len(), path.display());
    Ok(())
}

/// Write the failure list next to the dataset.
pub fn write_failures(path: &Path, failures: &[DocumentFailure]) -> Result<(), MrtpError> {
    write_json(path, failures)?;
    info!("Wrote {} failure(s) to {}", failures.len(), path.display());
    Ok(())
}

/// Serialise `value` the way every output file is written.
pub fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, MrtpError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    buf.push(b'\n');
    Ok(buf)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), MrtpError> {
    let write_failed = |source| MrtpError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let bytes = to_json_pretty(value)?;
    let parent = parent_dir(path);
    std::fs::create_dir_all(&parent).map_err(write_failed)?;

    let mut tmp = NamedTempFile::new_in(&parent).map_err(write_failed)?;
    tmp.write_all(&bytes).map_err(write_failed)?;
    tmp.flush().map_err(write_failed)?;
    tmp.persist(path).map_err(|e| write_failed(e.error))?;
    Ok(())
}
