//! # mrtp
//!
//! Turn a directory of Russian medical report documents into one
//! multilingual JSON dataset.
//!
//! Each report is converted to PDF, its text is taken from the PDF text
//! layer or, for scans, transcribed page by page by a vision model. A text
//! model then extracts patient fields and per-organ descriptions, translates
//! them to English and Kazakh, and labels every description 0 (no finding)
//! or 1 (pathological finding).
//!
//! ## Pipeline Overview
//!
//! ```text
//! input dir
//!  │
//!  ├─ 1. Discover   walk the tree, patient group = parent directory
//!  ├─ 2. Convert    docx/doc/odt/rtf → PDF via soffice (temp dir)
//!  ├─ 3. Text       pdfium text layer, or OCR when < 50 chars
//!  ├─ 4. Extract    patient_id / age / gender + captions_ru
//!  ├─ 5. Translate  captions_en, captions_kz (key sets checked)
//!  ├─ 6. Label      0/1 per English caption
//!  └─ 7. Output     JSON array, one element per successful report
//! ```
//!
//! A document that fails at any step is logged and left out; the batch
//! always runs to the end.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mrtp::{write_reports, PdfiumBackend, Pipeline, PipelineConfig, ProviderClient, SofficeConverter};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let llm = ProviderClient::from_factory("lmstudio", "google/gemma-3-12b", &config)?;
//!     let pipeline = Pipeline::new(
//!         SofficeConverter::default(),
//!         PdfiumBackend::new(config.dpi, config.max_rendered_pixels)?,
//!         llm.clone(),
//!         llm,
//!         config,
//!     );
//!     let output = pipeline.run(Path::new("reports")).await?;
//!     write_reports(Path::new("dataset.json"), &output.reports)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mrtp` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! mrtp = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

#[cfg(test)]
pub(crate) mod test_support;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{prepare_output, write_failures, write_reports, DocumentState, Pipeline};
pub use config::{KeyPolicy, Language, PipelineConfig, PipelineConfigBuilder};
pub use error::{
    ConversionError, ExtractionError, LlmError, LlmStageError, MrtpError, OcrError, StageError,
};
pub use output::{
    BatchOutput, Captions, DocumentFailure, ExtractedRecord, KeyMapping, Labels, PatientInfo,
    ReportResult, Stage, TranslatedRecord,
};
pub use pipeline::discover::{discover_documents, Document};
pub use pipeline::document::{ConvertedPdf, DocumentConverter, SofficeConverter};
pub use pipeline::llm::{probe_endpoint, LlmClient, LlmRequest, ProviderClient, RequestKind};
pub use pipeline::pdf::{PdfBackend, PdfiumBackend};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
