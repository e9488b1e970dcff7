//! Error types for the mrtp library.
//!
//! Two tiers of failure, matching the two ways a batch can go wrong:
//!
//! * [`MrtpError`] (**fatal**): the run cannot start or cannot deliver its
//!   output (missing input directory, unwritable output path, unreachable
//!   LLM endpoint). Returned before any document is touched, or when the
//!   final file cannot be written.
//!
//! * [`StageError`] (**per-document**): one document failed at one stage.
//!   The orchestrator catches it at the document boundary, records a
//!   [`crate::output::DocumentFailure`] and moves on to the next document.
//!
//! Stage errors wrap narrower error types ([`ConversionError`],
//! [`ExtractionError`], [`OcrError`], [`LlmStageError`]) so logs can say
//! exactly what broke without a catch-all string.

use crate::config::Language;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the mrtp library.
#[derive(Debug, Error)]
pub enum MrtpError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input directory does not exist.
    #[error("Input directory not found: '{path}'")]
    InputDirNotFound { path: PathBuf },

    /// The input path exists but is not a directory.
    #[error("Input path is not a directory: '{path}'")]
    NotADirectory { path: PathBuf },

    /// The input directory could not be listed.
    #[error("Failed to scan '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The output location cannot be created or written.
    #[error("Output path '{path}' is not writable: {source}")]
    OutputNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the final JSON file failed.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The aggregate could not be serialised.
    #[error("Failed to serialise output: {0}")]
    Serialise(#[from] serde_json::Error),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider could not be created (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The local inference server did not answer the startup probe.
    #[error("LLM endpoint '{url}' is unreachable: {reason}\nStart the inference server or pass --skip-health-check.")]
    EndpointUnreachable { url: String, reason: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_DYNAMIC_LIB_PATH=/path/to/libpdfium or place the library next to the executable."
    )]
    PdfiumBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// The source document could not be turned into a PDF.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The converter executable is not installed or not on `PATH`.
    #[error("converter '{program}' not found; install LibreOffice or pass --soffice")]
    ConverterMissing { program: String },

    /// The converter ran but exited unsuccessfully.
    #[error("converter exited with {status}: {stderr}")]
    ConverterFailed { status: String, stderr: String },

    /// The converter did not finish in time and was killed.
    #[error("converter timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The converter reported success but produced no PDF.
    #[error("converter produced no PDF at '{path}'")]
    MissingOutput { path: PathBuf },

    /// Temp-dir creation or process spawn failed.
    #[error("I/O error during conversion: {0}")]
    Io(#[from] std::io::Error),
}

/// Direct text extraction failed, or no text could be obtained at all.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// pdfium could not open the document.
    #[error("cannot open PDF '{path}': {detail}")]
    OpenFailed { path: PathBuf, detail: String },

    /// The text layer of a page could not be read.
    #[error("text layer unreadable on page {page}: {detail}")]
    PageText { page: usize, detail: String },

    /// Neither direct extraction nor OCR produced any text.
    #[error("no text could be extracted")]
    Empty,

    /// The blocking extraction task panicked.
    #[error("extraction task failed: {0}")]
    Internal(String),
}

/// Page rasterisation or vision transcription failed.
#[derive(Debug, Error)]
pub enum OcrError {
    /// pdfium could not open or render the document.
    #[error("rasterisation failed on page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The document has no pages to transcribe.
    #[error("document has no pages")]
    NoPages,

    /// A rendered page could not be encoded for upload.
    #[error("page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// The vision request for a page failed.
    #[error("page {page}: vision request failed: {source}")]
    Page {
        page: usize,
        #[source]
        source: LlmError,
    },

    /// The blocking render task panicked.
    #[error("render task failed: {0}")]
    Internal(String),
}

/// A single LLM call failed.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Network, HTTP, or provider-side error.
    #[error("transport error after {attempts} attempt(s): {detail}")]
    Transport { attempts: u32, detail: String },

    /// The call exceeded the per-request timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The model answered with no content.
    #[error("model returned an empty response")]
    EmptyResponse,
}

impl LlmError {
    /// Transport failures and timeouts may clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Transport { .. } | LlmError::Timeout { .. })
    }
}

/// A text-LLM stage failed: transport, parsing, or validation.
#[derive(Debug, Error)]
pub enum LlmStageError {
    /// The request itself failed.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The response is not a JSON object.
    #[error("malformed JSON response: {detail} (response starts with {snippet:?})")]
    MalformedJson { detail: String, snippet: String },

    /// The response key set differs from the request key set.
    #[error("key set mismatch: missing {missing:?}, unexpected {unexpected:?}")]
    KeyMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// A value for a key is not acceptable.
    #[error("invalid value for key '{key}': {detail}")]
    InvalidValue { key: String, detail: String },

    /// A required top-level field is absent.
    #[error("response has no '{0}' field")]
    MissingField(&'static str),
}

/// A per-document failure, tagged with the stage that produced it.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("text extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),

    #[error("structured extraction failed: {0}")]
    ExtractionLlm(#[source] LlmStageError),

    #[error("translation to {language} failed: {source}")]
    TranslationLlm {
        language: Language,
        #[source]
        source: LlmStageError,
    },

    #[error("labeling failed: {0}")]
    LabelingLlm(#[source] LlmStageError),
}
