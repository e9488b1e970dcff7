//! Pipeline stages for report processing.
//!
//! Each submodule implements one step. External effects sit behind three
//! narrow traits ([`document::DocumentConverter`], [`pdf::PdfBackend`],
//! [`llm::LlmClient`]) so every stage can be tested without LibreOffice,
//! pdfium or a model server.
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ document ──▶ resolve ──────────────▶ extract ──▶ translate ──▶ label
//! (walk dir)   (soffice)    (text layer)     ▲       (ru JSON)   (en, kz)     (0/1)
//!                              │ < 50 chars  │
//!                              └──▶ ocr ─────┘
//!                                  (pdfium → encode → VLM)
//! ```
//!
//! 1. [`discover`]: find report files and their patient group
//! 2. [`document`]: convert office formats to PDF in a temp dir
//! 3. [`resolve`]: use the text layer, or fall back to [`ocr`]
//! 4. [`ocr`]: rasterise with [`pdf`], PNG-encode with [`encode`],
//!    transcribe page by page
//! 5. [`extract`]: patient fields and Russian organ descriptions
//! 6. [`translate`]: English and Kazakh, key sets checked against Russian
//! 7. [`label`]: 0/1 per English description
//!
//! [`llm`] is the only module with network I/O; [`response`] turns raw
//! model text into JSON objects.

pub mod discover;
pub mod document;
pub mod encode;
pub mod extract;
pub mod label;
pub mod llm;
pub mod ocr;
pub mod pdf;
pub mod resolve;
pub mod response;
pub mod translate;
