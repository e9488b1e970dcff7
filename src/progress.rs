//! Progress-callback trait for per-document pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to observe
//! the batch as it moves through documents and stages. The library does not
//! know or care whether events end up on a terminal progress bar, in a log
//! file, or nowhere.
//!
//! # Example
//!
//! ```rust
//! use mrtp::{PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, index: usize, total: usize, name: &str) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {}", index, total, name);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//! let config = PipelineConfig::builder()
//!     .progress_callback(cb as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::Stage;
use std::sync::Arc;

/// Called by the orchestrator as it drives each document.
///
/// Processing is sequential, so events for one document never interleave
/// with another's. All methods default to no-ops. Document indices are
/// 1-based.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once after discovery, before the first document.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a document starts processing.
    fn on_document_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when a document enters a new stage.
    fn on_stage(&self, index: usize, stage: Stage) {
        let _ = (index, stage);
    }

    /// Called before each OCR page request (`page` is 1-based).
    fn on_ocr_page(&self, index: usize, page: usize, pages: usize) {
        let _ = (index, page, pages);
    }

    /// Called when a document reached the aggregate.
    fn on_document_complete(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when a document failed and was left out of the aggregate.
    fn on_document_error(&self, index: usize, total: usize, name: &str, stage: Stage, error: &str) {
        let _ = (index, total, name, stage, error);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let _ = (total_documents, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        completes: AtomicUsize,
        errors: AtomicUsize,
        stages: Mutex<Vec<Stage>>,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_stage(&self, _index: usize, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_document_complete(&self, _index: usize, _total: usize, _name: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_error(&self, _i: usize, _t: usize, _n: &str, _s: Stage, _e: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_document_start(1, 2, "a.docx");
        cb.on_stage(1, Stage::Conversion);
        cb.on_ocr_page(1, 1, 3);
        cb.on_document_error(1, 2, "a.docx", Stage::Translation, "boom");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_through_arc_dyn() {
        let tracker = Arc::new(TrackingCallback::default());
        let cb: ProgressCallback = tracker.clone();

        cb.on_stage(1, Stage::Conversion);
        cb.on_stage(1, Stage::TextExtraction);
        cb.on_document_complete(1, 2, "a.docx");
        cb.on_document_error(2, 2, "b.docx", Stage::Labeling, "bad label");

        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(
            *tracker.stages.lock().unwrap(),
            vec![Stage::Conversion, Stage::TextExtraction]
        );
    }
}
