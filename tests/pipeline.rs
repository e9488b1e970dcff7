//! Batch-level tests with scripted collaborators.
//!
//! Documents are real files in a temp directory (so discovery runs for
//! real), but conversion, pdfium and the model are in-process fakes.

use mrtp::{
    write_reports, ConversionError, ConvertedPdf, Document, DocumentConverter, ExtractionError,
    KeyPolicy, Language, LlmClient, LlmError, LlmRequest, MrtpError, OcrError, PdfBackend,
    Pipeline, PipelineConfig, RequestKind, Stage,
};
use image::{DynamicImage, RgbaImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────────

struct PassThrough;

impl DocumentConverter for PassThrough {
    async fn convert(&self, document: &Document) -> Result<ConvertedPdf, ConversionError> {
        Ok(ConvertedPdf::Original(document.path.clone()))
    }
}

/// Text layer per file name; unknown files have an empty text layer.
/// Counters are shared so tests can read them after the pipeline took
/// ownership of the backend.
#[derive(Default)]
struct FakePdf {
    text: HashMap<String, String>,
    text_reads: Arc<AtomicUsize>,
    renders: Arc<AtomicUsize>,
}

impl FakePdf {
    fn with(mut self, file: &str, text: &str) -> Self {
        self.text.insert(file.to_string(), text.to_string());
        self
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl PdfBackend for FakePdf {
    async fn extract_text(&self, pdf: &Path) -> Result<String, ExtractionError> {
        self.text_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.get(&file_name(pdf)).cloned().unwrap_or_default())
    }

    async fn render_pages(&self, _pdf: &Path) -> Result<Vec<DynamicImage>, OcrError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(vec![DynamicImage::ImageRgba8(RgbaImage::new(8, 8))])
    }
}

/// Deterministic "model": answers from the prompt, fails extraction for
/// any report containing `BROKEN`.
#[derive(Default)]
struct FakeModel {
    log: Arc<Mutex<Vec<RequestKind>>>,
}

fn count(log: &Mutex<Vec<RequestKind>>, pred: impl Fn(&RequestKind) -> bool) -> usize {
    log.lock().unwrap().iter().filter(|k| pred(k)).count()
}

const EXTRACTION: &str = r#"{
    "patient_id": "A-17",
    "age": 63,
    "gender": "М",
    "captions_ru": {
        "Печень": "Контуры ровные, эхогенность повышена.",
        "Почки": "Без особенностей.",
        "conclusion": "Умеренные диффузные изменения печени."
    }
}"#;

impl LlmClient for FakeModel {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.log.lock().unwrap().push(request.kind);
        let answer = match request.kind {
            RequestKind::Ocr { .. } => {
                "Печень: контуры ровные, эхогенность повышена. Почки: без особенностей. \
                 Заключение: умеренные диффузные изменения печени."
            }
            RequestKind::Extraction if request.prompt.contains("BROKEN") => {
                "К сожалению, я не могу обработать этот текст."
            }
            RequestKind::Extraction => EXTRACTION,
            RequestKind::Translation(Language::English) => {
                if request.prompt.contains("\"key\"") {
                    r#"{"Печень": {"key": "Liver", "text": "Smooth contours, increased echogenicity."},
                        "Почки": {"key": "Kidneys", "text": "No abnormalities detected."},
                        "conclusion": {"key": "conclusion", "text": "Moderate diffuse changes of the liver."}}"#
                } else {
                    r#"{"Печень": "Smooth contours, increased echogenicity.",
                        "Почки": "No abnormalities detected.",
                        "conclusion": "Moderate diffuse changes of the liver."}"#
                }
            }
            RequestKind::Translation(Language::Kazakh) => {
                if request.prompt.contains("\"key\"") {
                    r#"{"Печень": {"key": "Бауыр", "text": "Контурлары тегіс, эхогенділігі жоғары."},
                        "Почки": {"key": "Бүйрек", "text": "Ерекшеліксіз."},
                        "conclusion": {"key": "conclusion", "text": "Бауырдың орташа диффузды өзгерістері."}}"#
                } else {
                    r#"{"Печень": "Контурлары тегіс, эхогенділігі жоғары.",
                        "Почки": "Ерекшеліксіз.",
                        "conclusion": "Бауырдың орташа диффузды өзгерістері."}"#
                }
            }
            RequestKind::Labeling => {
                if request.prompt.contains("\"Liver\"") {
                    r#"{"Liver": 1, "Kidneys": 0, "conclusion": 1}"#
                } else {
                    r#"{"Печень": 1, "Почки": "0", "conclusion": 1}"#
                }
            }
        };
        Ok(answer.to_string())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const LONG_TEXT: &str = "Печень: контуры ровные, эхогенность повышена. Почки: без особенностей. \
Заключение: умеренные диффузные изменения печени.";

/// Three reports in one patient group: a.docx, b.docx, c.docx.
fn input_tree() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let group = dir.path().join("Группа 1");
    std::fs::create_dir_all(&group).unwrap();
    for name in ["a.docx", "b.docx", "c.docx"] {
        std::fs::write(group.join(name), b"stub").unwrap();
    }
    let root = dir.path().to_path_buf();
    (dir, root)
}

fn pipeline(
    pdf: FakePdf,
    config: PipelineConfig,
) -> Pipeline<PassThrough, FakePdf, FakeModel> {
    Pipeline::new(PassThrough, pdf, FakeModel::default(), FakeModel::default(), config)
}

fn all_text() -> FakePdf {
    FakePdf::default()
        .with("a.docx", LONG_TEXT)
        .with("b.docx", LONG_TEXT)
        .with("c.docx", LONG_TEXT)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_document_is_isolated() {
    let (_dir, root) = input_tree();
    let pdf = FakePdf::default()
        .with("a.docx", LONG_TEXT)
        .with("b.docx", &format!("{LONG_TEXT} BROKEN"))
        .with("c.docx", LONG_TEXT);

    let out = pipeline(pdf, PipelineConfig::default()).run(&root).await.unwrap();

    let names: Vec<&str> = out.reports.iter().map(|r| r.source_file.as_str()).collect();
    assert_eq!(names, vec!["a.docx", "c.docx"]);
    assert_eq!(out.failures.len(), 1);
    assert_eq!(out.failures[0].source_file, "b.docx");
    assert_eq!(out.failures[0].stage, Stage::DataExtraction);
    assert!(out.reports.iter().all(|r| r.patient_group == "Группа 1"));
}

#[tokio::test]
async fn short_text_layer_goes_through_ocr() {
    let (_dir, root) = input_tree();
    let pdf = FakePdf::default()
        .with("a.docx", LONG_TEXT)
        .with("b.docx", "Печень: эхогенность повышена.")
        .with("c.docx", LONG_TEXT);
    let renders = pdf.renders.clone();
    let vision = FakeModel::default();
    let vision_log = vision.log.clone();
    let p = Pipeline::new(PassThrough, pdf, FakeModel::default(), vision, PipelineConfig::default());

    let out = p.run(&root).await.unwrap();

    assert_eq!(out.reports.len(), 3);
    assert_eq!(renders.load(Ordering::SeqCst), 1);
    assert_eq!(count(&vision_log, |k| matches!(k, RequestKind::Ocr { .. })), 1);
}

#[tokio::test]
async fn force_ocr_skips_text_layer() {
    let (_dir, root) = input_tree();
    let pdf = all_text();
    let (reads, renders) = (pdf.text_reads.clone(), pdf.renders.clone());
    let text = FakeModel::default();
    let text_log = text.log.clone();
    let config = PipelineConfig::builder().force_ocr(true).build().unwrap();
    let p = Pipeline::new(PassThrough, pdf, text, FakeModel::default(), config);

    let out = p.run(&root).await.unwrap();

    assert_eq!(out.reports.len(), 3);
    assert_eq!(reads.load(Ordering::SeqCst), 0);
    assert_eq!(renders.load(Ordering::SeqCst), 3);
    // one extraction, two translations and one labeling per document
    assert_eq!(count(&text_log, |k| *k == RequestKind::Extraction), 3);
    assert_eq!(count(&text_log, |k| matches!(k, RequestKind::Translation(_))), 6);
    assert_eq!(count(&text_log, |k| *k == RequestKind::Labeling), 3);
}

#[tokio::test]
async fn translated_keys_cover_every_source_key() {
    let (_dir, root) = input_tree();
    let out = pipeline(all_text(), PipelineConfig::default())
        .run(&root)
        .await
        .unwrap();

    for report in &out.reports {
        let n = report.captions_ru.len();
        assert_eq!(report.captions_en.len(), n);
        assert_eq!(report.captions_kz.len(), n);
        assert_eq!(report.labels.len(), n);
        assert_eq!(report.key_map.len(), n);

        for (mapping, ru) in report.key_map.iter().zip(report.captions_ru.keys()) {
            assert_eq!(mapping.ru, ru);
            assert!(report.captions_en.contains_key(&mapping.en));
            assert!(report.captions_kz.contains_key(&mapping.kz));
            assert!(report.labels.get(&mapping.en).is_some());
        }
        assert!(report.labels.iter().all(|(_, v)| v <= 1));
        assert_eq!(report.labels.get("Kidneys"), Some(0));
        assert_eq!(report.labels.get("conclusion"), Some(1));
        assert_eq!(report.age, "63");
    }
}

#[tokio::test]
async fn preserve_policy_keeps_russian_keys_everywhere() {
    let (_dir, root) = input_tree();
    let config = PipelineConfig::builder()
        .key_policy(KeyPolicy::Preserve)
        .build()
        .unwrap();
    let out = pipeline(all_text(), config).run(&root).await.unwrap();

    let report = &out.reports[0];
    let ru: Vec<&str> = report.captions_ru.keys().collect();
    assert_eq!(report.captions_en.keys().collect::<Vec<_>>(), ru);
    assert_eq!(report.captions_kz.keys().collect::<Vec<_>>(), ru);
    assert_eq!(report.labels.keys().collect::<Vec<_>>(), ru);
}

#[tokio::test]
async fn two_runs_write_identical_files() {
    let (_dir, root) = input_tree();
    let out_dir = tempfile::tempdir().unwrap();
    let first = out_dir.path().join("first.json");
    let second = out_dir.path().join("second.json");

    let out = pipeline(all_text(), PipelineConfig::default()).run(&root).await.unwrap();
    write_reports(&first, &out.reports).unwrap();
    let out = pipeline(all_text(), PipelineConfig::default()).run(&root).await.unwrap();
    write_reports(&second, &out.reports).unwrap();

    let a = std::fs::read(&first).unwrap();
    let b = std::fs::read(&second).unwrap();
    assert_eq!(a, b);

    let text = String::from_utf8(a).unwrap();
    assert!(text.starts_with("[\n    {\n        \"source_file\": \"a.docx\""));
    assert!(text.contains("\"patient_group\": \"Группа 1\""));
}

#[tokio::test]
async fn missing_input_dir_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");

    let err = pipeline(FakePdf::default(), PipelineConfig::default())
        .run(&missing)
        .await
        .unwrap_err();

    assert!(matches!(err, MrtpError::InputDirNotFound { .. }));
}

#[tokio::test]
async fn empty_directory_yields_empty_array() {
    let dir = tempfile::tempdir().unwrap();
    let out = pipeline(FakePdf::default(), PipelineConfig::default())
        .run(dir.path())
        .await
        .unwrap();
    assert_eq!(out.total(), 0);

    let path = dir.path().join("out.json");
    write_reports(&path, &out.reports).unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), "[]\n");
}
