//! End-to-end test against a live model server.
//!
//! Uses real report documents from `./test_cases/reports/` (one
//! subdirectory per patient group), LibreOffice, pdfium and a running
//! LM Studio (or whatever `MRTP_PROVIDER` names). Gated behind the
//! `E2E_ENABLED` environment variable so it does not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use mrtp::{
    probe_endpoint, write_reports, PdfiumBackend, Pipeline, PipelineConfig, ProviderClient,
    SofficeConverter,
};
use std::path::PathBuf;

fn reports_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/reports")
}

fn output_file() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output/dataset.json")
}

/// Skip unless E2E_ENABLED is set and the report directory exists.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p = reports_dir();
        if !p.is_dir() {
            println!("SKIP — report directory not found: {}", p.display());
            return;
        }
        p
    }};
}

#[tokio::test]
async fn test_process_report_directory() {
    let input = e2e_skip_unless_ready!();

    let provider = std::env::var("MRTP_PROVIDER").unwrap_or_else(|_| "lmstudio".into());
    let model = std::env::var("MRTP_MODEL").unwrap_or_else(|_| "google/gemma-3-12b".into());

    if let Err(e) = probe_endpoint(&provider, 5).await {
        println!("SKIP — {e}");
        return;
    }

    let config = PipelineConfig::default();
    let llm = ProviderClient::from_factory(&provider, &model, &config)
        .expect("provider should be configured");
    let pdf = PdfiumBackend::new(config.dpi, config.max_rendered_pixels)
        .expect("pdfium should be available");
    let pipeline = Pipeline::new(SofficeConverter::default(), pdf, llm.clone(), llm, config);

    let output = pipeline.run(&input).await.expect("discovery should succeed");
    for failure in &output.failures {
        println!(
            "FAILED {}/{} [{}] {}",
            failure.patient_group, failure.source_file, failure.stage, failure.error
        );
    }
    assert!(
        !output.reports.is_empty(),
        "expected at least one processed report out of {}",
        output.total()
    );

    for report in &output.reports {
        let n = report.captions_ru.len();
        assert!(n > 0, "{}: no captions", report.source_file);
        assert_eq!(report.captions_en.len(), n, "{}", report.source_file);
        assert_eq!(report.captions_kz.len(), n, "{}", report.source_file);
        assert_eq!(report.labels.len(), n, "{}", report.source_file);
        assert!(report.labels.iter().all(|(_, v)| v <= 1));
    }

    let out = output_file();
    write_reports(&out, &output.reports).expect("dataset should be written");
    println!(
        "✓ {}/{} reports → {}",
        output.reports.len(),
        output.total(),
        out.display()
    );
}
