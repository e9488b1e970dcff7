//! CLI binary for mrtp.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, checks every collaborator before the first document,
//! and writes the dataset.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use mrtp::{
    discover_documents, prepare_output, probe_endpoint, write_failures, write_reports, KeyPolicy,
    PdfiumBackend, Pipeline, PipelineConfig, PipelineProgressCallback, ProgressCallback,
    ProviderClient, SofficeConverter, Stage,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over documents, one log line per
/// finished document.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} reports  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed(&self) -> String {
        let secs = self
            .started
            .lock()
            .ok()
            .and_then(|s| *s)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_documents} report(s)"))
        ));
    }

    fn on_document_start(&self, _index: usize, _total: usize, name: &str) {
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_stage(&self, _index: usize, stage: Stage) {
        self.bar.set_message(stage.to_string());
    }

    fn on_ocr_page(&self, _index: usize, page: usize, pages: usize) {
        self.bar.set_message(format!("OCR page {page}/{pages}"));
    }

    fn on_document_complete(&self, index: usize, total: usize, name: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index,
            total,
            name,
            self.elapsed()
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, name: &str, stage: Stage, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index,
            total,
            name,
            red(&format!("[{stage}] {msg}")),
            self.elapsed()
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let failed = total_documents.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} report(s) processed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} report(s) processed  ({} failed)",
                if failed == total_documents {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process a directory of reports with a local LM Studio server
  mrtp --input-dir ./reports --output-file ./dataset.json

  # Scanned reports: skip the text layer entirely
  mrtp --input-dir ./scans --output-file ./scans.json --force-ocr

  # Keep Russian organ names as keys in every language
  mrtp --input-dir ./reports --output-file ./dataset.json --key-policy preserve

  # Record failed documents next to the dataset
  mrtp --input-dir ./reports --output-file ./dataset.json --failures-file ./failed.json

  # Ollama with a separate vision model for OCR
  mrtp --provider ollama --model gemma3:12b --vision-model qwen2.5vl:7b \
       --input-dir ./reports --output-file ./dataset.json

INPUT LAYOUT:
  reports/
    Группа 1/          ← patient_group of every report below
      report_001.docx
      report_002.pdf
    Группа 2/
      ...

  Supported: .docx .doc .odt .rtf (converted with LibreOffice) and .pdf.
  Word lock files (~$*.docx) and hidden files are ignored.

ENVIRONMENT VARIABLES:
  LMSTUDIO_HOST             LM Studio base URL (default http://localhost:1234)
  OLLAMA_HOST               Ollama base URL (default http://localhost:11434)
  OPENAI_API_KEY            OpenAI API key (--provider openai)
  PDFIUM_DYNAMIC_LIB_PATH   Path to the libpdfium shared library
  RUST_LOG                  Override the log filter
"#;

/// Turn Russian medical reports into a multilingual JSON dataset.
#[derive(Parser, Debug)]
#[command(
    name = "mrtp",
    version,
    about = "Turn Russian medical reports into a multilingual JSON dataset",
    long_about = "Extract patient fields and per-organ descriptions from Russian medical \
report documents (Word or PDF, text or scanned), translate them to English and Kazakh, \
label each description as normal (0) or pathological (1), and write one JSON array.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory of report documents, one subdirectory per patient group.
    #[arg(long, env = "MRTP_INPUT_DIR")]
    input_dir: PathBuf,

    /// Where to write the JSON array of reports.
    #[arg(long, env = "MRTP_OUTPUT_FILE")]
    output_file: PathBuf,

    /// Skip the PDF text layer and always OCR.
    #[arg(
        long,
        env = "MRTP_FORCE_OCR",
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    force_ocr: bool,

    /// LLM provider: lmstudio, ollama, openai, anthropic, gemini, …
    #[arg(long, env = "MRTP_PROVIDER", default_value = "lmstudio")]
    provider: String,

    /// Model for extraction, translation and labeling.
    #[arg(long, env = "MRTP_MODEL", default_value = "google/gemma-3-12b")]
    model: String,

    /// Vision model for OCR. Defaults to --model.
    #[arg(long, env = "MRTP_VISION_MODEL")]
    vision_model: Option<String>,

    /// Rendering DPI for OCR (72–600).
    #[arg(long, env = "MRTP_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Text layers shorter than this (trimmed chars) are treated as scans.
    #[arg(long, env = "MRTP_MIN_TEXT_CHARS", default_value_t = 50)]
    min_text_chars: usize,

    /// Organ names in translations: translate or preserve.
    #[arg(long, env = "MRTP_KEY_POLICY", value_enum, default_value = "translate")]
    key_policy: KeyPolicyArg,

    /// Retries on LLM transport failures (0-10).
    #[arg(long, env = "MRTP_MAX_RETRIES", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(0..=10))]
    max_retries: u32,

    /// Per-request LLM timeout in seconds.
    #[arg(long, env = "MRTP_API_TIMEOUT", default_value_t = 180)]
    api_timeout: u64,

    /// Per-document conversion timeout in seconds.
    #[arg(long, env = "MRTP_CONVERT_TIMEOUT", default_value_t = 120)]
    convert_timeout: u64,

    /// LibreOffice executable.
    #[arg(long, env = "MRTP_SOFFICE", default_value = "soffice")]
    soffice: String,

    /// Also write failed documents (file, group, stage, error) here.
    #[arg(long, env = "MRTP_FAILURES_FILE")]
    failures_file: Option<PathBuf>,

    /// Do not probe the local LLM server before starting.
    #[arg(long, env = "MRTP_SKIP_HEALTH_CHECK")]
    skip_health_check: bool,

    /// Disable progress bar.
    #[arg(long, env = "MRTP_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MRTP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MRTP_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum KeyPolicyArg {
    Translate,
    Preserve,
}

impl From<KeyPolicyArg> for KeyPolicy {
    fn from(v: KeyPolicyArg) -> Self {
        match v {
            KeyPolicyArg::Translate => KeyPolicy::Translate,
            KeyPolicyArg::Preserve => KeyPolicy::Preserve,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs unless --verbose is set.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Fatal checks, before any document is touched ─────────────────────
    let documents = discover_documents(&cli.input_dir).context("Invalid input directory")?;
    prepare_output(&cli.output_file).context("Invalid output file")?;
    if let Some(ref path) = cli.failures_file {
        prepare_output(path).context("Invalid failures file")?;
    }

    let pdf = PdfiumBackend::new(config.dpi, config.max_rendered_pixels)
        .context("PDF engine unavailable")?;

    let vision_model = cli.vision_model.as_deref().unwrap_or(&cli.model);
    let text_llm = ProviderClient::from_factory(&cli.provider, &cli.model, &config)
        .context("Failed to create text model client")?;
    let vision_llm = ProviderClient::from_factory(&cli.provider, vision_model, &config)
        .context("Failed to create vision model client")?;

    if !cli.skip_health_check {
        if let Some(url) = probe_endpoint(&cli.provider, 10).await? {
            if !cli.quiet {
                eprintln!("{} LLM endpoint {}", green("✔"), dim(&url));
            }
        }
    }

    let converter = SofficeConverter::from_config(cli.soffice.clone(), &config);

    // ── Run ──────────────────────────────────────────────────────────────
    let start = Instant::now();
    let pipeline = Pipeline::new(converter, pdf, text_llm, vision_llm, config);
    let output = pipeline.run_documents(&documents).await;

    write_reports(&cli.output_file, &output.reports).context("Failed to write dataset")?;
    if let Some(ref path) = cli.failures_file {
        write_failures(path, &output.failures).context("Failed to write failures file")?;
    }

    if !cli.quiet {
        eprintln!(
            "{}  {}/{} reports  {:.1}s  →  {}",
            if output.failures.is_empty() {
                green("✔")
            } else {
                cyan("⚠")
            },
            output.reports.len(),
            output.total(),
            start.elapsed().as_secs_f64(),
            bold(&cli.output_file.display().to_string()),
        );
        for failure in &output.failures {
            eprintln!(
                "   {} {}/{}  {}",
                red("✗"),
                failure.patient_group,
                failure.source_file,
                dim(&format!("[{}] {}", failure.stage, failure.error)),
            );
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .force_ocr(cli.force_ocr)
        .min_text_chars(cli.min_text_chars)
        .dpi(cli.dpi)
        .key_policy(cli.key_policy.clone().into())
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .convert_timeout_secs(cli.convert_timeout);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
