//! Document conversion: turn a source report into a PDF on disk.
//!
//! The converter is an external program (LibreOffice in headless mode).
//! It writes into a fresh [`TempDir`] owned by the returned [`ConvertedPdf`];
//! dropping that value deletes the PDF, so every exit path of the
//! orchestrator (success, stage failure, panic) cleans up after itself.

use crate::config::PipelineConfig;
use crate::error::ConversionError;
use crate::pipeline::discover::Document;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

/// A PDF ready for text extraction.
pub enum ConvertedPdf {
    /// The source was already a PDF.
    Original(PathBuf),
    /// The source was converted; the temp dir is removed on drop.
    Converted { path: PathBuf, _temp_dir: TempDir },
}

impl ConvertedPdf {
    /// Path to the PDF regardless of how it was produced.
    pub fn path(&self) -> &Path {
        match self {
            ConvertedPdf::Original(p) => p,
            ConvertedPdf::Converted { path, .. } => path,
        }
    }
}

/// Narrow conversion seam: source document in, PDF out.
pub trait DocumentConverter: Send + Sync {
    fn convert(
        &self,
        document: &Document,
    ) -> impl Future<Output = Result<ConvertedPdf, ConversionError>> + Send;
}

/// Converts office documents with `soffice --headless --convert-to pdf`.
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    program: String,
    timeout_secs: u64,
}

impl SofficeConverter {
    pub fn new(program: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            timeout_secs,
        }
    }

    /// Converter using the run's conversion timeout.
    pub fn from_config(program: impl Into<String>, config: &PipelineConfig) -> Self {
        Self::new(program, config.convert_timeout_secs)
    }
}

impl Default for SofficeConverter {
    fn default() -> Self {
        Self::from_config("soffice", &PipelineConfig::default())
    }
}

impl DocumentConverter for SofficeConverter {
    async fn convert(&self, document: &Document) -> Result<ConvertedPdf, ConversionError> {
        if document.is_pdf() {
            debug!("{} is already a PDF", document.path.display());
            return Ok(ConvertedPdf::Original(document.path.clone()));
        }

        let temp_dir = TempDir::new()?;
        info!("Converting {} to PDF", document.file_name());

        let mut command = Command::new(&self.program);
        command
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(temp_dir.path())
            .arg(&document.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConversionError::ConverterMissing {
                program: self.program.clone(),
            },
            _ => ConversionError::Io(e),
        })?;

        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| ConversionError::Timeout {
            secs: self.timeout_secs,
        })??;

        if !output.status.success() {
            return Err(ConversionError::ConverterFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let path = temp_dir.path().join(pdf_name_for(&document.path));
        if !path.is_file() {
            return Err(ConversionError::MissingOutput { path });
        }

        debug!("Converted to temporary file {}", path.display());
        Ok(ConvertedPdf::Converted {
            path,
            _temp_dir: temp_dir,
        })
    }
}

/// LibreOffice names the output after the source stem.
fn pdf_name_for(source: &Path) -> PathBuf {
    let mut name = source
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "document".into());
    name.push(".pdf");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(path: &str) -> Document {
        Document {
            path: PathBuf::from(path),
            patient_group: "g".into(),
        }
    }

    #[test]
    fn pdf_name_uses_source_stem() {
        assert_eq!(
            pdf_name_for(Path::new("/in/Отчёт 1.docx")),
            PathBuf::from("Отчёт 1.pdf")
        );
        assert_eq!(pdf_name_for(Path::new("/in/a.b.odt")), PathBuf::from("a.b.pdf"));
    }

    #[test]
    fn timeout_comes_from_config() {
        let config = PipelineConfig::builder()
            .convert_timeout_secs(7)
            .build()
            .unwrap();
        let converter = SofficeConverter::from_config("soffice", &config);
        assert_eq!(converter.timeout_secs, 7);
        assert_eq!(SofficeConverter::default().timeout_secs, 120);
    }

    #[tokio::test]
    async fn pdf_sources_pass_through() {
        let converter = SofficeConverter::new("definitely-not-a-converter", 5);
        let converted = converter.convert(&doc("/in/report.PDF")).await.unwrap();
        assert!(matches!(converted, ConvertedPdf::Original(_)));
        assert_eq!(converted.path(), Path::new("/in/report.PDF"));
    }

    #[tokio::test]
    async fn missing_converter_is_reported() {
        let converter = SofficeConverter::new("definitely-not-a-converter-binary", 5);
        let err = converter.convert(&doc("/in/report.docx")).await;
        assert!(matches!(
            err,
            Err(ConversionError::ConverterMissing { ref program }) if program == "definitely-not-a-converter-binary"
        ));
    }

    #[test]
    fn temp_dir_removed_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("x.pdf");
        std::fs::write(&path, b"%PDF").unwrap();
        let dir = temp_dir.path().to_path_buf();
        let converted = ConvertedPdf::Converted {
            path,
            _temp_dir: temp_dir,
        };
        assert!(converted.path().exists());
        drop(converted);
        assert!(!dir.exists());
    }
}
