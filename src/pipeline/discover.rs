//! Document discovery: walk the input directory and list source reports.
//!
//! Discovery is the only place that touches the input tree. It validates the
//! directory up front (a missing directory is a configuration error, not a
//! per-document failure) and returns documents sorted by path so two runs
//! over the same tree see the same order.

use crate::error::MrtpError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extensions handed to the document converter.
const CONVERTIBLE_EXTENSIONS: &[&str] = &["docx", "doc", "odt", "rtf"];

/// One source document. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Full path of the source file.
    pub path: PathBuf,
    /// Name of the directory the file sits in.
    pub patient_group: String,
}

impl Document {
    /// File name used as `source_file` in the output.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// True when the source is already a PDF and needs no conversion.
    pub fn is_pdf(&self) -> bool {
        extension_of(&self.path).as_deref() == Some("pdf")
    }
}

/// Recursively list every supported document under `input_dir`.
pub fn discover_documents(input_dir: &Path) -> Result<Vec<Document>, MrtpError> {
    if !input_dir.exists() {
        return Err(MrtpError::InputDirNotFound {
            path: input_dir.to_path_buf(),
        });
    }
    if !input_dir.is_dir() {
        return Err(MrtpError::NotADirectory {
            path: input_dir.to_path_buf(),
        });
    }

    let mut paths = Vec::new();
    walk(input_dir, &mut paths)?;
    paths.sort();

    let root_group = group_name(input_dir);
    let documents: Vec<Document> = paths
        .into_iter()
        .map(|path| {
            let patient_group = path
                .parent()
                .filter(|p| *p != input_dir)
                .map(group_name)
                .unwrap_or_else(|| root_group.clone());
            Document {
                path,
                patient_group,
            }
        })
        .collect();

    info!(
        "Discovered {} document(s) in {}",
        documents.len(),
        input_dir.display()
    );
    Ok(documents)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), MrtpError> {
    let entries = std::fs::read_dir(dir).map_err(|source| MrtpError::ScanFailed {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| MrtpError::ScanFailed {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        // Hidden files and Office lock files ("~$report.docx")
        if name.starts_with('.') || name.starts_with("~$") {
            debug!("Skipping {}", path.display());
            continue;
        }

        let file_type = entry.file_type().map_err(|source| MrtpError::ScanFailed {
            path: path.clone(),
            source,
        })?;
        // Linked directories may point back into the tree
        if file_type.is_symlink() && path.is_dir() {
            debug!("Not following directory link {}", path.display());
            continue;
        }

        if file_type.is_dir() {
            walk(&path, out)?;
        } else if is_supported(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn is_supported(path: &Path) -> bool {
    match extension_of(path) {
        Some(ext) => ext == "pdf" || CONVERTIBLE_EXTENSIONS.contains(&ext.as_str()),
        None => false,
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

fn group_name(dir: &Path) -> String {
    dir.canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(dir)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "N/A".to_string())
}
