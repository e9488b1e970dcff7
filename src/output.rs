//! Data model of the pipeline: per-stage records and the final aggregate.
//!
//! Organ keys are not known in advance; each document brings its own set,
//! chosen by the extraction model. Mappings are therefore ordered
//! string-keyed maps ([`serde_json::Map`] with `preserve_order`), and the
//! cross-stage requirement that every stage covers exactly the same keys is
//! checked at runtime with [`key_diff`] rather than by the type system.

use crate::config::Language;
use crate::error::LlmStageError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Key of the free-text conclusion in every caption mapping.
pub const CONCLUSION_KEY: &str = "conclusion";

/// Placeholder for patient fields the model could not find.
pub const NOT_AVAILABLE: &str = "N/A";

/// Pipeline stage a document can fail in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Conversion,
    TextExtraction,
    DataExtraction,
    Translation,
    Labeling,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Conversion => "conversion",
            Stage::TextExtraction => "text extraction",
            Stage::DataExtraction => "data extraction",
            Stage::Translation => "translation",
            Stage::Labeling => "labeling",
        })
    }
}

/// Ordered organ → description mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Captions(Map<String, Value>);

impl Captions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a model-produced JSON object.
    ///
    /// Keys are trimmed; string values are trimmed, `null` becomes an empty
    /// description and numbers/booleans are stringified. Nested objects or
    /// arrays are rejected, as are keys that collide once trimmed.
    pub fn from_object(obj: &Map<String, Value>) -> Result<Self, LlmStageError> {
        let mut out = Self::new();
        for (key, value) in obj {
            let key = key.trim();
            if key.is_empty() {
                return Err(LlmStageError::InvalidValue {
                    key: String::new(),
                    detail: "empty organ key".into(),
                });
            }
            if out.contains_key(key) {
                return Err(LlmStageError::InvalidValue {
                    key: key.to_string(),
                    detail: "organ key appears more than once".into(),
                });
            }
            let text = match value {
                Value::String(s) => s.trim().to_string(),
                Value::Null => String::new(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(LlmStageError::InvalidValue {
                        key: key.to_string(),
                        detail: "expected a text description".into(),
                    })
                }
            };
            out.insert(key, text);
        }
        Ok(out)
    }

    pub fn insert(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.0.insert(key.into(), Value::String(text.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str().unwrap_or_default()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pretty JSON rendering used inside prompts.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Ordered organ → 0/1 mapping. 1 means a pathological finding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(Map<String, Value>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a label. Only `false`/`true` can be stored, as 0/1.
    pub fn insert(&mut self, key: impl Into<String>, abnormal: bool) {
        self.0.insert(key.into(), Value::from(u8::from(abnormal)));
    }

    pub fn get(&self, key: &str) -> Option<u8> {
        self.0.get(key).and_then(Value::as_u64).map(|v| v as u8)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.0
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_u64().unwrap_or_default() as u8))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Patient metadata pulled out of the report text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientInfo {
    pub patient_id: String,
    pub age: String,
    pub gender: String,
}

impl Default for PatientInfo {
    fn default() -> Self {
        Self {
            patient_id: NOT_AVAILABLE.to_string(),
            age: NOT_AVAILABLE.to_string(),
            gender: NOT_AVAILABLE.to_string(),
        }
    }
}

/// Output of the structured extraction stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRecord {
    pub patient: PatientInfo,
    /// Russian organ descriptions, plus `conclusion`.
    pub captions: Captions,
}

/// Output of the translation stage for one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedRecord {
    pub language: Language,
    /// Descriptions keyed by the (possibly translated) organ names, in
    /// source order.
    pub captions: Captions,
    /// `(source key, output key)` pairs, in source order. Covers every
    /// source key exactly once.
    pub key_map: Vec<(String, String)>,
}

impl TranslatedRecord {
    /// Output key that corresponds to `source_key`.
    pub fn key_for(&self, source_key: &str) -> Option<&str> {
        self.key_map
            .iter()
            .find(|(src, _)| src == source_key)
            .map(|(_, out)| out.as_str())
    }
}

/// One row of the ru → en → kz organ-name side mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMapping {
    pub ru: String,
    pub en: String,
    pub kz: String,
}

/// Everything produced for one successfully processed document.
///
/// Field names and order are the on-disk format consumed downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportResult {
    pub source_file: String,
    pub patient_group: String,
    pub patient_id: String,
    pub age: String,
    pub gender: String,
    pub captions_ru: Captions,
    pub captions_en: Captions,
    pub captions_kz: Captions,
    pub labels: Labels,
    pub key_map: Vec<KeyMapping>,
}

impl ReportResult {
    /// Assemble the final record from the per-stage outputs.
    pub fn assemble(
        source_file: String,
        patient_group: String,
        extracted: ExtractedRecord,
        english: TranslatedRecord,
        kazakh: TranslatedRecord,
        labels: Labels,
    ) -> Self {
        let key_map = extracted
            .captions
            .keys()
            .map(|ru| KeyMapping {
                ru: ru.to_string(),
                en: english.key_for(ru).unwrap_or(ru).to_string(),
                kz: kazakh.key_for(ru).unwrap_or(ru).to_string(),
            })
            .collect();

        Self {
            source_file,
            patient_group,
            patient_id: extracted.patient.patient_id,
            age: extracted.patient.age,
            gender: extracted.patient.gender,
            captions_ru: extracted.captions,
            captions_en: english.captions,
            captions_kz: kazakh.captions,
            labels,
            key_map,
        }
    }
}

/// Trace of a document that did not make it into the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub source_file: String,
    pub patient_group: String,
    pub stage: Stage,
    pub error: String,
}

/// Result of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutput {
    /// Successful reports, in discovery order. This is the pipeline output.
    pub reports: Vec<ReportResult>,
    /// Failed documents, in discovery order.
    pub failures: Vec<DocumentFailure>,
}

impl BatchOutput {
    pub fn total(&self) -> usize {
        self.reports.len() + self.failures.len()
    }
}

/// Compare two key sets. Returns `None` when they are equal, otherwise the
/// sorted `(missing, unexpected)` keys as a [`LlmStageError::KeyMismatch`].
pub fn key_diff<'a>(
    expected: impl IntoIterator<Item = &'a str>,
    actual: impl IntoIterator<Item = &'a str>,
) -> Option<LlmStageError> {
    let expected: HashSet<&str> = expected.into_iter().collect();
    let actual: HashSet<&str> = actual.into_iter().collect();

    let mut missing: Vec<String> = expected
        .difference(&actual)
        .map(|s| s.to_string())
        .collect();
    let mut unexpected: Vec<String> = actual
        .difference(&expected)
        .map(|s| s.to_string())
        .collect();

    if missing.is_empty() && unexpected.is_empty() {
        return None;
    }
    missing.sort();
    unexpected.sort();
    Some(LlmStageError::KeyMismatch {
        missing,
        unexpected,
    })
}
