//! Structured extraction: raw Russian report text → patient fields and
//! organ descriptions.

use crate::config::PipelineConfig;
use crate::error::{LlmStageError, StageError};
use crate::output::{Captions, ExtractedRecord, PatientInfo, CONCLUSION_KEY, NOT_AVAILABLE};
use crate::pipeline::llm::{LlmClient, LlmRequest, RequestKind};
use crate::pipeline::response::parse_json_object;
use crate::prompts::{extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use serde_json::{Map, Value};
use tracing::{debug, warn};

const CAPTIONS_FIELD: &str = "captions_ru";

/// Run the extraction request for `text` and validate the answer.
pub async fn extract_record<L: LlmClient>(
    text: &str,
    llm: &L,
    config: &PipelineConfig,
) -> Result<ExtractedRecord, StageError> {
    extract_inner(text, llm, config)
        .await
        .map_err(StageError::ExtractionLlm)
}

async fn extract_inner<L: LlmClient>(
    text: &str,
    llm: &L,
    config: &PipelineConfig,
) -> Result<ExtractedRecord, LlmStageError> {
    let request = LlmRequest::text(
        RequestKind::Extraction,
        EXTRACTION_SYSTEM_PROMPT,
        extraction_prompt(text),
        config.max_tokens,
    );
    let raw = llm.complete(&request).await?;
    let record = parse_extraction(&raw)?;

    debug!(
        "Extracted {} caption(s) for patient {}",
        record.captions.len(),
        record.patient.patient_id
    );
    Ok(record)
}

/// Validate an extraction response.
///
/// `captions_ru` must be a non-empty object of text descriptions. Patient
/// fields that are missing or `null` become `"N/A"`.
pub fn parse_extraction(raw: &str) -> Result<ExtractedRecord, LlmStageError> {
    let obj = parse_json_object(raw)?;

    let captions = match obj.get(CAPTIONS_FIELD) {
        Some(Value::Object(map)) => Captions::from_object(map)?,
        Some(_) => {
            return Err(LlmStageError::InvalidValue {
                key: CAPTIONS_FIELD.to_string(),
                detail: "expected an object of organ descriptions".into(),
            })
        }
        None => return Err(LlmStageError::MissingField(CAPTIONS_FIELD)),
    };

    if captions.is_empty() {
        return Err(LlmStageError::InvalidValue {
            key: CAPTIONS_FIELD.to_string(),
            detail: "no organ descriptions".into(),
        });
    }
    if !captions.contains_key(CONCLUSION_KEY) {
        warn!("Extraction response has no '{}' key", CONCLUSION_KEY);
    }

    Ok(ExtractedRecord {
        patient: PatientInfo {
            patient_id: patient_field(&obj, "patient_id"),
            age: patient_field(&obj, "age"),
            gender: patient_field(&obj, "gender"),
        },
        captions,
    })
}

fn patient_field(obj: &Map<String, Value>, name: &str) -> String {
    let value = match obj.get(name) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    };
    if value.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        value
    }
}
