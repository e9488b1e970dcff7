//! Labeling stage: English captions → per-organ 0/1 health labels.
//!
//! Any value other than `0`/`1` (or the strings `"0"`/`"1"`) fails the
//! whole document. A partially labeled report is never written.

use crate::config::PipelineConfig;
use crate::error::{LlmStageError, StageError};
use crate::output::{key_diff, Captions, Labels};
use crate::pipeline::llm::{LlmClient, LlmRequest, RequestKind};
use crate::pipeline::response::{parse_json_object, trim_keys};
use crate::prompts::{labeling_prompt, LABELING_SYSTEM_PROMPT};
use serde_json::Value;
use tracing::debug;

/// Label every English caption.
pub async fn label_captions<L: LlmClient>(
    english: &Captions,
    llm: &L,
    config: &PipelineConfig,
) -> Result<Labels, StageError> {
    let request = LlmRequest::text(
        RequestKind::Labeling,
        LABELING_SYSTEM_PROMPT,
        labeling_prompt(&english.to_prompt_json()),
        config.max_tokens,
    );

    let raw = llm
        .complete(&request)
        .await
        .map_err(|e| StageError::LabelingLlm(e.into()))?;
    let labels = parse_labels(&raw, english).map_err(StageError::LabelingLlm)?;

    debug!(
        "Labeled {} caption(s), {} abnormal",
        labels.len(),
        labels.iter().filter(|(_, v)| *v == 1).count()
    );
    Ok(labels)
}

/// Validate a labeling response against the English captions.
pub fn parse_labels(raw: &str, english: &Captions) -> Result<Labels, LlmStageError> {
    let obj = trim_keys(parse_json_object(raw)?)?;

    if let Some(mismatch) = key_diff(english.keys(), obj.keys().map(String::as_str)) {
        return Err(mismatch);
    }

    let mut labels = Labels::new();
    for key in english.keys() {
        let abnormal = label_value(&obj[key]).ok_or_else(|| LlmStageError::InvalidValue {
            key: key.to_string(),
            detail: format!("expected 0 or 1, got {}", obj[key]),
        })?;
        labels.insert(key, abnormal);
    }
    Ok(labels)
}

fn label_value(value: &Value) -> Option<bool> {
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim() {
            "0" => Some(false),
            "1" => Some(true),
            _ => None,
        },
        _ => None,
    }
}
