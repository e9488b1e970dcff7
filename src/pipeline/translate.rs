//! Translation stage: Russian captions → English and Kazakh.
//!
//! One request per target language. Both answers are
//! validated against the Russian key set; under [`KeyPolicy::Translate`]
//! each source key maps to `{"key": <translated name>, "text": <description>}`
//! so the source keys anchor the answer even though the output uses
//! translated organ names.

use crate::config::{KeyPolicy, Language, PipelineConfig};
use crate::error::{LlmStageError, StageError};
use crate::output::{key_diff, Captions, TranslatedRecord, CONCLUSION_KEY};
use crate::pipeline::llm::{LlmClient, LlmRequest, RequestKind};
use crate::pipeline::response::{parse_json_object, trim_keys};
use crate::prompts::{translation_prompt, translation_system_prompt};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Translate `captions` into one language.
pub async fn translate<L: LlmClient>(
    captions: &Captions,
    language: Language,
    llm: &L,
    config: &PipelineConfig,
) -> Result<TranslatedRecord, StageError> {
    let request = LlmRequest::text(
        RequestKind::Translation(language),
        translation_system_prompt(language),
        translation_prompt(&captions.to_prompt_json(), language, config.key_policy),
        config.max_tokens,
    );

    let result = match llm.complete(&request).await {
        Ok(raw) => parse_translation(&raw, captions, language, config.key_policy),
        Err(e) => Err(e.into()),
    };

    result
        .inspect(|rec| debug!("Translated {} caption(s) to {}", rec.captions.len(), language))
        .map_err(|source| StageError::TranslationLlm { language, source })
}

/// Validate a translation response against the source captions.
pub fn parse_translation(
    raw: &str,
    source: &Captions,
    language: Language,
    policy: KeyPolicy,
) -> Result<TranslatedRecord, LlmStageError> {
    let obj = trim_keys(parse_json_object(raw)?)?;
    if let Some(mismatch) = key_diff(source.keys(), obj.keys().map(String::as_str)) {
        return Err(mismatch);
    }

    match policy {
        KeyPolicy::Preserve => {
            let translated = Captions::from_object(&obj)?;
            let mut captions = Captions::new();
            let mut key_map = Vec::with_capacity(source.len());
            for key in source.keys() {
                captions.insert(key, translated.get(key).unwrap_or_default());
                key_map.push((key.to_string(), key.to_string()));
            }
            Ok(TranslatedRecord {
                language,
                captions,
                key_map,
            })
        }
        KeyPolicy::Translate => {
            let mut captions = Captions::new();
            let mut key_map = Vec::with_capacity(source.len());
            let mut seen = HashSet::new();

            for key in source.keys() {
                let (name, text) = translated_entry(key, &obj[key])?;
                if !seen.insert(name.clone()) {
                    return Err(LlmStageError::InvalidValue {
                        key: key.to_string(),
                        detail: format!("translated name '{name}' is used for more than one organ"),
                    });
                }
                captions.insert(name.as_str(), text);
                key_map.push((key.to_string(), name));
            }

            Ok(TranslatedRecord {
                language,
                captions,
                key_map,
            })
        }
    }
}

/// `(translated name, translated text)` for one source key.
fn translated_entry(key: &str, value: &Value) -> Result<(String, String), LlmStageError> {
    let invalid = |detail: &str| LlmStageError::InvalidValue {
        key: key.to_string(),
        detail: detail.to_string(),
    };

    let Value::Object(entry) = value else {
        return Err(invalid("expected an object with \"key\" and \"text\""));
    };

    let name = match entry.get("key") {
        Some(Value::String(s)) => s.trim().to_string(),
        _ => String::new(),
    };
    let text = match entry.get("text") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(_) => return Err(invalid("\"text\" must be a string")),
    };

    if key == CONCLUSION_KEY {
        return Ok((CONCLUSION_KEY.to_string(), text));
    }
    if name.is_empty() {
        return Err(invalid("missing translated organ name"));
    }
    Ok((name, text))
}
