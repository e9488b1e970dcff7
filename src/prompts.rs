//! Prompts for every LLM call the pipeline makes.
//!
//! All prompt text lives here so stage code only deals with request
//! plumbing and response validation, and so tests can inspect prompts
//! without a model.

use crate::config::{KeyPolicy, Language};

/// Instruction sent alongside each rasterised page.
pub const OCR_PROMPT: &str = "Extract all text from this image of a medical report page. \
Do not translate anything (content will be primarily in Russian), do not output any extra \
text - only what you see in the image, verbatim, in reading order.";

/// System prompt of the structured extraction stage.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are a data extraction assistant. Extract patient \
information and organ descriptions from the provided medical report text. Output a single JSON \
object and nothing else.";

/// System prompt of the labeling stage.
pub const LABELING_SYSTEM_PROMPT: &str = "You are a radiology findings classifier. For each \
description decide whether it reports any pathological or abnormal finding. Output a single \
JSON object and nothing else.";

/// User prompt of the structured extraction stage.
pub fn extraction_prompt(report_text: &str) -> String {
    format!(
        r#"Please extract the patient information (patient_id, age, gender) and the description for each organ from the following Russian medical report text.

The output must be a single, well-formed JSON object with this structure:
{{
  "patient_id": "...",
  "age": "...",
  "gender": "...",
  "captions_ru": {{
    "organ_name_1": "description in Russian...",
    "organ_name_2": "description in Russian...",
    "conclusion": "conclusion extracted from the text"
  }}
}}

Use the organ names as they appear in the report, in Russian. Always include the "conclusion" key. Use null for patient fields that are not present.

Report Text:
---
{report_text}
---
"#
    )
}

/// System prompt of the translation stage.
pub fn translation_system_prompt(language: Language) -> String {
    format!(
        "You are an expert medical translator. Translate the provided JSON from Russian to \
{language}. Preserve the JSON structure and keys exactly as instructed. Do not add any commentary."
    )
}

/// User prompt of the translation stage.
///
/// Under [`KeyPolicy::Translate`] the model returns, per source key, both
/// the translated organ name and the translated description, so the source
/// keys still anchor the response and can be validated one-to-one.
pub fn translation_prompt(captions_json: &str, language: Language, policy: KeyPolicy) -> String {
    match policy {
        KeyPolicy::Translate => format!(
            r#"Translate the following JSON object to {language}.
For every key of the input, return the same key (unchanged, in Russian) mapped to an object with two fields:
  "key":  the organ name translated to {language}
  "text": the description translated to {language}
The key "conclusion" must map to {{"key": "conclusion", "text": "..."}}.
Do not add, drop or merge keys. Return a single JSON object.

Input:
{captions_json}
"#
        ),
        KeyPolicy::Preserve => format!(
            r#"Translate the values in the following JSON object to {language}.
Return a single JSON object with exactly the same keys, unchanged. Do not add, drop or rename keys.

Input:
{captions_json}
"#
        ),
    }
}

/// User prompt of the labeling stage.
pub fn labeling_prompt(captions_json: &str) -> String {
    format!(
        r#"For every key of the following JSON object, read its description and answer 1 if it indicates any pathological or abnormal finding, otherwise 0.
Return a single JSON object with exactly the same keys (including "conclusion") and the numbers 0 or 1 as values.

Input:
{captions_json}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_prompt_embeds_text_and_schema() {
        let p = extraction_prompt("Печень: без особенностей.");
        assert!(p.contains("Печень: без особенностей."));
        assert!(p.contains("\"captions_ru\""));
        assert!(p.contains("\"conclusion\""));
    }

    #[test]
    fn translation_prompt_differs_by_policy() {
        let t = translation_prompt("{}", Language::English, KeyPolicy::Translate);
        let p = translation_prompt("{}", Language::English, KeyPolicy::Preserve);
        assert!(t.contains("\"key\""));
        assert!(!p.contains("\"key\""));
        assert!(translation_system_prompt(Language::Kazakh).contains("Kazakh"));
    }

    #[test]
    fn labeling_prompt_mentions_binary_values() {
        let p = labeling_prompt("{\"conclusion\": \"norm\"}");
        assert!(p.contains("0 or 1"));
    }
}
