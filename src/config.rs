//! Configuration types for a report-processing run.
//!
//! Every knob of the pipeline lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The heuristics (the 50-character OCR
//! threshold, the render DPI) are plain fields with documented defaults rather than magic numbers in stage code.

use crate::error::MrtpError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direct-extraction texts shorter than this are treated as scan-only.
pub const DEFAULT_MIN_TEXT_CHARS: usize = 50;

/// Upper bound for `max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Render DPI for OCR. 300 DPI keeps small Cyrillic print legible.
pub const DEFAULT_RENDER_DPI: u32 = 300;

/// Configuration for one batch run.
///
/// # Example
/// ```rust
/// use mrtp::{KeyPolicy, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .force_ocr(true)
///     .dpi(200)
///     .key_policy(KeyPolicy::Preserve)
///     .build()
///     .unwrap();
/// assert!(config.force_ocr);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Skip direct text extraction and always OCR. Default: false.
    pub force_ocr: bool,

    /// Minimum trimmed character count for direct extraction to be trusted.
    /// Default: 50.
    ///
    /// This is a heuristic: a genuinely one-line report will be routed to
    /// OCR. That is expected behaviour, not a bug.
    pub min_text_chars: usize,

    /// Rendering DPI for OCR page images. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Cap on the longest edge of a rendered page, in pixels. Default: 4096.
    pub max_rendered_pixels: u32,

    /// Sampling temperature for every LLM call. Default: 0.1.
    pub temperature: f32,

    /// Output-token cap for the text stages. Default: 4096.
    pub max_tokens: usize,

    /// Output-token cap for a single OCR page. Default: 8192.
    ///
    /// Dense ultrasound protocols run past 4k tokens per page once the
    /// model transcribes every measurement table.
    pub ocr_max_tokens: usize,

    /// Retries on transport-level LLM failures. Range: 0–10. Default: 2.
    ///
    /// JSON and key-set validation failures are never retried: the model
    /// would most likely repeat itself.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt and capped at
    /// one minute. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-LLM-request timeout in seconds. Default: 180.
    pub api_timeout_secs: u64,

    /// Timeout for one document-to-PDF conversion in seconds. Default: 120.
    pub convert_timeout_secs: u64,

    /// Whether translated mappings use translated organ names. Default: Translate.
    pub key_policy: KeyPolicy,

    /// Optional per-document progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            force_ocr: false,
            min_text_chars: DEFAULT_MIN_TEXT_CHARS,
            dpi: DEFAULT_RENDER_DPI,
            max_rendered_pixels: 4096,
            temperature: 0.1,
            max_tokens: 4096,
            ocr_max_tokens: 8192,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 180,
            convert_timeout_secs: 120,
            key_policy: KeyPolicy::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("force_ocr", &self.force_ocr)
            .field("min_text_chars", &self.min_text_chars)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("ocr_max_tokens", &self.ocr_max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("convert_timeout_secs", &self.convert_timeout_secs)
            .field("key_policy", &self.key_policy)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn force_ocr(mut self, v: bool) -> Self {
        self.config.force_ocr = v;
        self
    }

    pub fn min_text_chars(mut self, n: usize) -> Self {
        self.config.min_text_chars = n;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(256);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn ocr_max_tokens(mut self, n: usize) -> Self {
        self.config.ocr_max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn convert_timeout_secs(mut self, secs: u64) -> Self {
        self.config.convert_timeout_secs = secs;
        self
    }

    pub fn key_policy(mut self, policy: KeyPolicy) -> Self {
        self.config.key_policy = policy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, MrtpError> {
        let c = &self.config;
        if c.min_text_chars == 0 {
            return Err(MrtpError::InvalidConfig(
                "min_text_chars must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 || c.ocr_max_tokens == 0 {
            return Err(MrtpError::InvalidConfig(
                "token limits must be ≥ 1".into(),
            ));
        }
        if c.max_retries > MAX_RETRIES_LIMIT {
            return Err(MrtpError::InvalidConfig(format!(
                "max_retries must be ≤ {MAX_RETRIES_LIMIT}"
            )));
        }
        if c.api_timeout_secs == 0 || c.convert_timeout_secs == 0 {
            return Err(MrtpError::InvalidConfig("timeouts must be ≥ 1s".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How organ keys are carried into the translated and labelled mappings.
///
/// | Policy | `captions_en` keys | `labels` keys |
/// |--------|--------------------|---------------|
/// | `Translate` | English organ names | English organ names |
/// | `Preserve`  | Russian organ names | Russian organ names |
///
/// Under both policies `conclusion` keeps its name and every mapping keeps
/// the source order. `Translate` also records the ru → en/kz correspondence
/// in each report's `key_map`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// Translate organ names along with descriptions. (default)
    #[default]
    Translate,
    /// Keep the source-language organ names everywhere.
    Preserve,
}

/// Target language of the translation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    English,
    Kazakh,
}

impl Language {
    /// Suffix used in output field names (`captions_en`, `captions_kz`).
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Kazakh => "kz",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Language::English => "English",
            Language::Kazakh => "Kazakh",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PipelineConfig::default();
        assert!(!c.force_ocr);
        assert_eq!(c.min_text_chars, 50);
        assert_eq!(c.dpi, 300);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.key_policy, KeyPolicy::Translate);
    }

    #[test]
    fn dpi_is_clamped() {
        let c = PipelineConfig::builder().dpi(10).build().unwrap();
        assert_eq!(c.dpi, 72);
        let c = PipelineConfig::builder().dpi(5000).build().unwrap();
        assert_eq!(c.dpi, 600);
    }

    #[test]
    fn zero_threshold_rejected() {
        let err = PipelineConfig::builder().min_text_chars(0).build();
        assert!(matches!(err, Err(MrtpError::InvalidConfig(_))));
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = PipelineConfig::builder().api_timeout_secs(0).build();
        assert!(matches!(err, Err(MrtpError::InvalidConfig(_))));
    }

    #[test]
    fn excessive_retries_rejected() {
        let err = PipelineConfig::builder().max_retries(64).build();
        assert!(matches!(err, Err(MrtpError::InvalidConfig(_))));
        let c = PipelineConfig::builder().max_retries(10).build().unwrap();
        assert_eq!(c.max_retries, 10);
    }

    #[test]
    fn language_codes() {
        assert_eq!(Language::English.code(), "en");
        assert_eq!(Language::Kazakh.code(), "kz");
        assert_eq!(Language::Kazakh.to_string(), "Kazakh");
    }

    #[test]
    fn key_policy_serialises_snake_case() {
        let s = serde_json::to_string(&KeyPolicy::Preserve).unwrap();
        assert_eq!(s, "\"preserve\"");
    }
}
