//! Turns cleaned certificate text into [`ParsedFields`].
//!
//! Two strategies exist: [`LlmExtraction`] asks an OpenAI-compatible chat model
//! for a strict JSON object, [`RuleExtraction`] runs keyword and label regexes
//! and never fails. [`FieldExtractor`] tries the model first and, when allowed,
//! falls back to the rules.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use openai::chat::ChatCompletionMessageRole;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Settings;
use crate::dto::{ParsedFields, DEFAULT_RULE_CONFIDENCE};
use crate::error::{AppError, Result};
use crate::json_relaxed::answer_object;
use crate::openai_client::{call_openai_chat, msg, LlmSettings, PromptError};

/// Only this many characters of certificate text are sent to the model.
pub const PROMPT_TEXT_LIMIT: usize = 2000;

#[async_trait(?Send)]
pub trait FieldExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, cleaned_text: &str) -> Result<ParsedFields>;
}

/* ------------------------------ model-backed ------------------------------ */

pub struct LlmExtraction {
    settings: LlmSettings,
}

impl LlmExtraction {
    pub fn new(settings: LlmSettings) -> Self {
        Self { settings }
    }
}

/// Builds the extraction prompt around the first [`PROMPT_TEXT_LIMIT`] characters.
pub fn build_prompt(cleaned_text: &str) -> String {
    let excerpt: String = cleaned_text.chars().take(PROMPT_TEXT_LIMIT).collect();
    format!(
        r#"Extract structured information from this certificate text.

IMPORTANT:
- rank_raw MUST be one of: Juara 1, Juara 2, Juara 3, Finalis, Peserta
- level_raw MUST be one of: Internasional, Nasional, Provinsi, Kota
- category_raw MUST be one of: Akademik, Non-Akademik

Return ONLY valid JSON without any markdown formatting or extra text.

Required fields:
- student_name (name of the awarded student)
- event_name (event/competition name)
- rank_raw (achievement: Juara 1/2/3, Finalis, Peserta)
- level_raw (level: Internasional, Nasional, Provinsi, Kota)
- date_issued (date in any format found)
- category_raw (Akademik or Non-Akademik)
- domain_raw (field/domain: AI, Sains, Teknologi, Bisnis, etc.)
- confidence (0.0-1.0, your confidence in the extraction)

Certificate text:
"""{excerpt}"""

Respond with JSON only:"#
    )
}

impl From<PromptError> for AppError {
    fn from(e: PromptError) -> Self {
        AppError::ExtractionUnavailable(e.to_string())
    }
}

#[async_trait(?Send)]
impl FieldExtractionStrategy for LlmExtraction {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn extract(&self, cleaned_text: &str) -> Result<ParsedFields> {
        let client = self.settings.client();
        let messages = vec![msg(ChatCompletionMessageRole::User, &build_prompt(cleaned_text))];
        let answer = call_openai_chat(&client, &self.settings, messages).await?;
        let value = Value::Object(answer_object(&answer)?);
        ParsedFields::from_model_json(&value).ok_or_else(|| {
            AppError::ExtractionUnavailable("model answer is not a JSON object".into())
        })
    }
}

/* ------------------------------ rule-based ------------------------------ */

static NAME_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"(?i:nama|name)[:\s-]*([A-Z][a-zA-Z\s]{5,50})").unwrap(),
        Regex::new(r"(?i:diberikan kepada|presented to|awarded to)[:\s-]*([A-Z][a-zA-Z\s]{5,50})")
            .unwrap(),
    ]
});

static RANK_PATTERNS: Lazy<[(Regex, &'static str); 3]> = Lazy::new(|| {
    [
        (
            Regex::new(r"\b(juara\s*1|juara\s*pertama|1st|first|champion|gold)\b").unwrap(),
            "Juara 1",
        ),
        (
            Regex::new(r"\b(juara\s*2|juara\s*kedua|2nd|second|silver)\b").unwrap(),
            "Juara 2",
        ),
        (
            Regex::new(r"\b(juara\s*3|juara\s*ketiga|3rd|third|bronze)\b").unwrap(),
            "Juara 3",
        ),
    ]
});

static LEVEL_PATTERNS: Lazy<[(Regex, &'static str); 2]> = Lazy::new(|| {
    [
        (Regex::new(r"\b(international|internasional)\b").unwrap(), "Internasional"),
        (Regex::new(r"\b(nasional|national)\b").unwrap(), "Nasional"),
    ]
});

/// Deterministic regex extraction; fields without a match keep their defaults.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleExtraction;

impl RuleExtraction {
    pub fn parse(&self, text: &str) -> ParsedFields {
        let mut parsed = ParsedFields::unknown(DEFAULT_RULE_CONFIDENCE);
        let lower = text.to_lowercase();

        if let Some(name) = NAME_PATTERNS
            .iter()
            .find_map(|re| re.captures(text))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
        {
            parsed.student_name = name;
        }

        if let Some((_, rank)) = RANK_PATTERNS.iter().find(|(re, _)| re.is_match(&lower)) {
            parsed.rank_raw = rank.to_string();
        }

        if let Some((_, level)) = LEVEL_PATTERNS.iter().find(|(re, _)| re.is_match(&lower)) {
            parsed.level_raw = level.to_string();
        }

        parsed
    }
}

#[async_trait(?Send)]
impl FieldExtractionStrategy for RuleExtraction {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn extract(&self, cleaned_text: &str) -> Result<ParsedFields> {
        Ok(self.parse(cleaned_text))
    }
}

/* ------------------------------ coordinator ------------------------------ */

/// Tries the primary strategy and falls back to the secondary one on failure.
#[derive(Clone)]
pub struct FieldExtractor {
    primary: Option<Arc<dyn FieldExtractionStrategy>>,
    fallback: Option<Arc<dyn FieldExtractionStrategy>>,
}

impl FieldExtractor {
    pub fn new(
        primary: Option<Arc<dyn FieldExtractionStrategy>>,
        fallback: Option<Arc<dyn FieldExtractionStrategy>>,
    ) -> Self {
        Self { primary, fallback }
    }

    /// Model-backed extraction with the rule-based fallback enabled or not per settings.
    /// Without an API key the model strategy is left out.
    pub fn from_settings(settings: &Settings) -> Self {
        let llm = LlmSettings::from_settings(settings);
        let primary: Option<Arc<dyn FieldExtractionStrategy>> = if llm.is_configured() {
            Some(Arc::new(LlmExtraction::new(llm)))
        } else {
            warn!("LLM_API_KEY not set; model-backed extraction disabled");
            None
        };
        let fallback: Option<Arc<dyn FieldExtractionStrategy>> = if settings.extraction_fallback {
            Some(Arc::new(RuleExtraction))
        } else {
            None
        };
        Self::new(primary, fallback)
    }

    pub async fn extract(&self, cleaned_text: &str) -> Result<ParsedFields> {
        let primary_err = match &self.primary {
            Some(primary) => match primary.extract(cleaned_text).await {
                Ok(parsed) => {
                    info!(strategy = primary.name(), "fields extracted");
                    return Ok(parsed);
                }
                Err(e) => {
                    warn!(strategy = primary.name(), %e, "primary extraction failed");
                    e
                }
            },
            None => AppError::ExtractionUnavailable("no extraction backend configured".into()),
        };

        match &self.fallback {
            Some(fallback) => {
                info!(strategy = fallback.name(), "using fallback extraction");
                fallback.extract(cleaned_text).await
            }
            None => Err(match primary_err {
                e @ AppError::ExtractionUnavailable(_) => e,
                other => AppError::ExtractionUnavailable(other.to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::UNKNOWN;

    struct Failing;

    #[async_trait(?Send)]
    impl FieldExtractionStrategy for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn extract(&self, _: &str) -> Result<ParsedFields> {
            Err(AppError::ExtractionUnavailable("backend down".into()))
        }
    }

    #[test]
    fn rules_find_labeled_name() {
        let p = RuleExtraction.parse("SERTIFIKAT diberikan kepada Budi Santoso sebagai Juara 2");
        assert!(p.student_name.starts_with("Budi Santoso"));
        assert_eq!(p.rank_raw, "Juara 2");
    }

    #[test]
    fn rules_map_rank_and_level_keywords() {
        let p = RuleExtraction.parse("Gold medal at the International Robotics Olympiad");
        assert_eq!(p.rank_raw, "Juara 1");
        assert_eq!(p.level_raw, "Internasional");

        let p = RuleExtraction.parse("Juara ketiga Lomba Debat Tingkat Nasional");
        assert_eq!(p.rank_raw, "Juara 3");
        assert_eq!(p.level_raw, "Nasional");
    }

    #[test]
    fn rules_keep_defaults_without_matches() {
        let p = RuleExtraction.parse("lorem ipsum");
        assert_eq!(p, ParsedFields::unknown(DEFAULT_RULE_CONFIDENCE));
        assert_eq!(p.student_name, UNKNOWN);
        assert_eq!(p.confidence, 0.5);
    }

    #[test]
    fn prompt_is_bounded() {
        let long = "x".repeat(5000);
        let prompt = build_prompt(&long);
        assert!(prompt.contains(&"x".repeat(PROMPT_TEXT_LIMIT)));
        assert!(!prompt.contains(&"x".repeat(PROMPT_TEXT_LIMIT + 1)));
        assert!(prompt.contains("rank_raw MUST be one of"));
    }

    #[tokio::test]
    async fn falls_back_when_primary_fails() {
        let ex = FieldExtractor::new(Some(Arc::new(Failing)), Some(Arc::new(RuleExtraction)));
        let p = ex.extract("Juara 1 Nasional").await.unwrap();
        assert_eq!(p.rank_raw, "Juara 1");
        assert_eq!(p.confidence, DEFAULT_RULE_CONFIDENCE);
    }

    #[tokio::test]
    async fn hard_error_without_fallback() {
        let ex = FieldExtractor::new(Some(Arc::new(Failing)), None);
        let err = ex.extract("Juara 1").await.unwrap_err();
        assert!(matches!(err, AppError::ExtractionUnavailable(_)));

        let none = FieldExtractor::new(None, None);
        assert!(matches!(
            none.extract("Juara 1").await,
            Err(AppError::ExtractionUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn rules_only_when_no_backend() {
        let ex = FieldExtractor::new(None, Some(Arc::new(RuleExtraction)));
        let p = ex.extract("awarded to Maria Lestari champion").await.unwrap();
        assert!(p.student_name.starts_with("Maria Lestari"));
        assert_eq!(p.rank_raw, "Juara 1");
    }
}
