use std::{env, str::FromStr, time::Duration};

use anyhow::{Context, Result};

use crate::llm::GenerationParams;

const DEFAULT_MODEL: &str = "openai/gpt-4";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Process-wide settings, read once at startup.
#[derive(Clone, Debug)]
pub struct Settings {
    pub port: u16,
    pub llm_timeout: Duration,
    pub max_upload_bytes: usize,
    pub models: ModelSettings,
    pub bounds: BoundSettings,
    pub generation: GenerationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            llm_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            models: ModelSettings::default(),
            bounds: BoundSettings::default(),
            generation: GenerationSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let defaults = Settings::default();
        let bounds = defaults.bounds;

        let mut models = ModelSettings::default();
        if let Some(model) = env_string("LLM_MODEL") {
            models.feedback_model = model.clone();
            models.detection_model = model.clone();
            models.chat_model = model.clone();
            models.title_model = model.clone();
            models.analysis_model = model;
        }
        if let Some(model) = env_string("LLM_TITLE_MODEL") {
            models.title_model = model;
        }

        Ok(Self {
            port: env_parse("PORT", defaults.port)?,
            llm_timeout: Duration::from_secs(env_parse("LLM_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            models,
            bounds: BoundSettings {
                ai_check_chars: env_parse("AI_CHECK_MAX_CHARS", bounds.ai_check_chars)?,
                chat_attachment_chars: env_parse(
                    "CHAT_ATTACHMENT_MAX_CHARS",
                    bounds.chat_attachment_chars,
                )?,
                analyze_chars: env_parse("ANALYZE_MAX_CHARS", bounds.analyze_chars)?,
                feedback_chars: env_parse("FEEDBACK_MAX_CHARS", bounds.feedback_chars)?,
                title_chars: env_parse("TITLE_MAX_CHARS", bounds.title_chars)?,
                chat_history_limit: env_parse("CHAT_HISTORY_LIMIT", bounds.chat_history_limit)?,
                max_sentences: bounds.max_sentences,
            },
            generation: defaults.generation,
        })
    }
}

#[derive(Clone, Debug)]
pub struct ModelSettings {
    pub feedback_model: String,
    pub detection_model: String,
    pub chat_model: String,
    pub title_model: String,
    pub analysis_model: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        default_models()
    }
}

/// Character budgets applied before text reaches a prompt.
#[derive(Clone, Copy, Debug)]
pub struct BoundSettings {
    pub ai_check_chars: usize,
    pub chat_attachment_chars: usize,
    pub analyze_chars: usize,
    pub feedback_chars: usize,
    pub title_chars: usize,
    pub chat_history_limit: usize,
    pub max_sentences: usize,
}

impl Default for BoundSettings {
    fn default() -> Self {
        default_bounds()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GenerationSettings {
    pub feedback: GenerationParams,
    pub detection: GenerationParams,
    pub chat: GenerationParams,
    pub title: GenerationParams,
    pub analysis: GenerationParams,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        default_generation()
    }
}

fn default_models() -> ModelSettings {
    ModelSettings {
        feedback_model: DEFAULT_MODEL.to_string(),
        detection_model: DEFAULT_MODEL.to_string(),
        chat_model: DEFAULT_MODEL.to_string(),
        title_model: DEFAULT_MODEL.to_string(),
        analysis_model: DEFAULT_MODEL.to_string(),
    }
}

fn default_bounds() -> BoundSettings {
    BoundSettings {
        ai_check_chars: 6000,
        chat_attachment_chars: 3000,
        analyze_chars: 3000,
        feedback_chars: 12_000,
        title_chars: 200,
        chat_history_limit: 20,
        max_sentences: 10,
    }
}

fn default_generation() -> GenerationSettings {
    GenerationSettings {
        feedback: GenerationParams {
            temperature: 0.7,
            max_tokens: 2500,
            seed: None,
            json_mode: false,
        },
        detection: GenerationParams {
            temperature: 0.0,
            max_tokens: 2000,
            seed: Some(42),
            json_mode: false,
        },
        chat: GenerationParams {
            temperature: 0.7,
            max_tokens: 800,
            seed: None,
            json_mode: false,
        },
        title: GenerationParams {
            temperature: 0.5,
            max_tokens: 20,
            seed: None,
            json_mode: false,
        },
        analysis: GenerationParams {
            temperature: 0.3,
            max_tokens: 1000,
            seed: None,
            json_mode: true,
        },
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_presets() {
        let settings = Settings::default();
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.bounds.ai_check_chars, 6000);
        assert_eq!(settings.bounds.max_sentences, 10);
        assert_eq!(settings.generation.detection.seed, Some(42));
        assert_eq!(settings.generation.detection.temperature, 0.0);
        assert!(settings.generation.analysis.json_mode);
        assert_eq!(settings.models.chat_model, "openai/gpt-4");
    }

    #[test]
    fn unset_variables_use_the_default() {
        assert_eq!(
            env_parse::<usize>("ACADEMIC_API_TEST_UNSET_VALUE", 7).unwrap(),
            7
        );
    }
}
