//! Configuration validation
//!
//! Collects every violation before failing so users can fix a config file in
//! one pass.

use crate::error::{LoreError, Result, ValidationError};

use super::Config;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_chunking(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_synthesis(config, &mut errors);
        Self::validate_feedback(config, &mut errors);
        Self::validate_providers(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LoreError::ConfigValidation { errors })
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.chunking.chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.chunk_size",
                "must be greater than 0",
            ));
        }
        if config.chunking.chunk_overlap >= config.chunking.chunk_size {
            errors.push(ValidationError::new(
                "chunking.chunk_overlap",
                "must be smaller than chunk_size",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "must be greater than 0",
            ));
        }
        if config.embedding.sub_batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.sub_batch_size",
                "must be at least 1",
            ));
        }
        match config.embedding.provider.as_str() {
            "local" => {}
            "remote" => {
                if config.embedding.remote_base_url.is_none() {
                    errors.push(ValidationError::new(
                        "embedding.remote_base_url",
                        "required when provider is \"remote\"",
                    ));
                }
            }
            other => errors.push(ValidationError::new(
                "embedding.provider",
                format!("unknown provider \"{other}\", expected \"local\" or \"remote\""),
            )),
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.top_k == 0 {
            errors.push(ValidationError::new("retrieval.top_k", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&config.retrieval.min_similarity) {
            errors.push(ValidationError::new(
                "retrieval.min_similarity",
                "must be between 0 and 1",
            ));
        }
        if config.retrieval.preferred_boost < 1.0 {
            errors.push(ValidationError::new(
                "retrieval.preferred_boost",
                "must be at least 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&config.retrieval.avoided_penalty)
            || config.retrieval.avoided_penalty == 0.0
        {
            errors.push(ValidationError::new(
                "retrieval.avoided_penalty",
                "must be greater than 0 and at most 1.0",
            ));
        }
    }

    fn validate_synthesis(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.synthesis.max_chunk_chars == 0 {
            errors.push(ValidationError::new(
                "synthesis.max_chunk_chars",
                "must be greater than 0",
            ));
        }
        if config.synthesis.extractive_sentences == 0 {
            errors.push(ValidationError::new(
                "synthesis.extractive_sentences",
                "must be at least 1",
            ));
        }
    }

    fn validate_feedback(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.feedback.batch_size == 0 {
            errors.push(ValidationError::new("feedback.batch_size", "must be at least 1"));
        }
        if config.feedback.interval_secs == 0 {
            errors.push(ValidationError::new(
                "feedback.interval_secs",
                "must be at least 1",
            ));
        }
        if config.feedback.insight_capacity == 0 {
            errors.push(ValidationError::new(
                "feedback.insight_capacity",
                "must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&config.feedback.preferred_ratio)
            || !(0.0..=1.0).contains(&config.feedback.avoided_ratio)
        {
            errors.push(ValidationError::new(
                "feedback.preferred_ratio",
                "ratios must be between 0 and 1",
            ));
        } else if config.feedback.avoided_ratio >= config.feedback.preferred_ratio {
            errors.push(ValidationError::new(
                "feedback.avoided_ratio",
                "must be below preferred_ratio",
            ));
        }
    }

    fn validate_providers(config: &Config, errors: &mut Vec<ValidationError>) {
        for (i, entry) in config.providers.iter().enumerate() {
            let path = format!("providers[{i}]");
            if !matches!(entry.kind.as_str(), "chat" | "huggingface") {
                errors.push(ValidationError::new(
                    format!("{path}.kind"),
                    format!("unknown kind \"{}\", expected \"chat\" or \"huggingface\"", entry.kind),
                ));
            }
            if entry.base_url.is_empty() {
                errors.push(ValidationError::new(format!("{path}.base_url"), "must not be empty"));
            }
            if entry.model.is_empty() {
                errors.push(ValidationError::new(format!("{path}.model"), "must not be empty"));
            }
            if entry.api_key_env.is_empty() {
                errors.push(ValidationError::new(
                    format!("{path}.api_key_env"),
                    "must not be empty",
                ));
            }
        }
    }
}
