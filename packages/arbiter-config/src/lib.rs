mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, DistanceMetric, ExactTokenRule, Gates, LlmProviderConfig, NoContextDetector,
	NoContextRule, Prompts, Providers, QueryExpansion, RegexPhrasesRule, Retrieval, ScoreKind,
	Selection, Service, ShortQuery, Thresholds,
};

use std::{fs, path::Path};

use regex::RegexBuilder;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		ParseFailure::Toml(source) => Error::ParseConfig { path: path.to_path_buf(), source },
		ParseFailure::Invalid(err) => err,
	})
}

/// Parses, normalizes and validates a configuration held in memory.
pub fn from_toml_str(raw: &str) -> Result<Config> {
	parse(raw).map_err(|err| match err {
		ParseFailure::Toml(source) => Error::ParseInline { source },
		ParseFailure::Invalid(err) => err,
	})
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.search_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "service.search_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.service.generation_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "service.generation_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.top_k must be greater than zero.".to_string(),
		});
	}

	validate_profile("thresholds", cfg.thresholds.low, cfg.thresholds.high)?;

	if let Some(extractive) = cfg.thresholds.extractive {
		validate_unit("thresholds.extractive", extractive)?;

		if extractive < cfg.thresholds.high {
			return Err(Error::Validation {
				message: "thresholds.extractive must be greater than or equal to thresholds.high."
					.to_string(),
			});
		}
	}

	validate_profile("short_query", cfg.short_query.low, cfg.short_query.high)?;
	validate_non_negative("short_query.floor_margin", cfg.short_query.floor_margin)?;

	let selection = &cfg.selection;

	if selection.max_selected == 0 {
		return Err(Error::Validation {
			message: "selection.max_selected must be greater than zero.".to_string(),
		});
	}
	if selection.context_chunk_count == 0 {
		return Err(Error::Validation {
			message: "selection.context_chunk_count must be greater than zero.".to_string(),
		});
	}
	if selection.max_context_bytes == 0 {
		return Err(Error::Validation {
			message: "selection.max_context_bytes must be greater than zero.".to_string(),
		});
	}

	validate_unit("selection.mmr_lambda", selection.mmr_lambda)?;
	validate_unit("selection.adaptive_percentile", selection.adaptive_percentile)?;
	validate_non_negative("selection.adaptive_margin", selection.adaptive_margin)?;
	validate_unit("gates.min_similarity", cfg.gates.min_similarity)?;

	for (label, value) in [
		("prompts.extractive", &cfg.prompts.extractive),
		("prompts.hybrid", &cfg.prompts.hybrid),
		("prompts.fallback", &cfg.prompts.fallback),
		("prompts.no_context_token", &cfg.prompts.no_context_token),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	validate_detector(&cfg.no_context_detector, &cfg.prompts.no_context_token)?;

	for (keyword, phrases) in &cfg.query_expansion.triggers {
		if keyword.trim().is_empty() {
			return Err(Error::Validation {
				message: "query_expansion.triggers keys must be non-empty.".to_string(),
			});
		}
		if phrases.iter().all(|phrase| phrase.trim().is_empty()) {
			return Err(Error::Validation {
				message: format!(
					"query_expansion.triggers.{keyword} must list at least one non-empty phrase."
				),
			});
		}
	}

	if let Some(providers) = cfg.providers.as_ref() {
		let mut entries = vec![("providers.primary", &providers.primary)];

		if let Some(fallback) = providers.fallback.as_ref() {
			entries.push(("providers.fallback", fallback));
		}

		for (label, provider) in entries {
			if provider.api_key.trim().is_empty() {
				return Err(Error::Validation {
					message: format!("{label}.api_key must be non-empty."),
				});
			}
			if provider.timeout_ms == 0 {
				return Err(Error::Validation {
					message: format!("{label}.timeout_ms must be greater than zero."),
				});
			}
			if !provider.temperature.is_finite() || provider.temperature < 0.0 {
				return Err(Error::Validation {
					message: format!("{label}.temperature must be a finite number, zero or greater."),
				});
			}
		}
	}

	Ok(())
}

enum ParseFailure {
	Toml(toml::de::Error),
	Invalid(Error),
}

fn parse(raw: &str) -> std::result::Result<Config, ParseFailure> {
	let mut cfg: Config = toml::from_str(raw).map_err(ParseFailure::Toml)?;

	normalize(&mut cfg);

	validate(&cfg).map_err(ParseFailure::Invalid)?;

	Ok(cfg)
}

fn validate_profile(label: &str, low: f32, high: f32) -> Result<()> {
	validate_unit(&format!("{label}.low"), low)?;
	validate_unit(&format!("{label}.high"), high)?;

	if high < low {
		return Err(Error::Validation {
			message: format!("{label}.high must be greater than or equal to {label}.low."),
		});
	}

	Ok(())
}

fn validate_unit(label: &str, value: f32) -> Result<()> {
	if !value.is_finite() {
		return Err(Error::Validation { message: format!("{label} must be a finite number.") });
	}
	if !(0.0..=1.0).contains(&value) {
		return Err(Error::Validation { message: format!("{label} must be in the range 0.0-1.0.") });
	}

	Ok(())
}

fn validate_non_negative(label: &str, value: f32) -> Result<()> {
	if !value.is_finite() {
		return Err(Error::Validation { message: format!("{label} must be a finite number.") });
	}
	if value < 0.0 {
		return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
	}

	Ok(())
}

fn validate_detector(detector: &NoContextDetector, sentinel: &str) -> Result<()> {
	for pattern in &detector.regex_phrases.patterns {
		RegexBuilder::new(pattern)
			.case_insensitive(detector.regex_phrases.case_insensitive)
			.build()
			.map_err(|err| Error::InvalidPattern {
				key: "no_context_detector.regex_phrases.patterns".to_string(),
				pattern: pattern.clone(),
				source: err,
			})?;
	}

	if detector.exact_token.value.trim() != sentinel.trim() {
		return Err(Error::Validation {
			message: "no_context_detector.exact_token.value must match prompts.no_context_token."
				.to_string(),
		});
	}
	if !detector.enabled {
		return Ok(());
	}
	if detector.precedence.is_empty() {
		return Err(Error::Validation {
			message: "no_context_detector.precedence must be non-empty when enabled.".to_string(),
		});
	}
	if detector.exact_token.max_chars == 0 {
		return Err(Error::Validation {
			message: "no_context_detector.exact_token.max_chars must be greater than zero."
				.to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.no_context_detector.exact_token.value.trim().is_empty() {
		cfg.no_context_detector.exact_token.value = cfg.prompts.no_context_token.trim().to_string();
	}
	if cfg.selection.context_chunk_count > cfg.selection.max_selected {
		cfg.selection.context_chunk_count = cfg.selection.max_selected;
	}

	cfg.no_context_detector.regex_phrases.patterns.retain(|pattern| !pattern.trim().is_empty());

	if let Some(stopwords) = cfg.short_query.stopwords.as_mut() {
		for word in stopwords.iter_mut() {
			*word = word.trim().to_lowercase();
		}

		stopwords.retain(|word| !word.is_empty());
	}

	let triggers = std::mem::take(&mut cfg.query_expansion.triggers);

	cfg.query_expansion.triggers = triggers
		.into_iter()
		.map(|(keyword, phrases)| (keyword.trim().to_lowercase(), phrases))
		.collect();
}
