use serde_json::Value;

use arbiter_config::{Config, NoContextRule};

use crate::{Error, Result};

/// Decision-relevant configuration. Timeouts, log level and provider credentials are left out so
/// that operational changes keep the same policy id.
pub fn policy_snapshot(cfg: &Config) -> Value {
	let detector = &cfg.no_context_detector;
	let precedence: Vec<&str> = detector
		.precedence
		.iter()
		.map(|rule| match rule {
			NoContextRule::ExactToken => "exact_token",
			NoContextRule::RegexPhrases => "regex_phrases",
		})
		.collect();

	serde_json::json!({
		"retrieval": {
			"distance_metric": cfg.retrieval.distance_metric.as_str(),
			"score_mode": cfg.retrieval.score_mode.as_str(),
			"docs_normalized": cfg.retrieval.docs_normalized,
			"top_k": cfg.retrieval.top_k,
		},
		"thresholds": {
			"low": cfg.thresholds.low,
			"high": cfg.thresholds.high,
			"extractive": cfg.thresholds.extractive,
		},
		"short_query": {
			"max_tokens": cfg.short_query.max_tokens,
			"low": cfg.short_query.low,
			"high": cfg.short_query.high,
			"floor_margin": cfg.short_query.floor_margin,
			"stopwords": cfg.short_query.stopwords,
		},
		"selection": {
			"per_doc_cap": cfg.selection.per_doc_cap,
			"max_selected": cfg.selection.max_selected,
			"context_chunk_count": cfg.selection.context_chunk_count,
			"mmr_lambda": cfg.selection.mmr_lambda,
			"max_context_bytes": cfg.selection.max_context_bytes,
			"adaptive_percentile": cfg.selection.adaptive_percentile,
			"adaptive_margin": cfg.selection.adaptive_margin,
			"diversity": cfg.selection.diversity,
		},
		"gates": {
			"enabled": cfg.gates.enabled,
			"min_similarity": cfg.gates.min_similarity,
			"min_chunks": cfg.gates.min_chunks,
			"min_total_bytes": cfg.gates.min_total_bytes,
		},
		"prompts": {
			"extractive": cfg.prompts.extractive,
			"hybrid": cfg.prompts.hybrid,
			"fallback": cfg.prompts.fallback,
			"no_context_token": cfg.prompts.no_context_token,
		},
		"no_context_detector": {
			"enabled": detector.enabled,
			"precedence": precedence,
			"exact_token": {
				"value": detector.exact_token.value,
				"case_insensitive": detector.exact_token.case_insensitive,
				"strip_whitespace": detector.exact_token.strip_whitespace,
				"max_chars": detector.exact_token.max_chars,
			},
			"regex_phrases": {
				"patterns": detector.regex_phrases.patterns,
				"case_insensitive": detector.regex_phrases.case_insensitive,
			},
		},
		"query_expansion": {
			"enabled": cfg.query_expansion.enabled,
			"max_phrases": cfg.query_expansion.max_phrases,
			"triggers": cfg.query_expansion.triggers,
		},
	})
}

pub fn hash_policy_snapshot(payload: &Value) -> Result<String> {
	let raw = serde_json::to_vec(payload).map_err(|err| Error::Configuration {
		message: format!("Failed to encode policy snapshot: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

pub fn policy_id(cfg: &Config) -> Result<String> {
	hash_policy_snapshot(&policy_snapshot(cfg))
}
