use serde::{Deserialize, Serialize};

use arbiter_config::{ShortQuery, Thresholds};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
	/// Quote evidence verbatim with citations; no LLM call.
	Extractive,
	/// Generate strictly from high-similarity evidence.
	Rag,
	/// Generate from evidence plus model knowledge.
	Hybrid,
	/// Generate from model knowledge only.
	Fallback,
}
impl AnswerMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Extractive => "extractive",
			Self::Rag => "rag",
			Self::Hybrid => "hybrid",
			Self::Fallback => "fallback",
		}
	}

	pub fn uses_evidence_gate(self) -> bool {
		matches!(self, Self::Rag | Self::Hybrid)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ThresholdProfile {
	pub low: f32,
	pub high: f32,
}
impl ThresholdProfile {
	pub fn base(cfg: &Thresholds) -> Self {
		Self { low: cfg.low, high: cfg.high }
	}

	pub fn short(cfg: &ShortQuery) -> Self {
		Self { low: cfg.low, high: cfg.high }
	}
}

/// Chooses the answering mode from the best similarity, if any candidate was retrieved.
///
/// Total over every input: no candidates and NaN both route to fallback.
pub fn decide_mode(
	max_similarity: Option<f32>,
	profile: ThresholdProfile,
	extractive_threshold: Option<f32>,
) -> AnswerMode {
	let Some(similarity) = max_similarity else { return AnswerMode::Fallback };

	if similarity.is_nan() {
		return AnswerMode::Fallback;
	}
	if let Some(extractive) = extractive_threshold
		&& similarity >= extractive
		&& similarity >= profile.high
	{
		return AnswerMode::Extractive;
	}
	if similarity >= profile.high {
		return AnswerMode::Rag;
	}
	if similarity >= profile.low {
		return AnswerMode::Hybrid;
	}

	AnswerMode::Fallback
}
