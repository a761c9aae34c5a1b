use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use arbiter_config::{Config, DistanceMetric, ScoreKind};
use arbiter_domain::mode::AnswerMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Searching,
	Deciding,
	Extracting,
	Selecting,
	Gating,
	Composing,
	Generating,
	Detecting,
	Fallback,
	Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
	NoCandidates,
	BelowThreshold,
	GateFailed,
	NoContext,
}
impl FallbackReason {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::NoCandidates => "no_candidates",
			Self::BelowThreshold => "below_threshold",
			Self::GateFailed => "gate_failed",
			Self::NoContext => "no_context",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateFailure {
	MinSimilarity,
	MinChunks,
	MinTotalBytes,
}
impl GateFailure {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::MinSimilarity => "min_similarity",
			Self::MinChunks => "min_chunks",
			Self::MinTotalBytes => "min_total_bytes",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmRole {
	Primary,
	Fallback,
}
impl LlmRole {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Primary => "primary",
			Self::Fallback => "fallback",
		}
	}
}
impl Display for LlmRole {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Primary => "Primary",
			Self::Fallback => "Fallback",
		})
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsedLlm {
	#[default]
	None,
	Primary,
	Fallback,
}
impl From<LlmRole> for UsedLlm {
	fn from(role: LlmRole) -> Self {
		match role {
			LlmRole::Primary => Self::Primary,
			LlmRole::Fallback => Self::Fallback,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOutcome {
	Selected,
	BelowFloor,
	PerDocCap,
	/// Eligible, but `max_selected` was reached first.
	NotSelected,
}

/// Why one retrieved candidate did or did not make it into the evidence set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateDecision {
	pub chunk_id: String,
	pub source_id: String,
	pub rank: u32,
	pub similarity: f32,
	pub outcome: CandidateOutcome,
	pub selected_rank: Option<u32>,
	pub mmr_score: Option<f32>,
	pub nearest_chunk_id: Option<String>,
	pub overlap: Option<f32>,
	pub in_context: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
	pub trace_id: Uuid,
	pub policy_id: String,
	pub score_mode: ScoreKind,
	pub distance_metric: DistanceMetric,
	pub docs_normalized: bool,
	pub augmented_query: Option<String>,
	pub candidate_count: usize,
	pub max_similarity: Option<f32>,
	pub threshold_low: f32,
	pub threshold_high: f32,
	pub extractive_threshold: Option<f32>,
	pub short_query_active: bool,
	pub adaptive_floor: Option<f32>,
	pub mode: AnswerMode,
	pub fallback_reason: Option<FallbackReason>,
	pub used_llm: UsedLlm,
	pub llm_calls: Vec<LlmRole>,
	pub gate_failed: Option<GateFailure>,
	pub context_bytes_used: usize,
	pub chunks_included: Vec<String>,
	pub chunks_excluded: Vec<String>,
	pub no_context_triggered: bool,
	pub no_context_rule: Option<String>,
	pub stages: Vec<Stage>,
	pub candidates: Vec<CandidateDecision>,
}
impl DecisionTrace {
	pub(crate) fn new(trace_id: Uuid, policy_id: &str, cfg: &Config) -> Self {
		Self {
			trace_id,
			policy_id: policy_id.to_string(),
			score_mode: cfg.retrieval.score_mode,
			distance_metric: cfg.retrieval.distance_metric,
			docs_normalized: cfg.retrieval.docs_normalized,
			augmented_query: None,
			candidate_count: 0,
			max_similarity: None,
			threshold_low: cfg.thresholds.low,
			threshold_high: cfg.thresholds.high,
			extractive_threshold: cfg.thresholds.extractive,
			short_query_active: false,
			adaptive_floor: None,
			mode: AnswerMode::Fallback,
			fallback_reason: None,
			used_llm: UsedLlm::None,
			llm_calls: Vec::new(),
			gate_failed: None,
			context_bytes_used: 0,
			chunks_included: Vec::new(),
			chunks_excluded: Vec::new(),
			no_context_triggered: false,
			no_context_rule: None,
			stages: Vec::new(),
			candidates: Vec::new(),
		}
	}

	pub(crate) fn enter(&mut self, stage: Stage) {
		self.stages.push(stage);
	}

	pub(crate) fn record_llm_call(&mut self, role: LlmRole) {
		self.llm_calls.push(role);
		self.used_llm = role.into();
	}
}
