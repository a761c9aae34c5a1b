use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub service: Service,
	pub retrieval: Retrieval,
	pub thresholds: Thresholds,
	pub short_query: ShortQuery,
	#[serde(default)]
	pub selection: Selection,
	pub gates: Gates,
	pub prompts: Prompts,
	#[serde(default)]
	pub no_context_detector: NoContextDetector,
	#[serde(default)]
	pub query_expansion: QueryExpansion,
	pub providers: Option<Providers>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Service {
	pub log_level: String,
	/// Budget for one vector-search call.
	pub search_timeout_ms: u64,
	/// Budget for one chat-model call.
	pub generation_timeout_ms: u64,
}
impl Default for Service {
	fn default() -> Self {
		Self {
			log_level: "info".to_string(),
			search_timeout_ms: 5_000,
			generation_timeout_ms: 60_000,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
	DotProduct,
	Cosine,
	Euclidean,
}
impl DistanceMetric {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::DotProduct => "dot_product",
			Self::Cosine => "cosine",
			Self::Euclidean => "euclidean",
		}
	}
}

/// Whether the vector store reports a similarity (higher is closer) or a distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
	Similarity,
	Distance,
}
impl ScoreKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Similarity => "similarity",
			Self::Distance => "distance",
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Retrieval {
	pub distance_metric: DistanceMetric,
	pub score_mode: ScoreKind,
	pub docs_normalized: bool,
	pub top_k: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
	pub low: f32,
	pub high: f32,
	/// Optional. Answers by quoting evidence without any LLM call when the top similarity reaches
	/// this value. Must be at least `high`.
	pub extractive: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShortQuery {
	#[serde(default = "default_short_max_tokens")]
	pub max_tokens: u32,
	pub low: f32,
	pub high: f32,
	#[serde(default = "default_short_floor_margin")]
	pub floor_margin: f32,
	/// Optional. Replaces the built-in stopword list.
	pub stopwords: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Selection {
	/// Maximum selected chunks per source. Zero disables the cap.
	pub per_doc_cap: u32,
	pub max_selected: u32,
	pub context_chunk_count: u32,
	pub mmr_lambda: f32,
	pub max_context_bytes: u32,
	pub adaptive_percentile: f32,
	pub adaptive_margin: f32,
	/// When false, MMR ranks by similarity only.
	pub diversity: bool,
}
impl Default for Selection {
	fn default() -> Self {
		Self {
			per_doc_cap: 2,
			max_selected: 7,
			context_chunk_count: 3,
			mmr_lambda: 0.30,
			max_context_bytes: 6_000,
			adaptive_percentile: 0.90,
			adaptive_margin: 0.03,
			diversity: true,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Gates {
	#[serde(default = "default_true")]
	pub enabled: bool,
	pub min_similarity: f32,
	pub min_chunks: u32,
	pub min_total_bytes: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prompts {
	/// System prompt for strictly grounded answers over high-similarity evidence.
	pub extractive: String,
	pub hybrid: String,
	pub fallback: String,
	pub no_context_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoContextRule {
	ExactToken,
	RegexPhrases,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NoContextDetector {
	pub enabled: bool,
	pub precedence: Vec<NoContextRule>,
	pub exact_token: ExactTokenRule,
	pub regex_phrases: RegexPhrasesRule,
}
impl Default for NoContextDetector {
	fn default() -> Self {
		Self {
			enabled: true,
			precedence: vec![NoContextRule::ExactToken, NoContextRule::RegexPhrases],
			exact_token: ExactTokenRule::default(),
			regex_phrases: RegexPhrasesRule::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExactTokenRule {
	/// Empty means "use prompts.no_context_token"; any other value must equal it.
	pub value: String,
	pub case_insensitive: bool,
	pub strip_whitespace: bool,
	pub max_chars: u32,
}
impl Default for ExactTokenRule {
	fn default() -> Self {
		Self { value: String::new(), case_insensitive: false, strip_whitespace: true, max_chars: 64 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegexPhrasesRule {
	pub patterns: Vec<String>,
	pub case_insensitive: bool,
}
impl Default for RegexPhrasesRule {
	fn default() -> Self {
		Self {
			patterns: vec![
				r"^\s*i (do not|don't) know\b".to_string(),
				r"\b(context|documents?) (does|do) not (contain|provide|mention)\b".to_string(),
			],
			case_insensitive: true,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryExpansion {
	pub enabled: bool,
	/// Caps appended phrases per query. Zero means no cap.
	pub max_phrases: u32,
	/// Trigger keyword (lower-case word or phrase) to expansion phrases.
	pub triggers: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub primary: LlmProviderConfig,
	pub fallback: Option<LlmProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

fn default_short_max_tokens() -> u32 {
	2
}

fn default_short_floor_margin() -> f32 {
	0.03
}

fn default_true() -> bool {
	true
}
