pub mod answer;
pub mod gate;
pub mod policy;
pub mod prompt;
pub mod selection;
pub mod trace;

mod error;

pub use answer::{AnswerRequest, AnswerResult, RetrievedChunk};
pub use error::{Error, Result};
pub use trace::{
	CandidateDecision, CandidateOutcome, DecisionTrace, FallbackReason, GateFailure, LlmRole, Stage,
	UsedLlm,
};

use std::{collections::BTreeMap, future::Future, pin::Pin, sync::Arc};

use serde::{Deserialize, Serialize};

use arbiter_config::{Config, LlmProviderConfig};
use arbiter_domain::{
	no_context::NoContextDetector,
	query::{QueryAugmenter, ShortQueryClassifier},
	score::ScoreConvention,
};
use arbiter_providers::chat;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait VectorSearch
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		query: &'a str,
		top_k: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<SearchHit>>>;
}

pub trait ChatModel
where
	Self: Send + Sync,
{
	fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, color_eyre::Result<String>>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
	pub title: Option<String>,
	pub page: Option<u32>,
	/// Provenance fields without a dedicated slot.
	#[serde(default)]
	pub extra: BTreeMap<String, String>,
}

/// One row returned by the vector store, before normalization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
	pub chunk_id: String,
	pub source_id: String,
	pub text: String,
	#[serde(default)]
	pub metadata: ChunkMetadata,
	pub raw_score: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RetrievedCandidate {
	pub chunk_id: String,
	pub source_id: String,
	pub raw_score: f32,
	pub similarity: f32,
	pub text: String,
	/// 1-based position in the search response.
	pub rank: u32,
	pub metadata: ChunkMetadata,
}

/// Chat-completions endpoint described by a `[providers.*]` config section.
pub struct HttpChatModel {
	cfg: LlmProviderConfig,
}
impl HttpChatModel {
	pub fn new(cfg: LlmProviderConfig) -> Self {
		Self { cfg }
	}
}
impl ChatModel for HttpChatModel {
	fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(chat::complete(&self.cfg, prompt))
	}
}

pub struct ArbiterService {
	pub cfg: Config,
	search: Arc<dyn VectorSearch>,
	primary: Arc<dyn ChatModel>,
	fallback: Option<Arc<dyn ChatModel>>,
	convention: ScoreConvention,
	classifier: ShortQueryClassifier,
	augmenter: QueryAugmenter,
	detector: NoContextDetector,
	policy_id: String,
}
impl ArbiterService {
	pub fn new(
		cfg: Config,
		search: Arc<dyn VectorSearch>,
		primary: Arc<dyn ChatModel>,
		fallback: Option<Arc<dyn ChatModel>>,
	) -> Result<Self> {
		let detector = NoContextDetector::from_config(&cfg.no_context_detector).map_err(|err| {
			Error::Configuration { message: format!("no_context_detector pattern: {err}") }
		})?;
		let policy_id = policy::policy_id(&cfg)?;

		Ok(Self {
			convention: ScoreConvention::from_config(&cfg.retrieval),
			classifier: ShortQueryClassifier::from_config(&cfg.short_query),
			augmenter: QueryAugmenter::from_config(&cfg.query_expansion),
			detector,
			policy_id,
			cfg,
			search,
			primary,
			fallback,
		})
	}

	/// Builds the service with HTTP chat models taken from the `[providers]` section.
	pub fn with_configured_providers(cfg: Config, search: Arc<dyn VectorSearch>) -> Result<Self> {
		let Some(providers) = cfg.providers.clone() else {
			return Err(Error::Configuration {
				message: "providers.primary must be set to use HTTP chat models.".to_string(),
			});
		};
		let primary: Arc<dyn ChatModel> = Arc::new(HttpChatModel::new(providers.primary));
		let fallback = providers
			.fallback
			.map(|cfg| Arc::new(HttpChatModel::new(cfg)) as Arc<dyn ChatModel>);

		Self::new(cfg, search, primary, fallback)
	}

	pub fn policy_id(&self) -> &str {
		&self.policy_id
	}
}
