use std::{future::Future, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use arbiter_domain::{
	mode::{self, AnswerMode, ThresholdProfile},
	no_context::Detection,
	score,
};

use crate::{
	ArbiterService, ChatModel, ChunkMetadata, DecisionTrace, Error, FallbackReason, LlmRole,
	Result, RetrievedCandidate, Stage, gate, prompt,
	selection::{self, SelectionParams},
};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AnswerRequest {
	pub question: String,
	/// Overrides `service.search_timeout_ms` for this call.
	pub search_timeout_ms: Option<u64>,
	/// Overrides `service.generation_timeout_ms` for each model call.
	pub generation_timeout_ms: Option<u64>,
}
impl AnswerRequest {
	pub fn new(question: impl Into<String>) -> Self {
		Self { question: question.into(), ..Default::default() }
	}
}

/// Citation record for a chunk that backed (or was considered for) the answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
	pub chunk_id: String,
	pub source_id: String,
	pub rank: u32,
	pub similarity: f32,
	pub metadata: ChunkMetadata,
}
impl From<&RetrievedCandidate> for RetrievedChunk {
	fn from(candidate: &RetrievedCandidate) -> Self {
		Self {
			chunk_id: candidate.chunk_id.clone(),
			source_id: candidate.source_id.clone(),
			rank: candidate.rank,
			similarity: candidate.similarity,
			metadata: candidate.metadata.clone(),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
	pub question: String,
	pub answer: String,
	pub mode: AnswerMode,
	pub retrieved_chunks_metadata: Vec<RetrievedChunk>,
	pub decision_explain: DecisionTrace,
}

struct Budgets {
	search: Duration,
	generation: Duration,
}

struct Pending<'a> {
	question: &'a str,
	trace: DecisionTrace,
	budgets: Budgets,
}

impl ArbiterService {
	pub async fn answer_question(&self, question: &str) -> Result<AnswerResult> {
		self.answer(AnswerRequest::new(question)).await
	}

	pub async fn answer(&self, req: AnswerRequest) -> Result<AnswerResult> {
		let question = req.question.trim();

		if question.is_empty() {
			return Err(Error::InvalidRequest { message: "question must not be empty.".to_string() });
		}

		let budgets = Budgets {
			search: Duration::from_millis(
				req.search_timeout_ms.unwrap_or(self.cfg.service.search_timeout_ms),
			),
			generation: Duration::from_millis(
				req.generation_timeout_ms.unwrap_or(self.cfg.service.generation_timeout_ms),
			),
		};
		let mut trace = DecisionTrace::new(Uuid::new_v4(), &self.policy_id, &self.cfg);
		let short_query = self.classifier.is_short(question);
		let profile = if short_query {
			ThresholdProfile::short(&self.cfg.short_query)
		} else {
			ThresholdProfile::base(&self.cfg.thresholds)
		};

		trace.short_query_active = short_query;
		trace.threshold_low = profile.low;
		trace.threshold_high = profile.high;

		let augmentation = self.augmenter.augment(question);

		if augmentation.is_augmented() {
			trace.augmented_query = Some(augmentation.query.clone());
		}

		let mut pending = Pending { question, trace, budgets };

		pending.trace.enter(Stage::Searching);

		let candidates = self.retrieve(&augmentation.query, &pending).await?;

		pending.trace.candidate_count = candidates.len();
		pending.trace.enter(Stage::Deciding);

		let max_similarity = candidates.iter().map(|candidate| candidate.similarity).reduce(f32::max);
		let mode = mode::decide_mode(max_similarity, profile, self.cfg.thresholds.extractive);

		pending.trace.max_similarity = max_similarity;
		pending.trace.mode = mode;

		tracing::info!(
			trace_id = %pending.trace.trace_id,
			mode = mode.as_str(),
			max_similarity = ?max_similarity,
			candidate_count = candidates.len(),
			short_query,
			"Answer mode decided."
		);

		match max_similarity {
			_ if mode == AnswerMode::Extractive => Ok(self.extract(pending, &candidates)),
			Some(max_similarity) if mode.uses_evidence_gate() =>
				self.generate_grounded(pending, mode, max_similarity, &candidates, short_query).await,
			_ => {
				let reason = if candidates.is_empty() {
					FallbackReason::NoCandidates
				} else {
					FallbackReason::BelowThreshold
				};
				let citations = candidates
					.iter()
					.take(self.cfg.selection.max_selected as usize)
					.map(RetrievedChunk::from)
					.collect();

				self.fall_back(pending, reason, citations).await
			},
		}
	}

	async fn retrieve(&self, query: &str, pending: &Pending<'_>) -> Result<Vec<RetrievedCandidate>> {
		let top_k = self.cfg.retrieval.top_k;
		let hits =
			match tokio::time::timeout(pending.budgets.search, self.search.search(query, top_k))
				.await
			{
				Ok(Ok(hits)) => hits,
				Ok(Err(err)) => {
					tracing::warn!(
						error = %err,
						trace_id = %pending.trace.trace_id,
						"Vector search failed."
					);

					return Err(Error::UpstreamSearch { message: err.to_string() });
				},
				Err(_) => {
					tracing::warn!(
						trace_id = %pending.trace.trace_id,
						timeout_ms = pending.budgets.search.as_millis() as u64,
						"Vector search timed out."
					);

					return Err(Error::UpstreamSearch {
						message: format!(
							"Timed out after {} ms.",
							pending.budgets.search.as_millis()
						),
					});
				},
			};

		Ok(hits
			.into_iter()
			.take(top_k as usize)
			.enumerate()
			.map(|(idx, hit)| RetrievedCandidate {
				similarity: score::normalize_score(hit.raw_score, self.convention),
				raw_score: hit.raw_score,
				rank: idx as u32 + 1,
				chunk_id: hit.chunk_id,
				source_id: hit.source_id,
				text: hit.text,
				metadata: hit.metadata,
			})
			.collect())
	}

	fn extract(&self, mut pending: Pending<'_>, candidates: &[RetrievedCandidate]) -> AnswerResult {
		pending.trace.enter(Stage::Extracting);

		let extract = prompt::extractive_answer(
			candidates,
			self.cfg.selection.context_chunk_count as usize,
			self.cfg.selection.max_context_bytes as usize,
		);

		pending.trace.context_bytes_used = extract.answer.len();
		pending.trace.chunks_included =
			extract.quoted.iter().map(|candidate| candidate.chunk_id.clone()).collect();
		pending.trace.chunks_excluded = extract.excluded;

		let citations = extract.quoted.iter().map(RetrievedChunk::from).collect();

		finish(pending, AnswerMode::Extractive, extract.answer, citations)
	}

	async fn generate_grounded(
		&self,
		mut pending: Pending<'_>,
		mode: AnswerMode,
		max_similarity: f32,
		candidates: &[RetrievedCandidate],
		short_query: bool,
	) -> Result<AnswerResult> {
		pending.trace.enter(Stage::Selecting);

		let params = SelectionParams::from_config(&self.cfg, short_query);
		let evidence = selection::select_context(candidates, &params);
		let citations: Vec<RetrievedChunk> =
			evidence.selected.iter().map(RetrievedChunk::from).collect();

		pending.trace.adaptive_floor = evidence.floor;
		pending.trace.candidates = evidence.decisions;
		pending.trace.enter(Stage::Gating);

		if let Some(failure) = gate::evaluate(&self.cfg.gates, max_similarity, &evidence.context) {
			pending.trace.gate_failed = Some(failure);

			tracing::warn!(
				trace_id = %pending.trace.trace_id,
				mode = mode.as_str(),
				gate_failed = failure.as_str(),
				context_chunks = evidence.context.len(),
				"Evidence gate failed."
			);

			return self.fall_back(pending, FallbackReason::GateFailed, citations).await;
		}

		pending.trace.enter(Stage::Composing);

		let composed = prompt::compose_grounded(
			&self.cfg.prompts,
			mode,
			pending.question,
			&evidence.context,
			self.cfg.selection.max_context_bytes as usize,
		);

		pending.trace.context_bytes_used = composed.evidence.text.len();
		pending.trace.chunks_included = composed.evidence.included;
		pending.trace.chunks_excluded = composed.evidence.excluded;
		pending.trace.enter(Stage::Generating);

		let reply =
			call_model(&mut pending, LlmRole::Primary, &self.primary, &composed.text).await?;

		pending.trace.enter(Stage::Detecting);

		let detection = if reply.trim().is_empty() {
			Detection { triggered: true, rule: "empty_reply".to_string() }
		} else {
			self.detector.detect(&reply)
		};

		if detection.triggered {
			tracing::warn!(
				trace_id = %pending.trace.trace_id,
				mode = mode.as_str(),
				rule = detection.rule.as_str(),
				"Model reported no usable context."
			);

			pending.trace.no_context_triggered = true;
			pending.trace.no_context_rule = Some(detection.rule);

			return self.fall_back(pending, FallbackReason::NoContext, citations).await;
		}

		Ok(finish(pending, mode, reply.trim().to_string(), citations))
	}

	async fn fall_back(
		&self,
		mut pending: Pending<'_>,
		reason: FallbackReason,
		citations: Vec<RetrievedChunk>,
	) -> Result<AnswerResult> {
		pending.trace.enter(Stage::Fallback);
		pending.trace.fallback_reason = Some(reason);

		let (role, model) = match self.fallback.as_ref() {
			Some(model) => (LlmRole::Fallback, model),
			None => (LlmRole::Primary, &self.primary),
		};
		let prompt = prompt::compose_fallback(&self.cfg.prompts, pending.question);
		let reply = call_model(&mut pending, role, model, &prompt).await?;

		tracing::info!(
			trace_id = %pending.trace.trace_id,
			reason = reason.as_str(),
			role = role.as_str(),
			"Answered without evidence."
		);

		Ok(finish(pending, AnswerMode::Fallback, reply.trim().to_string(), citations))
	}
}

async fn call_model(
	pending: &mut Pending<'_>,
	role: LlmRole,
	model: &Arc<dyn ChatModel>,
	prompt: &str,
) -> Result<String> {
	pending.trace.record_llm_call(role);

	let budget = pending.budgets.generation;

	with_budget(budget, model.generate(prompt)).await.map_err(|message| {
		tracing::warn!(
			trace_id = %pending.trace.trace_id,
			role = role.as_str(),
			error = message.as_str(),
			"Model generation failed."
		);

		Error::UpstreamGeneration { role, message }
	})
}

async fn with_budget<T>(
	budget: Duration,
	fut: impl Future<Output = color_eyre::Result<T>>,
) -> std::result::Result<T, String> {
	match tokio::time::timeout(budget, fut).await {
		Ok(Ok(value)) => Ok(value),
		Ok(Err(err)) => Err(err.to_string()),
		Err(_) => Err(format!("Timed out after {} ms.", budget.as_millis())),
	}
}

fn finish(
	mut pending: Pending<'_>,
	mode: AnswerMode,
	answer: String,
	citations: Vec<RetrievedChunk>,
) -> AnswerResult {
	pending.trace.mode = mode;
	pending.trace.enter(Stage::Done);

	tracing::info!(
		trace_id = %pending.trace.trace_id,
		mode = mode.as_str(),
		used_llm = ?pending.trace.used_llm,
		llm_calls = pending.trace.llm_calls.len(),
		context_bytes = pending.trace.context_bytes_used,
		"Answer ready."
	);

	AnswerResult {
		question: pending.question.to_string(),
		answer,
		mode,
		retrieved_chunks_metadata: citations,
		decision_explain: pending.trace,
	}
}
