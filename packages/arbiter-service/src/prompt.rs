use std::collections::HashSet;

use arbiter_config::Prompts;
use arbiter_domain::mode::AnswerMode;

use crate::{RetrievedCandidate, selection};

pub const EVIDENCE_SEPARATOR: &str = "\n\n---\n\n";

const QUOTE_SEPARATOR: &str = "\n\n";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackedEvidence {
	pub text: String,
	pub included: Vec<String>,
	/// Chunks with no byte left for them.
	pub excluded: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposedPrompt {
	pub text: String,
	pub evidence: PackedEvidence,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractiveAnswer {
	pub answer: String,
	pub quoted: Vec<RetrievedCandidate>,
	pub excluded: Vec<String>,
}

/// Byte length of `texts` joined with the evidence separator, before any truncation.
pub fn joined_len<'a>(texts: impl IntoIterator<Item = &'a str>) -> usize {
	let mut total = 0;
	let mut count: usize = 0;

	for text in texts {
		total += text.len();
		count += 1;
	}

	total + EVIDENCE_SEPARATOR.len() * count.saturating_sub(1)
}

/// Joins `(chunk_id, text)` pairs until `max_bytes` is spent, cutting the last one at a char
/// boundary.
pub fn pack_evidence<'a>(
	chunks: impl IntoIterator<Item = (&'a str, &'a str)>,
	separator: &str,
	max_bytes: usize,
) -> PackedEvidence {
	let mut out = PackedEvidence::default();

	for (chunk_id, text) in chunks {
		let sep = if out.included.is_empty() { "" } else { separator };
		let room = max_bytes.saturating_sub(out.text.len() + sep.len());
		let piece = truncate_at_char_boundary(text, room);

		if piece.is_empty() {
			out.excluded.push(chunk_id.to_string());

			continue;
		}

		out.text.push_str(sep);
		out.text.push_str(piece);
		out.included.push(chunk_id.to_string());
	}

	out
}

pub fn sentinel_instruction(token: &str) -> String {
	format!(
		"If the context does not contain the answer, reply with exactly {token} and nothing else."
	)
}

/// System prompt for an evidence-backed mode. The sentinel instruction is always appended.
pub fn system_prompt(prompts: &Prompts, mode: AnswerMode) -> String {
	let base = match mode {
		AnswerMode::Rag | AnswerMode::Extractive => prompts.extractive.trim_end(),
		AnswerMode::Hybrid | AnswerMode::Fallback => prompts.hybrid.trim_end(),
	};

	format!("{base}\n\n{}", sentinel_instruction(&prompts.no_context_token))
}

pub fn compose_grounded(
	prompts: &Prompts,
	mode: AnswerMode,
	question: &str,
	evidence: &[RetrievedCandidate],
	max_context_bytes: usize,
) -> ComposedPrompt {
	let evidence = pack_evidence(
		evidence.iter().map(|candidate| (candidate.chunk_id.as_str(), candidate.text.as_str())),
		EVIDENCE_SEPARATOR,
		max_context_bytes,
	);
	let text = format!(
		"{}\n\n[Context]\n{}\n\n[Question]\n{question}",
		system_prompt(prompts, mode),
		evidence.text
	);

	ComposedPrompt { text, evidence }
}

pub fn compose_fallback(prompts: &Prompts, question: &str) -> String {
	format!("{}\n\n{question}", prompts.fallback.trim_end())
}

/// Quotes the most similar distinct chunks verbatim, each followed by its `[source_id]`.
pub fn extractive_answer(
	candidates: &[RetrievedCandidate],
	max_chunks: usize,
	max_bytes: usize,
) -> ExtractiveAnswer {
	let mut seen = HashSet::new();
	let mut picked = Vec::new();

	for candidate in selection::by_similarity(candidates) {
		if picked.len() >= max_chunks {
			break;
		}

		let key = candidate.text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();

		if !key.is_empty() && seen.insert(key) {
			picked.push(candidate);
		}
	}

	let mut answer = String::new();
	let mut quoted: Vec<RetrievedCandidate> = Vec::new();
	let mut excluded = Vec::new();

	for candidate in picked {
		let sep = if quoted.is_empty() { "" } else { QUOTE_SEPARATOR };
		let citation = format!(" [{}]", candidate.source_id);
		let room = max_bytes.saturating_sub(answer.len() + sep.len() + citation.len());
		// The citation is reserved first; the quote is cut to whatever is left.
		let piece = truncate_at_char_boundary(candidate.text.trim(), room);

		if piece.is_empty() {
			excluded.push(candidate.chunk_id.clone());

			continue;
		}

		answer.push_str(sep);
		answer.push_str(piece);
		answer.push_str(&citation);
		quoted.push(candidate.clone());
	}

	ExtractiveAnswer { answer, quoted, excluded }
}

fn truncate_at_char_boundary(text: &str, max_bytes: usize) -> &str {
	if text.len() <= max_bytes {
		return text;
	}

	let mut end = max_bytes;

	while !text.is_char_boundary(end) {
		end -= 1;
	}

	&text[..end]
}

#[cfg(test)]
mod tests {
	use crate::ChunkMetadata;

	use super::*;

	fn prompts() -> Prompts {
		Prompts {
			extractive: "Answer strictly from the context.".to_string(),
			hybrid: "Prefer the context; use general knowledge if needed.\n".to_string(),
			fallback: "Answer from general knowledge.".to_string(),
			no_context_token: "__NO_CONTEXT__".to_string(),
		}
	}

	fn candidate(rank: u32, source_id: &str, similarity: f32, text: &str) -> RetrievedCandidate {
		RetrievedCandidate {
			chunk_id: format!("c{rank}"),
			source_id: source_id.to_string(),
			raw_score: similarity,
			similarity,
			text: text.to_string(),
			rank,
			metadata: ChunkMetadata::default(),
		}
	}

	#[test]
	fn grounded_prompt_layout() {
		let evidence = vec![candidate(1, "a", 0.9, "First."), candidate(2, "b", 0.8, "Second.")];
		let composed =
			compose_grounded(&prompts(), AnswerMode::Hybrid, "Why?", &evidence, 1_000);

		assert_eq!(
			composed.text,
			"Prefer the context; use general knowledge if needed.\n\nIf the context does not \
			 contain the answer, reply with exactly __NO_CONTEXT__ and nothing else.\n\n[Context]\n\
			 First.\n\n---\n\nSecond.\n\n[Question]\nWhy?"
		);
		assert_eq!(composed.evidence.included, vec!["c1", "c2"]);
	}

	#[test]
	fn rag_uses_the_strict_prompt() {
		let prompt = system_prompt(&prompts(), AnswerMode::Rag);

		assert!(prompt.starts_with("Answer strictly from the context."));
		assert!(prompt.ends_with("reply with exactly __NO_CONTEXT__ and nothing else."));
	}

	#[test]
	fn fallback_prompt_has_no_context_block() {
		assert_eq!(
			compose_fallback(&prompts(), "Who founded the company?"),
			"Answer from general knowledge.\n\nWho founded the company?"
		);
	}

	#[test]
	fn packing_truncates_and_records_exclusions() {
		let packed = pack_evidence(
			[("c1", "abcdefghij"), ("c2", "klmnopqrst"), ("c3", "uvwxyz")],
			EVIDENCE_SEPARATOR,
			20,
		);

		assert_eq!(packed.text, "abcdefghij\n\n---\n\nklm");
		assert_eq!(packed.text.len(), 20);
		assert_eq!(packed.included, vec!["c1", "c2"]);
		assert_eq!(packed.excluded, vec!["c3"]);
	}

	#[test]
	fn truncation_respects_char_boundaries() {
		let packed = pack_evidence([("c1", "naïve café")], EVIDENCE_SEPARATOR, 3);

		assert_eq!(packed.text, "na");
		assert_eq!(truncate_at_char_boundary("é", 1), "");
		assert!(pack_evidence([("c1", "é")], EVIDENCE_SEPARATOR, 1).excluded == vec!["c1"]);
	}

	#[test]
	fn joined_len_counts_separators() {
		assert_eq!(joined_len(["abc", "de"]), 5 + EVIDENCE_SEPARATOR.len());
		assert_eq!(joined_len(["abc"]), 3);
		assert_eq!(joined_len(Vec::<&str>::new()), 0);
	}

	#[test]
	fn extractive_answer_quotes_distinct_chunks_with_citations() {
		let candidates = vec![
			candidate(1, "policy", 0.97, "Refunds are issued within 30 days."),
			candidate(2, "faq", 0.96, "refunds are issued   within 30 days."),
			candidate(3, "terms", 0.99, "Store credit never expires."),
		];
		let out = extractive_answer(&candidates, 3, 1_000);

		assert_eq!(
			out.answer,
			"Store credit never expires. [terms]\n\nRefunds are issued within 30 days. [policy]"
		);
		assert_eq!(out.quoted.len(), 2);
		assert!(out.excluded.is_empty());
	}

	#[test]
	fn extractive_answer_respects_byte_budget() {
		let candidates = vec![
			candidate(1, "a", 0.97, "0123456789"),
			candidate(2, "b", 0.96, "abcdefghij"),
		];
		let out = extractive_answer(&candidates, 3, 14);

		assert_eq!(out.answer, "0123456789 [a]");
		assert_eq!(out.excluded, vec!["c2"]);
		assert_eq!(out.quoted[0].chunk_id, "c1");
	}

	#[test]
	fn extractive_answer_keeps_the_citation_when_a_quote_is_cut() {
		let long = "Invoices are payable within thirty days of issue. ".repeat(10);
		let candidates = vec![candidate(1, "billing", 0.97, &long)];
		let out = extractive_answer(&candidates, 3, 100);

		assert!(out.answer.len() <= 100);
		assert!(out.answer.ends_with(" [billing]"));
		assert!(out.answer.starts_with("Invoices are payable within thirty days"));
		assert_eq!(out.quoted.len(), 1);
		assert!(out.excluded.is_empty());
	}

	#[test]
	fn extractive_answer_excludes_chunks_without_room_for_a_citation() {
		let candidates = vec![candidate(1, "billing-handbook", 0.97, "Invoices are due.")];
		let out = extractive_answer(&candidates, 3, 12);

		assert_eq!(out.answer, "");
		assert!(out.quoted.is_empty());
		assert_eq!(out.excluded, vec!["c1"]);
	}
}
