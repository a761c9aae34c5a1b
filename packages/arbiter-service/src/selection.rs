use std::{
	cmp::Ordering,
	collections::{HashMap, HashSet},
};

use arbiter_config::Config;
use arbiter_domain::text;

use crate::{CandidateDecision, CandidateOutcome, RetrievedCandidate};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelectionParams {
	/// Zero disables the cap.
	pub per_doc_cap: u32,
	pub max_selected: u32,
	pub context_chunk_count: u32,
	pub mmr_lambda: f32,
	pub adaptive_percentile: f32,
	pub adaptive_margin: f32,
	pub diversity: bool,
	/// Lower bound for the adaptive floor; zero when gates are off.
	pub min_similarity: f32,
	/// Extra floor margin applied to short queries.
	pub short_margin: f32,
}
impl SelectionParams {
	pub fn from_config(cfg: &Config, short_query: bool) -> Self {
		let selection = &cfg.selection;

		Self {
			per_doc_cap: selection.per_doc_cap,
			max_selected: selection.max_selected,
			context_chunk_count: selection.context_chunk_count,
			mmr_lambda: selection.mmr_lambda,
			adaptive_percentile: selection.adaptive_percentile,
			adaptive_margin: selection.adaptive_margin,
			diversity: selection.diversity,
			min_similarity: if cfg.gates.enabled { cfg.gates.min_similarity } else { 0.0 },
			short_margin: if short_query { cfg.short_query.floor_margin } else { 0.0 },
		}
	}
}

#[derive(Clone, Debug, Default)]
pub struct EvidenceSet {
	pub floor: Option<f32>,
	/// Every selected candidate, in pick order.
	pub selected: Vec<RetrievedCandidate>,
	/// Prioritized subset handed to the model, by descending similarity.
	pub context: Vec<RetrievedCandidate>,
	/// One entry per input candidate, in search order.
	pub decisions: Vec<CandidateDecision>,
}

#[derive(Clone, Copy)]
struct MmrPick {
	idx: usize,
	score: f32,
	overlap: Option<f32>,
	nearest: Option<usize>,
	rank: u32,
}
impl MmrPick {
	fn better_than(self, other: &Self) -> bool {
		self.score > other.score || (self.score == other.score && self.rank < other.rank)
	}
}

/// Linear-interpolated percentile of `values`, with `p` in `[0, 1]`.
pub fn percentile(values: &[f32], p: f32) -> Option<f32> {
	if values.is_empty() {
		return None;
	}

	let mut sorted = values.to_vec();

	sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

	let pos = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f32;
	let lower = pos.floor() as usize;
	let upper = pos.ceil() as usize;

	if lower == upper {
		return Some(sorted[lower]);
	}

	let weight = pos - lower as f32;

	Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

pub fn adaptive_floor(similarities: &[f32], params: &SelectionParams) -> Option<f32> {
	let p = percentile(similarities, params.adaptive_percentile)?;

	Some(params.min_similarity.max(p - params.adaptive_margin) + params.short_margin)
}

/// Sorts by descending similarity; equal similarities keep search order.
pub fn by_similarity(candidates: &[RetrievedCandidate]) -> Vec<&RetrievedCandidate> {
	let mut ordered: Vec<&RetrievedCandidate> = candidates.iter().collect();

	ordered.sort_by(|a, b| {
		b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal).then(a.rank.cmp(&b.rank))
	});

	ordered
}

/// Filters candidates by the adaptive floor, then picks a diverse evidence set with MMR.
pub fn select_context(candidates: &[RetrievedCandidate], params: &SelectionParams) -> EvidenceSet {
	let similarities: Vec<f32> = candidates.iter().map(|candidate| candidate.similarity).collect();
	let Some(floor) = adaptive_floor(&similarities, params) else {
		return EvidenceSet::default();
	};
	let words: Vec<HashSet<String>> =
		candidates.iter().map(|candidate| text::word_set(&candidate.text)).collect();
	let mut remaining: Vec<usize> =
		(0..candidates.len()).filter(|&idx| candidates[idx].similarity >= floor).collect();
	let mut picks: Vec<MmrPick> = Vec::new();
	let mut per_source: HashMap<&str, u32> = HashMap::new();

	while picks.len() < params.max_selected as usize {
		let mut best: Option<(usize, MmrPick)> = None;

		for (pos, &idx) in remaining.iter().enumerate() {
			if source_capped(&per_source, &candidates[idx].source_id, params.per_doc_cap) {
				continue;
			}

			let pick = score_candidate(idx, candidates, &words, &picks, params);

			if best.as_ref().map(|(_, current)| pick.better_than(current)).unwrap_or(true) {
				best = Some((pos, pick));
			}
		}

		let Some((pos, pick)) = best else { break };

		remaining.remove(pos);
		*per_source.entry(candidates[pick.idx].source_id.as_str()).or_default() += 1;
		picks.push(pick);
	}

	let selected: Vec<RetrievedCandidate> =
		picks.iter().map(|pick| candidates[pick.idx].clone()).collect();
	let context: Vec<RetrievedCandidate> = by_similarity(&selected)
		.into_iter()
		.take(params.context_chunk_count as usize)
		.cloned()
		.collect();
	let in_context: HashSet<u32> = context.iter().map(|candidate| candidate.rank).collect();
	let mut decisions = Vec::with_capacity(candidates.len());

	for (idx, candidate) in candidates.iter().enumerate() {
		let picked = picks.iter().position(|pick| pick.idx == idx);
		let decision = match picked {
			Some(order) => {
				let pick = picks[order];

				CandidateDecision {
					selected_rank: Some(order as u32 + 1),
					mmr_score: Some(pick.score),
					nearest_chunk_id: pick.nearest.map(|i| candidates[i].chunk_id.clone()),
					overlap: pick.overlap,
					in_context: in_context.contains(&candidate.rank),
					..bare_decision(candidate, CandidateOutcome::Selected)
				}
			},
			None if candidate.similarity < floor =>
				bare_decision(candidate, CandidateOutcome::BelowFloor),
			None => {
				let outcome =
					if source_capped(&per_source, &candidate.source_id, params.per_doc_cap) {
						CandidateOutcome::PerDocCap
					} else {
						CandidateOutcome::NotSelected
					};
				let pick = score_candidate(idx, candidates, &words, &picks, params);

				CandidateDecision {
					mmr_score: Some(pick.score),
					nearest_chunk_id: pick.nearest.map(|i| candidates[i].chunk_id.clone()),
					overlap: pick.overlap,
					..bare_decision(candidate, outcome)
				}
			},
		};

		decisions.push(decision);
	}

	EvidenceSet { floor: Some(floor), selected, context, decisions }
}

fn source_capped(per_source: &HashMap<&str, u32>, source_id: &str, cap: u32) -> bool {
	cap > 0 && per_source.get(source_id).copied().unwrap_or(0) >= cap
}

fn score_candidate(
	idx: usize,
	candidates: &[RetrievedCandidate],
	words: &[HashSet<String>],
	picks: &[MmrPick],
	params: &SelectionParams,
) -> MmrPick {
	let similarity = candidates[idx].similarity;
	let mut overlap: Option<f32> = None;
	let mut nearest: Option<usize> = None;

	for pick in picks {
		let value = text::jaccard(&words[idx], &words[pick.idx]);

		if overlap.map(|current| value > current).unwrap_or(true) {
			overlap = Some(value);
			nearest = Some(pick.idx);
		}
	}

	let score = match overlap {
		Some(redundancy) if params.diversity =>
			params.mmr_lambda * similarity - (1.0 - params.mmr_lambda) * redundancy,
		_ => similarity,
	};

	MmrPick { idx, score, overlap, nearest, rank: candidates[idx].rank }
}

fn bare_decision(candidate: &RetrievedCandidate, outcome: CandidateOutcome) -> CandidateDecision {
	CandidateDecision {
		chunk_id: candidate.chunk_id.clone(),
		source_id: candidate.source_id.clone(),
		rank: candidate.rank,
		similarity: candidate.similarity,
		outcome,
		selected_rank: None,
		mmr_score: None,
		nearest_chunk_id: None,
		overlap: None,
		in_context: false,
	}
}
