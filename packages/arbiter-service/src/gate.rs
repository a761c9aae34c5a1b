use arbiter_config::Gates;

use crate::{GateFailure, RetrievedCandidate, prompt};

/// Post-selection evidence checks, in fixed order. The first failure wins.
pub fn evaluate(
	gates: &Gates,
	max_similarity: f32,
	context: &[RetrievedCandidate],
) -> Option<GateFailure> {
	if !gates.enabled {
		return None;
	}
	if max_similarity < gates.min_similarity {
		return Some(GateFailure::MinSimilarity);
	}
	if context.len() < gates.min_chunks as usize {
		return Some(GateFailure::MinChunks);
	}

	let total_bytes = prompt::joined_len(context.iter().map(|candidate| candidate.text.as_str()));

	if total_bytes < gates.min_total_bytes as usize {
		return Some(GateFailure::MinTotalBytes);
	}

	None
}

#[cfg(test)]
mod tests {
	use crate::ChunkMetadata;

	use super::*;

	fn gates() -> Gates {
		Gates { enabled: true, min_similarity: 0.5, min_chunks: 2, min_total_bytes: 20 }
	}

	fn chunk(rank: u32, text: &str) -> RetrievedCandidate {
		RetrievedCandidate {
			chunk_id: format!("c{rank}"),
			source_id: "s".to_string(),
			raw_score: 0.9,
			similarity: 0.9,
			text: text.to_string(),
			rank,
			metadata: ChunkMetadata::default(),
		}
	}

	#[test]
	fn passes_when_every_check_holds() {
		let context = vec![chunk(1, "0123456789"), chunk(2, "0123456789")];

		assert_eq!(evaluate(&gates(), 0.9, &context), None);
	}

	#[test]
	fn first_failure_wins() {
		assert_eq!(evaluate(&gates(), 0.4, &[]), Some(GateFailure::MinSimilarity));
		assert_eq!(evaluate(&gates(), 0.9, &[chunk(1, "x")]), Some(GateFailure::MinChunks));
		assert_eq!(
			evaluate(&gates(), 0.9, &[chunk(1, "ab"), chunk(2, "cd")]),
			Some(GateFailure::MinTotalBytes)
		);
	}

	#[test]
	fn separators_count_toward_total_bytes() {
		// 2 + 7 + 2 = 11 bytes once joined.
		let context = vec![chunk(1, "ab"), chunk(2, "cd")];
		let mut gates = gates();

		gates.min_total_bytes = 11;

		assert_eq!(evaluate(&gates, 0.9, &context), None);

		gates.min_total_bytes = 12;

		assert_eq!(evaluate(&gates, 0.9, &context), Some(GateFailure::MinTotalBytes));
	}

	#[test]
	fn disabled_gates_always_pass() {
		let mut gates = gates();

		gates.enabled = false;

		assert_eq!(evaluate(&gates, 0.0, &[]), None);
	}
}
