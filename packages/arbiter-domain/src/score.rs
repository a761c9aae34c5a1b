use arbiter_config::{DistanceMetric, Retrieval, ScoreKind};

/// How the vector store's raw scores must be read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoreConvention {
	pub metric: DistanceMetric,
	pub docs_normalized: bool,
	pub kind: ScoreKind,
}
impl ScoreConvention {
	pub fn from_config(cfg: &Retrieval) -> Self {
		Self {
			metric: cfg.distance_metric,
			docs_normalized: cfg.docs_normalized,
			kind: cfg.score_mode,
		}
	}
}

/// Maps a raw store score onto a similarity in `[0, 1]`.
///
/// Downstream thresholds are tuned against this exact mapping. NaN input, or any NaN produced along
/// the way, yields `0.0`.
pub fn normalize_score(raw: f32, convention: ScoreConvention) -> f32 {
	if raw.is_nan() {
		return 0.0;
	}

	let similarity = match (convention.metric, convention.docs_normalized, convention.kind) {
		// The store reports a distance here even though the metric is a dot product.
		(DistanceMetric::DotProduct, true, _) => clamp_unit((-raw + 1.0) / 2.0),
		(DistanceMetric::Cosine, _, ScoreKind::Similarity) => clamp_unit((raw + 1.0) / 2.0),
		(DistanceMetric::Cosine, _, ScoreKind::Distance) => 1.0 - clamp_unit(raw / 2.0),
		_ => 1.0 / (1.0 + raw.abs()),
	};

	clamp_unit(similarity)
}

fn clamp_unit(value: f32) -> f32 {
	if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn convention(
		metric: DistanceMetric,
		docs_normalized: bool,
		kind: ScoreKind,
	) -> ScoreConvention {
		ScoreConvention { metric, docs_normalized, kind }
	}

	#[test]
	fn dot_product_on_normalized_docs_reads_distance() {
		let conv = convention(DistanceMetric::DotProduct, true, ScoreKind::Similarity);

		assert!((normalize_score(-1.0, conv) - 1.0).abs() < 1e-6);
		assert!((normalize_score(0.0, conv) - 0.5).abs() < 1e-6);
		assert!((normalize_score(1.0, conv)).abs() < 1e-6);
	}

	#[test]
	fn cosine_similarity_is_shifted_into_unit_range() {
		let conv = convention(DistanceMetric::Cosine, true, ScoreKind::Similarity);

		assert!((normalize_score(0.9, conv) - 0.95).abs() < 1e-6);
		assert!((normalize_score(-1.0, conv)).abs() < 1e-6);
		assert_eq!(normalize_score(3.0, conv), 1.0);
	}

	#[test]
	fn cosine_distance_is_inverted() {
		let conv = convention(DistanceMetric::Cosine, false, ScoreKind::Distance);

		assert!((normalize_score(0.1, conv) - 0.95).abs() < 1e-6);
		assert_eq!(normalize_score(2.5, conv), 0.0);
		assert_eq!(normalize_score(-0.5, conv), 1.0);
	}

	#[test]
	fn other_metrics_use_inverse_distance() {
		let conv = convention(DistanceMetric::Euclidean, false, ScoreKind::Distance);

		assert!((normalize_score(1.0, conv) - 0.5).abs() < 1e-6);
		assert!((normalize_score(-3.0, conv) - 0.25).abs() < 1e-6);

		let raw_dot = convention(DistanceMetric::DotProduct, false, ScoreKind::Similarity);

		assert_eq!(normalize_score(0.0, raw_dot), 1.0);
	}

	#[test]
	fn output_stays_in_unit_range_for_any_input() {
		let inputs = [
			f32::NAN,
			f32::INFINITY,
			f32::NEG_INFINITY,
			f32::MAX,
			f32::MIN,
			-2.5,
			-1.0,
			-0.0,
			0.0,
			0.3,
			1.0,
			7.0,
		];
		let conventions = [
			convention(DistanceMetric::DotProduct, true, ScoreKind::Distance),
			convention(DistanceMetric::DotProduct, false, ScoreKind::Similarity),
			convention(DistanceMetric::Cosine, true, ScoreKind::Similarity),
			convention(DistanceMetric::Cosine, true, ScoreKind::Distance),
			convention(DistanceMetric::Euclidean, false, ScoreKind::Distance),
		];

		for conv in conventions {
			for raw in inputs {
				let similarity = normalize_score(raw, conv);

				assert!((0.0..=1.0).contains(&similarity), "{raw} under {conv:?} gave {similarity}");
			}
		}

		assert_eq!(normalize_score(f32::NAN, conventions[2]), 0.0);
	}
}
