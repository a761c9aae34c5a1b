use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

/// Query-side tokens: punctuation stripped, lower-cased, whitespace split, alphabetic only.
///
/// Stripping before splitting keeps contractions such as "don't" as a single "dont" token.
pub fn query_tokens(query: &str) -> Vec<String> {
	let mut normalized = String::with_capacity(query.len());

	for ch in query.chars() {
		if is_punctuation(ch) {
			continue;
		}

		normalized.extend(ch.to_lowercase());
	}

	normalized
		.split_whitespace()
		.filter(|token| token.chars().all(char::is_alphabetic))
		.map(str::to_string)
		.collect()
}

/// Word set of a passage, used for redundancy scoring.
pub fn word_set(text: &str) -> HashSet<String> {
	text.unicode_words()
		.filter(|word| word.chars().all(char::is_alphabetic))
		.map(str::to_lowercase)
		.collect()
}

/// Jaccard overlap of two word sets. Two empty sets share nothing.
pub fn jaccard(lhs: &HashSet<String>, rhs: &HashSet<String>) -> f32 {
	if lhs.is_empty() && rhs.is_empty() {
		return 0.0;
	}

	let (small, large) = if lhs.len() <= rhs.len() { (lhs, rhs) } else { (rhs, lhs) };
	let intersection = small.iter().filter(|word| large.contains(*word)).count();
	let union = lhs.len() + rhs.len() - intersection;

	intersection as f32 / union as f32
}

fn is_punctuation(ch: char) -> bool {
	ch.is_ascii_punctuation() || matches!(ch, '‘' | '’' | '“' | '”' | '…' | '–' | '—' | '¿' | '¡')
}
