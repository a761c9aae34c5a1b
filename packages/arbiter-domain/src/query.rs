use std::collections::HashSet;

use arbiter_config::{QueryExpansion, ShortQuery};

use crate::text;

pub const DEFAULT_STOPWORDS: &[&str] = &[
	"a", "about", "an", "and", "are", "as", "at", "be", "by", "can", "could", "did", "do", "does",
	"for", "from", "how", "i", "if", "in", "is", "it", "its", "me", "my", "of", "on", "or",
	"please", "should", "tell", "that", "the", "then", "this", "to", "was", "we", "were", "what",
	"when", "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Flags queries with too few content tokens to trust the base thresholds.
#[derive(Clone, Debug)]
pub struct ShortQueryClassifier {
	max_tokens: usize,
	stopwords: HashSet<String>,
}
impl ShortQueryClassifier {
	pub fn new(max_tokens: u32, stopwords: impl IntoIterator<Item = String>) -> Self {
		Self { max_tokens: max_tokens as usize, stopwords: stopwords.into_iter().collect() }
	}

	pub fn from_config(cfg: &ShortQuery) -> Self {
		match cfg.stopwords.as_ref() {
			Some(words) => Self::new(cfg.max_tokens, words.iter().cloned()),
			None => Self::new(
				cfg.max_tokens,
				DEFAULT_STOPWORDS.iter().map(|word| (*word).to_string()),
			),
		}
	}

	pub fn content_tokens(&self, query: &str) -> Vec<String> {
		text::query_tokens(query)
			.into_iter()
			.filter(|token| !self.stopwords.contains(token))
			.collect()
	}

	pub fn is_short(&self, query: &str) -> bool {
		self.content_tokens(query).len() <= self.max_tokens
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Augmentation {
	pub query: String,
	pub triggers: Vec<String>,
	pub appended: Vec<String>,
}
impl Augmentation {
	pub fn is_augmented(&self) -> bool {
		!self.appended.is_empty()
	}
}

/// Appends configured expansion phrases when a trigger keyword occurs in the query.
#[derive(Clone, Debug, Default)]
pub struct QueryAugmenter {
	enabled: bool,
	max_phrases: usize,
	triggers: Vec<(String, Vec<String>)>,
}
impl QueryAugmenter {
	pub fn from_config(cfg: &QueryExpansion) -> Self {
		let triggers = cfg
			.triggers
			.iter()
			.map(|(keyword, phrases)| (text::query_tokens(keyword).join(" "), phrases.clone()))
			.filter(|(keyword, _)| !keyword.is_empty())
			.collect();

		Self { enabled: cfg.enabled, max_phrases: cfg.max_phrases as usize, triggers }
	}

	pub fn augment(&self, query: &str) -> Augmentation {
		let trimmed = query.trim();
		let mut out =
			Augmentation { query: trimmed.to_string(), triggers: Vec::new(), appended: Vec::new() };

		if !self.enabled || self.triggers.is_empty() || trimmed.is_empty() {
			return out;
		}

		let padded = format!(" {} ", text::query_tokens(trimmed).join(" "));
		let lowered = trimmed.to_lowercase();
		let mut seen = HashSet::new();

		for (keyword, phrases) in &self.triggers {
			if !padded.contains(&format!(" {keyword} ")) {
				continue;
			}

			out.triggers.push(keyword.clone());

			for phrase in phrases {
				if self.max_phrases > 0 && out.appended.len() >= self.max_phrases {
					break;
				}

				let phrase = phrase.trim();

				if phrase.is_empty() || lowered.contains(&phrase.to_lowercase()) {
					continue;
				}
				if seen.insert(phrase.to_lowercase()) {
					out.appended.push(phrase.to_string());
				}
			}
		}

		if out.is_augmented() {
			out.query = format!("{trimmed} {}", out.appended.join(" "));
		}

		out
	}
}
