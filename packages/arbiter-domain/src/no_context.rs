use regex::{Regex, RegexBuilder};

use arbiter_config::{ExactTokenRule, NoContextDetector as DetectorConfig, NoContextRule};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Detection {
	pub triggered: bool,
	/// `exact_token`, `regex:<pattern>`, or empty when nothing matched.
	pub rule: String,
}
impl Detection {
	fn hit(rule: String) -> Self {
		Self { triggered: true, rule }
	}
}

/// Recognises replies in which the model declined to answer from the given context.
#[derive(Clone, Debug)]
pub struct NoContextDetector {
	enabled: bool,
	precedence: Vec<NoContextRule>,
	exact_token: ExactTokenRule,
	patterns: Vec<(String, Regex)>,
}
impl NoContextDetector {
	pub fn from_config(cfg: &DetectorConfig) -> Result<Self, regex::Error> {
		let mut patterns = Vec::with_capacity(cfg.regex_phrases.patterns.len());

		for pattern in &cfg.regex_phrases.patterns {
			let regex = RegexBuilder::new(pattern)
				.case_insensitive(cfg.regex_phrases.case_insensitive)
				.build()?;

			patterns.push((pattern.clone(), regex));
		}

		Ok(Self {
			enabled: cfg.enabled,
			precedence: cfg.precedence.clone(),
			exact_token: cfg.exact_token.clone(),
			patterns,
		})
	}

	pub fn detect(&self, reply: &str) -> Detection {
		if !self.enabled {
			return Detection::default();
		}

		for rule in &self.precedence {
			let detection = match rule {
				NoContextRule::ExactToken => self.match_exact_token(reply),
				NoContextRule::RegexPhrases => self.match_regex_phrases(reply),
			};

			if detection.triggered {
				return detection;
			}
		}

		Detection::default()
	}

	fn match_exact_token(&self, reply: &str) -> Detection {
		let rule = &self.exact_token;
		let candidate = if rule.strip_whitespace { reply.trim() } else { reply };
		let expected = if rule.strip_whitespace { rule.value.trim() } else { rule.value.as_str() };

		if expected.is_empty() || candidate.chars().count() > rule.max_chars as usize {
			return Detection::default();
		}

		let matched = if rule.case_insensitive {
			candidate.to_lowercase() == expected.to_lowercase()
		} else {
			candidate == expected
		};

		if matched { Detection::hit("exact_token".to_string()) } else { Detection::default() }
	}

	fn match_regex_phrases(&self, reply: &str) -> Detection {
		for (pattern, regex) in &self.patterns {
			if regex.is_match(reply) {
				return Detection::hit(format!("regex:{pattern}"));
			}
		}

		Detection::default()
	}
}

#[cfg(test)]
mod tests {
	use arbiter_config::RegexPhrasesRule;

	use super::*;

	fn config(precedence: Vec<NoContextRule>) -> DetectorConfig {
		DetectorConfig {
			enabled: true,
			precedence,
			exact_token: ExactTokenRule {
				value: "__NO_CONTEXT__".to_string(),
				case_insensitive: false,
				strip_whitespace: true,
				max_chars: 64,
			},
			regex_phrases: RegexPhrasesRule {
				patterns: vec![r"^\s*i (do not|don't) know\b".to_string(), "NO_CONTEXT".to_string()],
				case_insensitive: true,
			},
		}
	}

	fn detector(precedence: Vec<NoContextRule>) -> NoContextDetector {
		NoContextDetector::from_config(&config(precedence)).expect("Patterns must compile.")
	}

	#[test]
	fn exact_sentinel_is_detected() {
		let detector = detector(vec![NoContextRule::ExactToken, NoContextRule::RegexPhrases]);

		assert_eq!(detector.detect("__NO_CONTEXT__"), Detection::hit("exact_token".to_string()));
		assert_eq!(detector.detect("  __NO_CONTEXT__\n"), Detection::hit("exact_token".to_string()));
	}

	#[test]
	fn exact_token_respects_case_and_length() {
		let detector = detector(vec![NoContextRule::ExactToken]);

		assert!(!detector.detect("__no_context__").triggered);

		let long_reply = format!("{} __NO_CONTEXT__", "x".repeat(80));

		assert!(!detector.detect(&long_reply).triggered);

		let mut cfg = config(vec![NoContextRule::ExactToken]);

		cfg.exact_token.case_insensitive = true;

		let relaxed = NoContextDetector::from_config(&cfg).expect("Patterns must compile.");

		assert!(relaxed.detect("__no_context__").triggered);
	}

	#[test]
	fn whitespace_is_kept_when_not_stripping() {
		let mut cfg = config(vec![NoContextRule::ExactToken]);

		cfg.exact_token.strip_whitespace = false;

		let detector = NoContextDetector::from_config(&cfg).expect("Patterns must compile.");

		assert!(!detector.detect(" __NO_CONTEXT__").triggered);
		assert!(detector.detect("__NO_CONTEXT__").triggered);
	}

	#[test]
	fn regex_rule_reports_pattern() {
		let detector = detector(vec![NoContextRule::ExactToken, NoContextRule::RegexPhrases]);
		let detection = detector.detect("I don't know based on these documents.");

		assert_eq!(detection.rule, r"regex:^\s*i (do not|don't) know\b");
	}

	#[test]
	fn precedence_decides_the_reported_rule() {
		let regex_first = detector(vec![NoContextRule::RegexPhrases, NoContextRule::ExactToken]);

		assert_eq!(regex_first.detect("__NO_CONTEXT__").rule, "regex:NO_CONTEXT");

		let exact_only = detector(vec![NoContextRule::ExactToken]);

		assert!(!exact_only.detect("I do not know.").triggered);
	}

	#[test]
	fn disabled_detector_never_triggers() {
		let mut cfg = config(vec![NoContextRule::ExactToken]);

		cfg.enabled = false;

		let detector = NoContextDetector::from_config(&cfg).expect("Patterns must compile.");

		assert_eq!(detector.detect("__NO_CONTEXT__"), Detection::default());
	}

	#[test]
	fn ordinary_answers_pass() {
		let detector = detector(vec![NoContextRule::ExactToken, NoContextRule::RegexPhrases]);

		assert_eq!(detector.detect("Refunds are processed within 5 days."), Detection::default());
	}
}
