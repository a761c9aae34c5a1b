use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use arbiter_config::{Config, DistanceMetric, Error, NoContextRule, ScoreKind};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn template() -> Value {
	toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.")
}

fn section<'a>(value: &'a mut Value, name: &str) -> &'a mut toml::Table {
	value
		.as_table_mut()
		.expect("Template config must be a table.")
		.get_mut(name)
		.and_then(Value::as_table_mut)
		.unwrap_or_else(|| panic!("Template config must include [{name}]."))
}

fn render(value: &Value) -> String {
	toml::to_string(value).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("arbiter_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_payload(payload: String) -> arbiter_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = arbiter_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

#[test]
fn sample_config_loads() {
	let cfg = load_payload(SAMPLE_CONFIG_TEMPLATE_TOML.to_string())
		.expect("Sample config must be valid.");

	assert_eq!(cfg.retrieval.distance_metric, DistanceMetric::Cosine);
	assert_eq!(cfg.retrieval.score_mode, ScoreKind::Similarity);
	assert_eq!(cfg.thresholds.extractive, Some(0.92));
	assert_eq!(
		cfg.no_context_detector.precedence,
		vec![NoContextRule::ExactToken, NoContextRule::RegexPhrases]
	);
}

#[test]
fn exact_token_defaults_to_prompt_sentinel() {
	let cfg = arbiter_config::from_toml_str(SAMPLE_CONFIG_TEMPLATE_TOML)
		.expect("Sample config must be valid.");

	assert_eq!(cfg.no_context_detector.exact_token.value, "__NO_CONTEXT__");
}

#[test]
fn trigger_keywords_are_lowercased() {
	let cfg = arbiter_config::from_toml_str(SAMPLE_CONFIG_TEMPLATE_TOML)
		.expect("Sample config must be valid.");

	assert!(cfg.query_expansion.triggers.contains_key("refund"));
	assert!(!cfg.query_expansion.triggers.contains_key("Refund"));
}

#[test]
fn high_below_low_is_rejected() {
	let mut value = template();

	section(&mut value, "thresholds").insert("high".to_string(), Value::Float(0.3));

	let err = load_payload(render(&value)).expect_err("Expected threshold ordering error.");

	assert!(
		err.to_string().contains("thresholds.high must be greater than or equal to thresholds.low."),
		"Unexpected error: {err}"
	);
}

#[test]
fn short_query_profile_is_validated() {
	let mut value = template();

	section(&mut value, "short_query").insert("low".to_string(), Value::Float(0.9));

	let err = load_payload(render(&value)).expect_err("Expected short query ordering error.");

	assert!(
		err.to_string()
			.contains("short_query.high must be greater than or equal to short_query.low."),
		"Unexpected error: {err}"
	);
}

#[test]
fn missing_threshold_keys_fail_to_parse() {
	let mut value = template();

	section(&mut value, "thresholds").remove("low");

	let err = load_payload(render(&value)).expect_err("Expected parse error.");

	assert!(matches!(err, Error::ParseConfig { .. }), "Unexpected error: {err}");
}

#[test]
fn missing_gates_fail_to_parse() {
	let mut value = template();

	value.as_table_mut().expect("Template config must be a table.").remove("gates");

	let err = arbiter_config::from_toml_str(&render(&value)).expect_err("Expected parse error.");

	assert!(matches!(err, Error::ParseInline { .. }), "Unexpected error: {err}");
}

#[test]
fn extractive_threshold_must_not_undercut_high() {
	let mut value = template();

	section(&mut value, "thresholds").insert("extractive".to_string(), Value::Float(0.7));

	let err = load_payload(render(&value)).expect_err("Expected extractive threshold error.");

	assert!(
		err.to_string()
			.contains("thresholds.extractive must be greater than or equal to thresholds.high."),
		"Unexpected error: {err}"
	);
}

#[test]
fn thresholds_must_be_unit_range() {
	let mut value = template();

	section(&mut value, "gates").insert("min_similarity".to_string(), Value::Float(1.5));

	let err = load_payload(render(&value)).expect_err("Expected range error.");

	assert!(
		err.to_string().contains("gates.min_similarity must be in the range 0.0-1.0."),
		"Unexpected error: {err}"
	);
}

#[test]
fn invalid_regex_pattern_is_rejected() {
	let mut value = template();
	let detector = section(&mut value, "no_context_detector");
	let phrases = detector
		.get_mut("regex_phrases")
		.and_then(Value::as_table_mut)
		.expect("Template config must include [no_context_detector.regex_phrases].");

	phrases.insert(
		"patterns".to_string(),
		Value::Array(vec![Value::String("(unclosed".to_string())]),
	);

	let err = load_payload(render(&value)).expect_err("Expected pattern error.");

	assert!(matches!(err, Error::InvalidPattern { .. }), "Unexpected error: {err}");
}

#[test]
fn invalid_regex_pattern_is_rejected_while_detector_is_disabled() {
	let mut value = template();
	let detector = section(&mut value, "no_context_detector");

	detector.insert("enabled".to_string(), Value::Boolean(false));

	let phrases = detector
		.get_mut("regex_phrases")
		.and_then(Value::as_table_mut)
		.expect("Template config must include [no_context_detector.regex_phrases].");

	phrases.insert(
		"patterns".to_string(),
		Value::Array(vec![Value::String("(unclosed".to_string())]),
	);

	let err = load_payload(render(&value)).expect_err("Expected pattern error.");

	assert!(matches!(err, Error::InvalidPattern { .. }), "Unexpected error: {err}");
}

#[test]
fn exact_token_must_match_prompt_sentinel() {
	let mut value = template();
	let exact_token = section(&mut value, "no_context_detector")
		.get_mut("exact_token")
		.and_then(Value::as_table_mut)
		.expect("Template config must include [no_context_detector.exact_token].");

	exact_token.insert("value".to_string(), Value::String("NO_ANSWER".to_string()));

	let err = load_payload(render(&value)).expect_err("Expected sentinel mismatch error.");

	assert!(
		err.to_string().contains("no_context_detector.exact_token.value"),
		"Unexpected error: {err}"
	);

	let mut value = template();
	let exact_token = section(&mut value, "no_context_detector")
		.get_mut("exact_token")
		.and_then(Value::as_table_mut)
		.expect("Template config must include [no_context_detector.exact_token].");

	exact_token.insert("value".to_string(), Value::String("__NO_CONTEXT__".to_string()));

	assert!(load_payload(render(&value)).is_ok());
}

#[test]
fn context_chunk_count_is_clamped_to_max_selected() {
	let mut value = template();
	let selection = section(&mut value, "selection");

	selection.insert("max_selected".to_string(), Value::Integer(2));
	selection.insert("context_chunk_count".to_string(), Value::Integer(5));

	let cfg = load_payload(render(&value)).expect("Clamped config must be valid.");

	assert_eq!(cfg.selection.context_chunk_count, 2);
}

#[test]
fn selection_defaults_apply_when_section_is_missing() {
	let mut value = template();

	value.as_table_mut().expect("Template config must be a table.").remove("selection");

	let cfg = load_payload(render(&value)).expect("Config without [selection] must be valid.");

	assert_eq!(cfg.selection.per_doc_cap, 2);
	assert_eq!(cfg.selection.max_selected, 7);
	assert_eq!(cfg.selection.context_chunk_count, 3);
	assert!((cfg.selection.mmr_lambda - 0.30).abs() < f32::EPSILON);
}

#[test]
fn provider_api_key_must_be_non_empty() {
	let mut value = template();
	let provider: Value = toml::from_str(
		r#"
provider_id = "openai"
api_base = "http://localhost:8080"
api_key = " "
path = "/v1/chat/completions"
model = "m"
temperature = 0.1
timeout_ms = 1000
"#,
	)
	.expect("Failed to parse provider table.");
	let mut providers = toml::Table::new();

	providers.insert("primary".to_string(), provider);
	value
		.as_table_mut()
		.expect("Template config must be a table.")
		.insert("providers".to_string(), Value::Table(providers));

	let err = load_payload(render(&value)).expect_err("Expected api_key error.");

	assert!(
		err.to_string().contains("providers.primary.api_key must be non-empty."),
		"Unexpected error: {err}"
	);
}
