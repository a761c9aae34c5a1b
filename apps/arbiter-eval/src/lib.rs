use std::{
	collections::{BTreeMap, VecDeque},
	fs,
	path::{Path, PathBuf},
	sync::{Arc, Mutex},
	time::Instant,
};

use clap::Parser;
use color_eyre::eyre;
use serde::{Deserialize, Serialize};

use arbiter_config::Config;
use arbiter_domain::mode::AnswerMode;
use arbiter_service::{
	AnswerRequest, ArbiterService, BoxFuture, ChatModel, DecisionTrace, SearchHit, VectorSearch,
};

#[derive(Debug, Parser)]
#[command(
	version = arbiter_cli::VERSION,
	rename_all = "kebab",
	styles = arbiter_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[arg(long, short = 'd', value_name = "FILE")]
	pub dataset: PathBuf,
	/// Send prompts to the configured `[providers]` instead of replaying recorded replies.
	#[arg(long)]
	pub live: bool,
	#[arg(long, value_name = "MS")]
	pub generation_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct EvalDataset {
	pub name: Option<String>,
	pub cases: Vec<EvalCase>,
}

/// One question with the search hits and model replies recorded for it.
#[derive(Debug, Deserialize)]
pub struct EvalCase {
	pub id: Option<String>,
	pub question: String,
	#[serde(default)]
	pub hits: Vec<SearchHit>,
	#[serde(default)]
	pub primary_replies: Vec<String>,
	#[serde(default)]
	pub fallback_replies: Vec<String>,
	pub expected_mode: Option<AnswerMode>,
}

#[derive(Debug, Serialize)]
pub struct EvalOutput {
	pub dataset: EvalDatasetInfo,
	pub settings: EvalSettings,
	pub summary: EvalSummary,
	pub cases: Vec<CaseReport>,
}

#[derive(Debug, Serialize)]
pub struct EvalDatasetInfo {
	pub name: String,
	pub path: String,
	pub case_count: usize,
}

#[derive(Debug, Serialize)]
pub struct EvalSettings {
	pub config_path: String,
	pub policy_id: String,
	pub live: bool,
}

#[derive(Debug, Serialize)]
pub struct EvalSummary {
	pub case_count: usize,
	pub error_count: usize,
	/// Share of cases with an `expected_mode` that ended in that mode.
	pub mode_accuracy: Option<f64>,
	pub mode_counts: BTreeMap<String, usize>,
	pub fallback_rate: f64,
	pub no_context_rate: f64,
	pub latency_ms_p50: f64,
	pub latency_ms_p95: f64,
}

#[derive(Debug, Serialize)]
pub struct CaseReport {
	pub id: String,
	pub question: String,
	pub expected_mode: Option<AnswerMode>,
	pub mode: Option<AnswerMode>,
	pub matched: Option<bool>,
	pub answer: Option<String>,
	pub error: Option<String>,
	pub latency_ms: f64,
	pub decision_explain: Option<DecisionTrace>,
}

struct RecordedSearch {
	hits: Vec<SearchHit>,
}
impl VectorSearch for RecordedSearch {
	fn search<'a>(
		&'a self,
		_query: &'a str,
		top_k: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<SearchHit>>> {
		let hits = self.hits.iter().take(top_k as usize).cloned().collect();

		Box::pin(async move { Ok(hits) })
	}
}

struct RecordedChat {
	role: &'static str,
	replies: Mutex<VecDeque<String>>,
}
impl RecordedChat {
	fn new(role: &'static str, replies: &[String]) -> Self {
		Self { role, replies: Mutex::new(replies.iter().cloned().collect()) }
	}
}
impl ChatModel for RecordedChat {
	fn generate<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, color_eyre::Result<String>> {
		let reply = self.replies.lock().unwrap_or_else(|err| err.into_inner()).pop_front();

		Box::pin(async move {
			reply.ok_or_else(|| eyre::eyre!("No recorded {} reply left for this case.", self.role))
		})
	}
}

pub async fn run(args: Args) -> color_eyre::Result<String> {
	let cfg = arbiter_config::load(&args.config)?;

	arbiter_cli::init_tracing(&cfg.service.log_level);

	let dataset = load_dataset(&args.dataset)?;
	let output = evaluate(&args, cfg, &dataset).await?;

	Ok(serde_json::to_string_pretty(&output)?)
}

pub fn load_dataset(path: &Path) -> color_eyre::Result<EvalDataset> {
	let raw = fs::read_to_string(path)?;
	let dataset: EvalDataset = serde_json::from_str(&raw)?;

	if dataset.cases.is_empty() {
		return Err(eyre::eyre!("Dataset {} has no cases.", path.display()));
	}

	Ok(dataset)
}

pub async fn evaluate(
	args: &Args,
	cfg: Config,
	dataset: &EvalDataset,
) -> color_eyre::Result<EvalOutput> {
	if args.live && cfg.providers.is_none() {
		return Err(eyre::eyre!("--live requires a [providers] section in the config."));
	}

	let policy_id = arbiter_service::policy::policy_id(&cfg)?;
	let mut reports = Vec::with_capacity(dataset.cases.len());

	for (idx, case) in dataset.cases.iter().enumerate() {
		let id = case.id.clone().unwrap_or_else(|| format!("case-{}", idx + 1));
		let service = build_service(&cfg, case, args.live)?;
		let req = AnswerRequest {
			generation_timeout_ms: args.generation_timeout_ms,
			..AnswerRequest::new(case.question.as_str())
		};
		let started = Instant::now();
		let outcome = service.answer(req).await;
		let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
		let report = match outcome {
			Ok(result) => CaseReport {
				id,
				question: case.question.clone(),
				expected_mode: case.expected_mode,
				mode: Some(result.mode),
				matched: case.expected_mode.map(|expected| expected == result.mode),
				answer: Some(result.answer),
				error: None,
				latency_ms,
				decision_explain: Some(result.decision_explain),
			},
			Err(err) => {
				tracing::warn!(error = %err, case_id = id.as_str(), "Evaluation case failed.");

				CaseReport {
					id,
					question: case.question.clone(),
					expected_mode: case.expected_mode,
					mode: None,
					matched: case.expected_mode.map(|_| false),
					answer: None,
					error: Some(err.to_string()),
					latency_ms,
					decision_explain: None,
				}
			},
		};

		reports.push(report);
	}

	let summary = summarize(&reports);

	Ok(EvalOutput {
		dataset: EvalDatasetInfo {
			name: dataset.name.clone().unwrap_or_else(|| "unnamed".to_string()),
			path: args.dataset.display().to_string(),
			case_count: dataset.cases.len(),
		},
		settings: EvalSettings {
			config_path: args.config.display().to_string(),
			policy_id,
			live: args.live,
		},
		summary,
		cases: reports,
	})
}

fn build_service(cfg: &Config, case: &EvalCase, live: bool) -> color_eyre::Result<ArbiterService> {
	let search: Arc<dyn VectorSearch> = Arc::new(RecordedSearch { hits: case.hits.clone() });

	if live {
		return Ok(ArbiterService::with_configured_providers(cfg.clone(), search)?);
	}

	let primary: Arc<dyn ChatModel> = Arc::new(RecordedChat::new("primary", &case.primary_replies));
	let fallback = (!case.fallback_replies.is_empty()).then(|| {
		Arc::new(RecordedChat::new("fallback", &case.fallback_replies)) as Arc<dyn ChatModel>
	});

	Ok(ArbiterService::new(cfg.clone(), search, primary, fallback)?)
}

fn summarize(reports: &[CaseReport]) -> EvalSummary {
	let count = reports.len().max(1) as f64;
	let mut mode_counts = BTreeMap::new();
	let mut fallback_count = 0_usize;
	let mut no_context_count = 0_usize;

	for report in reports {
		if let Some(mode) = report.mode {
			*mode_counts.entry(mode.as_str().to_string()).or_insert(0) += 1;

			if mode == AnswerMode::Fallback {
				fallback_count += 1;
			}
		}
		if report.decision_explain.as_ref().is_some_and(|trace| trace.no_context_triggered) {
			no_context_count += 1;
		}
	}

	let scored: Vec<bool> = reports.iter().filter_map(|report| report.matched).collect();
	let mode_accuracy = (!scored.is_empty())
		.then(|| scored.iter().filter(|matched| **matched).count() as f64 / scored.len() as f64);
	let mut latencies: Vec<f64> = reports.iter().map(|report| report.latency_ms).collect();

	latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

	EvalSummary {
		case_count: reports.len(),
		error_count: reports.iter().filter(|report| report.error.is_some()).count(),
		mode_accuracy,
		mode_counts,
		fallback_rate: fallback_count as f64 / count,
		no_context_rate: no_context_count as f64 / count,
		latency_ms_p50: percentile(&latencies, 0.50),
		latency_ms_p95: percentile(&latencies, 0.95),
	}
}

fn percentile(values: &[f64], percentile: f64) -> f64 {
	if values.is_empty() {
		return 0.0;
	}

	let pos = percentile.clamp(0.0, 1.0) * (values.len() as f64 - 1.0);
	let lower = pos.floor() as usize;
	let upper = pos.ceil() as usize;
	let weight = pos - lower as f64;

	values[lower] * (1.0 - weight) + values[upper] * weight
}
