mod error;

pub use error::{Error, Result};

use std::{
	collections::VecDeque,
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use color_eyre::eyre;

use arbiter_config::Config;
use arbiter_service::{BoxFuture, ChatModel, ChunkMetadata, SearchHit, VectorSearch};

pub const BASELINE_CONFIG_TOML: &str = include_str!("baseline_config.toml");

/// Cosine-similarity config with base thresholds 0.4/0.8 and gates 0.35/1/120.
pub fn baseline_config() -> Result<Config> {
	Ok(arbiter_config::from_toml_str(BASELINE_CONFIG_TOML)?)
}

/// Raw cosine similarity that the baseline config normalizes to `similarity`.
pub fn raw_for_similarity(similarity: f32) -> f32 {
	similarity * 2.0 - 1.0
}

pub fn hit(chunk_id: &str, source_id: &str, similarity: f32, text: &str) -> SearchHit {
	SearchHit {
		chunk_id: chunk_id.to_string(),
		source_id: source_id.to_string(),
		text: text.to_string(),
		metadata: ChunkMetadata::default(),
		raw_score: raw_for_similarity(similarity),
	}
}

/// Filler text of exactly `bytes` ASCII bytes, made of distinct words.
pub fn passage(seed: &str, bytes: usize) -> String {
	let mut out = String::with_capacity(bytes + 16);
	let mut idx = 0_usize;

	while out.len() < bytes {
		if !out.is_empty() {
			out.push(' ');
		}

		out.push_str(seed);
		out.push_str(&letters(idx));

		idx += 1;
	}

	out.truncate(bytes);

	out
}

fn letters(mut idx: usize) -> String {
	let mut out = String::new();

	loop {
		out.push((b'a' + (idx % 26) as u8) as char);

		idx /= 26;

		if idx == 0 {
			return out;
		}
	}
}

/// Vector search double that returns a fixed hit list and records every query.
pub struct ScriptedSearch {
	hits: Vec<SearchHit>,
	failure: Option<String>,
	delay: Option<Duration>,
	calls: AtomicUsize,
	queries: Mutex<Vec<String>>,
}
impl ScriptedSearch {
	pub fn new(hits: Vec<SearchHit>) -> Self {
		Self {
			hits,
			failure: None,
			delay: None,
			calls: AtomicUsize::new(0),
			queries: Mutex::new(Vec::new()),
		}
	}

	pub fn failing(message: &str) -> Self {
		Self { failure: Some(message.to_string()), ..Self::new(Vec::new()) }
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn queries(&self) -> Vec<String> {
		self.queries.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl VectorSearch for ScriptedSearch {
	fn search<'a>(
		&'a self,
		query: &'a str,
		top_k: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<SearchHit>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.queries.lock().unwrap_or_else(|err| err.into_inner()).push(query.to_string());

		Box::pin(async move {
			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}
			if let Some(message) = self.failure.as_ref() {
				return Err(eyre::eyre!("{message}"));
			}

			Ok(self.hits.iter().take(top_k as usize).cloned().collect())
		})
	}
}

/// Chat model double. Replies are served in order; the last one repeats once the queue drains.
pub struct ScriptedChat {
	replies: Mutex<VecDeque<String>>,
	last_reply: Mutex<String>,
	failure: Option<String>,
	delay: Option<Duration>,
	calls: AtomicUsize,
	prompts: Mutex<Vec<String>>,
}
impl ScriptedChat {
	pub fn replying(reply: &str) -> Self {
		Self::with_replies(&[reply])
	}

	pub fn with_replies(replies: &[&str]) -> Self {
		Self {
			replies: Mutex::new(replies.iter().map(|reply| (*reply).to_string()).collect()),
			last_reply: Mutex::new(String::new()),
			failure: None,
			delay: None,
			calls: AtomicUsize::new(0),
			prompts: Mutex::new(Vec::new()),
		}
	}

	pub fn failing(message: &str) -> Self {
		Self { failure: Some(message.to_string()), ..Self::with_replies(&[]) }
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn prompts(&self) -> Vec<String> {
		self.prompts.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn next_reply(&self) -> String {
		let mut last = self.last_reply.lock().unwrap_or_else(|err| err.into_inner());

		if let Some(reply) = self.replies.lock().unwrap_or_else(|err| err.into_inner()).pop_front()
		{
			*last = reply;
		}

		last.clone()
	}
}
impl ChatModel for ScriptedChat {
	fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, color_eyre::Result<String>> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.prompts.lock().unwrap_or_else(|err| err.into_inner()).push(prompt.to_string());

		Box::pin(async move {
			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}
			if let Some(message) = self.failure.as_ref() {
				return Err(eyre::eyre!("{message}"));
			}

			Ok(self.next_reply())
		})
	}
}
