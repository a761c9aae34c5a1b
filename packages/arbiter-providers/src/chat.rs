use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

use arbiter_config::LlmProviderConfig;

/// Sends one prompt to an OpenAI-compatible chat-completions endpoint and returns the reply text.
///
/// A single attempt is made; transport and status failures are returned to the caller as-is.
pub async fn complete(cfg: &LlmProviderConfig, prompt: &str) -> Result<String> {
	send(cfg, prompt)
		.await
		.map_err(|err| eyre::eyre!("Chat provider {} failed: {err}", cfg.provider_id))
}

async fn send(cfg: &LlmProviderConfig, prompt: &str) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = request_body(cfg, prompt);
	let res = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_reply(&json)
}

fn request_body(cfg: &LlmProviderConfig, prompt: &str) -> Value {
	serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": [
			{ "role": "user", "content": prompt }
		],
	})
}

fn parse_reply(json: &Value) -> Result<String> {
	let Some(choice) = json.get("choices").and_then(|v| v.as_array()).and_then(|arr| arr.first())
	else {
		return Err(eyre::eyre!("Chat response has no choices."));
	};

	match choice.get("message").and_then(|msg| msg.get("content")) {
		Some(Value::String(content)) => Ok(content.clone()),
		// Some gateways return `null` content for an empty completion.
		Some(Value::Null) => Ok(String::new()),
		_ => Err(eyre::eyre!("Chat response is missing message content.")),
	}
}
