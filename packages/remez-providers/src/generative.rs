use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// Issues one chat-completion call and returns the raw text content of the
/// first choice. Structured output is requested through the provider's JSON
/// schema response format when `schema` is given; callers own parsing and
/// repair of the returned text.
pub async fn generate(
	cfg: &remez_config::GenerativeProviderConfig,
	system_prompt: &str,
	messages: &[Value],
	schema: Option<&Value>,
) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let mut all_messages = Vec::with_capacity(messages.len() + 1);

	all_messages.push(serde_json::json!({ "role": "system", "content": system_prompt }));
	all_messages.extend(messages.iter().cloned());

	let mut body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"max_tokens": cfg.max_output_tokens,
		"messages": all_messages,
	});

	if let Some(schema) = schema
		&& let Some(map) = body.as_object_mut()
	{
		map.insert(
			"response_format".to_string(),
			serde_json::json!({
				"type": "json_schema",
				"json_schema": { "name": "analysis", "schema": schema, "strict": true },
			}),
		);
	}

	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = crate::classify_status(res)?.json().await?;

	extract_content(json)
}

fn extract_content(json: Value) -> Result<String> {
	json.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|content| content.as_str())
		.map(str::to_string)
		.ok_or_else(|| Error::Malformed {
			message: "Completion response is missing message content.".to_string(),
		})
}
