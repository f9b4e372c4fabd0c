use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use appmodeler_core::config::AiConfig;
use appmodeler_core::{Error, Result};

use crate::Assistant;

/// OpenAI-compatible chat client with structured (JSON-schema) output.
pub struct OpenAiAssistant {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    used_tokens: AtomicU64,
}

impl OpenAiAssistant {
    pub fn new(config: &AiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config(
                "AI api key is not configured (set ai.apiKey or APPMODELER_API_KEY)".to_string(),
            ));
        }
        let api_base = config
            .api_base
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/')
            .to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Generation(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_base,
            model: config.model.clone(),
            used_tokens: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl Assistant for OpenAiAssistant {
    async fn ask(&self, prompt: &str, schema_name: &str, schema: Value) -> Result<Value> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema_name,
                    "schema": schema,
                    "strict": true,
                },
            },
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("AI backend unreachable: {}", e)))?;

        let status = resp.status();
        let value: Value = resp
            .json()
            .await
            .map_err(|e| Error::Generation(format!("invalid AI response: {}", e)))?;

        if status == StatusCode::BAD_REQUEST {
            // Backend refused the prompt; the analyse pass aborts here.
            let message = value["error"]["message"].as_str().unwrap_or("bad request");
            return Err(Error::Generation(format!("request rejected: {}", message)));
        }
        if !status.is_success() {
            let message = value["error"]["message"].as_str().unwrap_or("no message");
            return Err(Error::Generation(format!("AI backend error ({}): {}", status, message)));
        }

        if let Some(total) = value["usage"]["total_tokens"].as_u64() {
            let used = self.used_tokens.fetch_add(total, Ordering::Relaxed) + total;
            debug!(tokens = total, total_used = used, "AI call completed");
        }

        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| Error::Generation("AI response has no content".to_string()))?;
        serde_json::from_str(content)
            .map_err(|e| Error::Generation(format!("AI response is not valid JSON: {}", e)))
    }

    fn used_tokens(&self) -> u64 {
        self.used_tokens.load(Ordering::Relaxed)
    }
}
