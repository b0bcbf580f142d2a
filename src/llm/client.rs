//! Remote language-model client
//!
//! Every generation stage talks to the model through the [`LanguageModel`]
//! trait so retry/backoff policy lives in one place and tests can substitute
//! a deterministic scripted model.

use crate::config::ModelConfig;
use crate::error::{CvTailorError, Result};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    fn name(&self) -> &str;
}

/// Chat-completions client for an OpenAI-compatible endpoint.
pub struct HttpLanguageModel {
    client: reqwest::Client,
    endpoint: String,
    model_name: String,
    api_key: Option<String>,
    max_retries: usize,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl HttpLanguageModel {
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CvTailorError::ModelRequest(format!("Failed to create HTTP client: {}", e)))?;

        let api_key = match &config.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                CvTailorError::Configuration(format!("API key environment variable {} not set", var))
            })?),
            None => None,
        };

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model_name: config.model_name.clone(),
            api_key,
            max_retries: config.max_retries,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.endpoint);

        let payload = serde_json::json!({
            "model": self.model_name,
            "messages": [
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.prompt },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let mut builder = self.client.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CvTailorError::ModelRequest(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CvTailorError::ModelRequest(format!(
                "Model endpoint returned {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| CvTailorError::MalformedModelOutput(format!("Bad response body: {}", e)))?;

        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                CvTailorError::MalformedModelOutput("Response contained no choices".to_string())
            })
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        (|| async { self.send_once(request).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(500))
                    .with_max_times(self.max_retries),
            )
            .when(|e: &CvTailorError| e.is_retryable())
            .notify(|err, dur| {
                log::warn!("Model call failed ({}), retrying in {:?}", err, dur);
            })
            .await
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

/// Deterministic model for tests and offline dry runs. Responses are keyed by
/// a marker substring searched for in the prompt; the first matching rule
/// wins, in registration order.
pub struct ScriptedModel {
    rules: Vec<(String, String)>,
    fallback: Option<String>,
    prompts_seen: Mutex<Vec<String>>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: None,
            prompts_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn respond_when(mut self, marker: &str, response: &str) -> Self {
        self.rules.push((marker.to_string(), response.to_string()));
        self
    }

    pub fn with_fallback(mut self, response: &str) -> Self {
        self.fallback = Some(response.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.prompts_seen.lock().expect("prompt log poisoned").len()
    }

    /// Number of recorded prompts containing the given marker.
    pub fn calls_matching(&self, marker: &str) -> usize {
        self.prompts_seen
            .lock()
            .expect("prompt log poisoned")
            .iter()
            .filter(|p| p.contains(marker))
            .count()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.prompts_seen
            .lock()
            .expect("prompt log poisoned")
            .push(request.prompt.clone());

        for (marker, response) in &self.rules {
            if request.prompt.contains(marker.as_str()) {
                return Ok(response.clone());
            }
        }

        self.fallback.clone().ok_or_else(|| {
            CvTailorError::ModelRequest("No scripted response matched the prompt".to_string())
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Pull the first balanced JSON object or array out of model output and
/// deserialize it. Models routinely wrap JSON in prose or code fences.
pub fn extract_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let candidate = first_json_block(raw).ok_or_else(|| {
        CvTailorError::MalformedModelOutput("No JSON block found in model output".to_string())
    })?;

    serde_json::from_str(candidate).map_err(|e| {
        CvTailorError::MalformedModelOutput(format!("JSON block did not match schema: {}", e))
    })
}

fn first_json_block(raw: &str) -> Option<&str> {
    let start = raw.find(|c| c == '{' || c == '[')?;
    let bytes = raw.as_bytes();
    let open = bytes[start] as char;
    let close = if open == '{' { '}' } else { ']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in raw[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, PartialEq, Debug)]
    struct Sample {
        value: u32,
    }

    #[tokio::test]
    async fn test_scripted_model_routes_by_marker() {
        let model = ScriptedModel::new()
            .respond_when("JOB POSTING", r#"{"value": 1}"#)
            .with_fallback(r#"{"value": 9}"#);

        let hit = model
            .complete(&CompletionRequest {
                system: String::new(),
                prompt: "JOB POSTING: staff engineer".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(hit, r#"{"value": 1}"#);

        let miss = model
            .complete(&CompletionRequest {
                system: String::new(),
                prompt: "something else".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(miss, r#"{"value": 9}"#);
        assert_eq!(model.call_count(), 2);
    }

    #[test]
    fn test_extract_json_from_fenced_output() {
        let raw = "Here you go:\n```json\n{\"value\": 42}\n```\nanything else";
        let parsed: Sample = extract_json(raw).unwrap();
        assert_eq!(parsed, Sample { value: 42 });
    }

    #[test]
    fn test_extract_json_ignores_braces_in_strings() {
        let raw = r#"{"value": 7, "note": "uses { and } inside"}"#;
        let value: serde_json::Value = extract_json(raw).unwrap();
        assert_eq!(value["value"], 7);
    }

    #[test]
    fn test_extract_json_missing_block_errors() {
        let result: Result<Sample> = extract_json("no json here at all");
        assert!(result.is_err());
    }
}
