//! Gemini `generateContent` client used for prompt decomposition.
//!
//! Endpoint: POST {endpoint}/{model}:generateContent?key={api_key}

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{Decomposer, DecompositionError, RawDecomposition};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-pro";

const SYSTEM_INSTRUCTION: &str = "You are an AI engineering architect. Given a user prompt, \
return ONLY valid JSON with keys: intent (string), categories (list of strings from \
[architecture, backend, deployment]), task_graph (list of objects with id, category, title, \
description, assigned_agent, priority).";

/// Decomposer backed by the Gemini API
pub struct GeminiDecomposer {
    endpoint: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiDecomposer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.endpoint.trim_end_matches('/'),
            self.model,
            self.api_key
        )
    }
}

/// Remove markdown code fences around a JSON payload
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        // Drop the language tag line ("```json")
        body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Pull the model text out of a `generateContent` response and parse it
pub fn parse_response(response: &Value) -> Result<RawDecomposition, DecompositionError> {
    let text = response
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| DecompositionError::Malformed("missing candidate text".to_string()))?;

    serde_json::from_str(strip_code_fences(text))
        .map_err(|e| DecompositionError::Malformed(e.to_string()))
}

#[async_trait]
impl Decomposer for GeminiDecomposer {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn decompose(&self, prompt: &str) -> Result<RawDecomposition, DecompositionError> {
        let payload = json!({
            "contents": [{
                "parts": [{ "text": format!("{}\n\nUser prompt: {}", SYSTEM_INSTRUCTION, prompt) }]
            }]
        });

        debug!(model = %self.model, "Requesting decomposition");

        let response = self
            .client
            .post(self.url())
            .json(&payload)
            .send()
            .await
            .map_err(|e| DecompositionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DecompositionError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| DecompositionError::Malformed(e.to_string()))?;

        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;

    const TASKS: &str = r#"{"intent":"Build an api","categories":["backend"],"task_graph":[{"id":1,"category":"backend","title":"API","description":"d","assigned_agent":"dev_agent","priority":"high"}]}"#;

    fn wrap(text: &str) -> Value {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_parse_fenced_response() {
        let raw = parse_response(&wrap(&format!("```json\n{}\n```", TASKS))).unwrap();
        assert_eq!(raw.intent.as_deref(), Some("Build an api"));
        assert_eq!(raw.categories, vec![Category::Backend]);
        assert_eq!(raw.task_graph.len(), 1);
    }

    #[test]
    fn test_parse_rejects_missing_text() {
        let err = parse_response(&json!({ "candidates": [] })).unwrap_err();
        assert!(matches!(err, DecompositionError::Malformed(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_category() {
        let text = TASKS.replace("[\"backend\"]", "[\"frontend\"]");
        assert!(parse_response(&wrap(&text)).is_err());
    }

    #[test]
    fn test_url() {
        let gemini = GeminiDecomposer::new("k").with_endpoint("http://localhost:9/models/");
        assert_eq!(
            gemini.url(),
            "http://localhost:9/models/gemini-pro:generateContent?key=k"
        );
    }
}
