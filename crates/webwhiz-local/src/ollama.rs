use serde::{Deserialize, Serialize};
use webwhiz_core::{CompletionBackend, Error, Result};

use crate::env;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_MODEL: &str = "gemma3";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout_ms: u64,
}

impl OllamaClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            timeout_ms,
        }
    }

    /// Ollama is the default backend, so unlike the hosted ones it needs no opt-in.
    pub fn from_env(client: reqwest::Client, timeout_ms: u64) -> Self {
        let base_url =
            env("WEBWHIZ_OLLAMA_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = env("WEBWHIZ_OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self::new(client, base_url, model, timeout_ms)
    }

    fn endpoint_generate(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Single-shot, non-streaming completion. Sampling options stay at the model's defaults.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let req = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let resp = self
            .client
            .post(self.endpoint_generate())
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::ModelInvocation(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            // Ollama reports e.g. a missing model as {"error": "..."}.
            let detail = resp
                .json::<ErrorResponse>()
                .await
                .map(|e| format!(": {}", e.error))
                .unwrap_or_default();
            return Err(Error::ModelInvocation(format!(
                "ollama generate HTTP {status}{detail}"
            )));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| Error::ModelInvocation(e.to_string()))?;
        Ok(parsed.response)
    }
}

#[async_trait::async_trait]
impl CompletionBackend for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate(prompt).await
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}
