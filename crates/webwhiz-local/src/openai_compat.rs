use serde::{Deserialize, Serialize};
use webwhiz_core::{CompletionBackend, Error, Result};

use crate::env;

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_ms: u64,
}

impl OpenAiCompatClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            timeout_ms,
        }
    }

    pub fn from_env(client: reqwest::Client, timeout_ms: u64) -> Result<Self> {
        let base_url = env("WEBWHIZ_OPENAI_COMPAT_BASE_URL").ok_or_else(|| {
            Error::NotConfigured("missing WEBWHIZ_OPENAI_COMPAT_BASE_URL".to_string())
        })?;
        let model = env("WEBWHIZ_OPENAI_COMPAT_MODEL").ok_or_else(|| {
            Error::NotConfigured("missing WEBWHIZ_OPENAI_COMPAT_MODEL".to_string())
        })?;
        let api_key = env("WEBWHIZ_OPENAI_COMPAT_API_KEY");
        Ok(Self::new(client, base_url, api_key, model, timeout_ms))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint_chat_completions(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    /// One user message, no system prompt, no sampling knobs.
    pub async fn chat(&self, user: &str) -> Result<String> {
        let req = ChatCompletionsRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user".to_string(),
                content: user.to_string(),
            }],
            stream: false,
        };

        let mut rb = self
            .client
            .post(self.endpoint_chat_completions())
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let resp = rb
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::ModelInvocation(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::ModelInvocation(format!(
                "openai_compat chat.completions HTTP {status}"
            )));
        }

        let parsed: ChatCompletionsResponse = resp
            .json()
            .await
            .map_err(|e| Error::ModelInvocation(e.to_string()))?;
        // An empty choice list is a broken response, not an empty answer.
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                Error::ModelInvocation("openai_compat response had no choices".to_string())
            })
    }
}

#[async_trait::async_trait]
impl CompletionBackend for OpenAiCompatClient {
    fn name(&self) -> &'static str {
        "openai_compat"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.chat(prompt).await
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}
