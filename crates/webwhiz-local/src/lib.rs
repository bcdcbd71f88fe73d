use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use webwhiz_core::{
    select_tool, CompletionBackend, Error, PersonName, Result, ScrapeRequest, ToolCategory,
    ToolDescriptor, ToolProvider, ToolRegistry,
};

pub mod compose;
pub mod ollama;
pub mod openai_compat;

pub const DEFAULT_LIST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 180_000;
pub const DEFAULT_LLM_TIMEOUT_MS: u64 = 180_000;

pub(crate) fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("webwhiz/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| Error::NotConfigured(format!("http client: {e}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmBackendKind {
    Ollama,
    OpenAiCompat,
}

impl LlmBackendKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "ollama" => Ok(Self::Ollama),
            "openai_compat" | "openai-compat" => Ok(Self::OpenAiCompat),
            other => Err(Error::NotConfigured(format!(
                "unknown llm backend {other:?} (allowed: ollama, openai_compat)"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAiCompat => "openai_compat",
        }
    }
}

pub fn completion_backend_from_env(
    kind: LlmBackendKind,
    client: reqwest::Client,
    timeout_ms: u64,
) -> Result<Arc<dyn CompletionBackend>> {
    Ok(match kind {
        LlmBackendKind::Ollama => Arc::new(ollama::OllamaClient::from_env(client, timeout_ms)),
        LlmBackendKind::OpenAiCompat => Arc::new(openai_compat::OpenAiCompatClient::from_env(
            client, timeout_ms,
        )?),
    })
}

/// Fetch the tool list once. Any failure here is fatal to startup, including an empty list:
/// every request routes through it.
pub async fn fetch_registry(provider: &dyn ToolProvider, timeout_ms: u64) -> Result<ToolRegistry> {
    let t0 = Instant::now();
    let tools = tokio::time::timeout(Duration::from_millis(timeout_ms), provider.list_tools())
        .await
        .map_err(|_| Error::Connection(format!("listing tools timed out after {timeout_ms}ms")))??;
    if tools.is_empty() {
        return Err(Error::Connection(
            "tool server advertised no tools".to_string(),
        ));
    }
    tracing::info!(
        tools = tools.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "tool registry loaded"
    );
    Ok(ToolRegistry::new(tools))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RequestState {
    Idle,
    Classifying,
    ToolInvoking,
    Composing,
    Done,
    Failed { message: String },
}

/// One form submission.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub url: String,
    pub question: String,
    pub person: Option<PersonName>,
}

impl Submission {
    pub fn new(url: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            question: question.into(),
            person: None,
        }
    }

    pub fn with_person(mut self, person: PersonName) -> Self {
        self.person = Some(person);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() || self.question.trim().is_empty() {
            return Err(Error::MissingInput(
                "please fill in both URL and question".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub tool: String,
    pub category: ToolCategory,
    pub text: String,
    pub timings_ms: BTreeMap<String, u128>,
}

#[derive(Debug, Clone, Copy)]
pub struct AssistantConfig {
    pub tool_timeout_ms: u64,
    pub llm_timeout_ms: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            tool_timeout_ms: DEFAULT_TOOL_TIMEOUT_MS,
            llm_timeout_ms: DEFAULT_LLM_TIMEOUT_MS,
        }
    }
}

/// Classify -> scrape -> ask, one submission at a time over a fixed tool registry.
pub struct Assistant {
    tools: Arc<dyn ToolProvider>,
    registry: ToolRegistry,
    llm: Arc<dyn CompletionBackend>,
    cfg: AssistantConfig,
}

impl Assistant {
    pub fn new(
        tools: Arc<dyn ToolProvider>,
        registry: ToolRegistry,
        llm: Arc<dyn CompletionBackend>,
        cfg: AssistantConfig,
    ) -> Self {
        Self {
            tools,
            registry,
            llm,
            cfg,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn llm_name(&self) -> &'static str {
        self.llm.name()
    }

    /// Pure routing step; the front end uses it to decide whether to ask for names.
    pub fn route(&self, url: &str) -> Result<(ToolCategory, &ToolDescriptor)> {
        let tool = select_tool(&self.registry, url)?;
        Ok((webwhiz_core::classify_url(url), tool))
    }

    pub async fn ask(&self, sub: &Submission) -> Result<Answer> {
        self.ask_with_progress(sub, |_| {}).await
    }

    /// Like [`Assistant::ask`], reporting each state transition to `on_state`.
    pub async fn ask_with_progress<F>(&self, sub: &Submission, mut on_state: F) -> Result<Answer>
    where
        F: FnMut(RequestState) + Send,
    {
        let out = self.run(sub, &mut on_state).await;
        match &out {
            Ok(_) => on_state(RequestState::Done),
            Err(e) => on_state(RequestState::Failed {
                message: e.to_string(),
            }),
        }
        out
    }

    async fn run<F>(&self, sub: &Submission, on_state: &mut F) -> Result<Answer>
    where
        F: FnMut(RequestState) + Send,
    {
        sub.validate()?;
        let mut timings_ms = BTreeMap::new();

        on_state(RequestState::Classifying);
        let (category, tool) = self.route(&sub.url)?;
        tracing::info!(url = %sub.url, %category, tool = %tool.name, "tool selected");

        let mut req = ScrapeRequest::new(sub.url.clone());
        if category.needs_person_name() {
            let person = sub.person.clone().ok_or_else(|| {
                Error::MissingInput("please enter both first and last name".to_string())
            })?;
            req = req.with_person(person);
        }

        on_state(RequestState::ToolInvoking);
        let t0 = Instant::now();
        let tool_ms = self.cfg.tool_timeout_ms;
        let scraped = tokio::time::timeout(
            Duration::from_millis(tool_ms),
            self.tools.call_tool(&tool.name, &req),
        )
        .await
        .map_err(|_| {
            Error::ToolInvocation(format!("{} timed out after {tool_ms}ms", tool.name))
        })??;
        timings_ms.insert("tool".to_string(), t0.elapsed().as_millis());
        tracing::debug!(tool = %tool.name, chars = scraped.len(), "tool returned");

        on_state(RequestState::Composing);
        let t1 = Instant::now();
        let llm_ms = self.cfg.llm_timeout_ms;
        let text = tokio::time::timeout(
            Duration::from_millis(llm_ms),
            compose::compose_and_ask(self.llm.as_ref(), &scraped, &sub.question),
        )
        .await
        .map_err(|_| {
            Error::ModelInvocation(format!("{} timed out after {llm_ms}ms", self.llm.name()))
        })??;
        timings_ms.insert("llm".to_string(), t1.elapsed().as_millis());

        Ok(Answer {
            tool: tool.name.clone(),
            category,
            text,
            timings_ms,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{EnvGuard, ENV_LOCK};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTools {
        listed: Vec<&'static str>,
        calls: Mutex<Vec<(String, serde_json::Map<String, serde_json::Value>)>>,
        fail: bool,
        delay_ms: u64,
    }

    #[async_trait::async_trait]
    impl ToolProvider for FakeTools {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            Ok(self.listed.iter().map(|n| ToolDescriptor::new(*n)).collect())
        }

        async fn call_tool(&self, name: &str, req: &ScrapeRequest) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), req.arguments()));
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.fail {
                return Err(Error::ToolInvocation("upstream 502".to_string()));
            }
            Ok(format!("\n  scraped by {name}  \n"))
        }
    }

    #[derive(Default)]
    struct FakeLlm {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl CompletionBackend for FakeLlm {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                return Err(Error::ModelInvocation("connection refused".to_string()));
            }
            Ok(" raw model output ".to_string())
        }
    }

    const ALL_TOOLS: [&str; 8] = [
        "linkedin_person_profile",
        "linkedin_company_profile",
        "linkedin_job_listings",
        "linkedin_posts",
        "linkedin_people_search",
        "github_repository_file",
        "scrape_as_markdown",
        "scrape_browser",
    ];

    fn tools(listed: &[&'static str]) -> Arc<FakeTools> {
        Arc::new(FakeTools {
            listed: listed.to_vec(),
            ..Default::default()
        })
    }

    async fn assistant(tools: Arc<FakeTools>, llm: Arc<FakeLlm>) -> Assistant {
        let registry = fetch_registry(tools.as_ref(), 1_000).await.unwrap();
        Assistant::new(tools, registry, llm, AssistantConfig::default())
    }

    #[tokio::test]
    async fn person_profile_end_to_end() {
        let t = tools(&ALL_TOOLS);
        let llm = Arc::new(FakeLlm::default());
        let a = assistant(t.clone(), llm.clone()).await;

        let sub = Submission::new(
            "https://linkedin.com/in/sundarpichai",
            "What companies has this person worked at?",
        );
        let mut states = Vec::new();
        let ans = a
            .ask_with_progress(&sub, |s| states.push(s))
            .await
            .unwrap();

        assert_eq!(ans.tool, "linkedin_person_profile");
        assert_eq!(ans.category, ToolCategory::PersonProfile);
        assert_eq!(ans.text, " raw model output ");

        let calls = t.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "linkedin_person_profile");
        assert_eq!(
            serde_json::Value::Object(calls[0].1.clone()),
            serde_json::json!({"url": "https://linkedin.com/in/sundarpichai"})
        );

        assert_eq!(
            llm.prompts.lock().unwrap().clone(),
            vec![
                "Context:\n\nscraped by linkedin_person_profile\n\nQuestion:\n\nWhat companies has this person worked at?"
                    .to_string()
            ]
        );
        assert_eq!(
            states,
            vec![
                RequestState::Classifying,
                RequestState::ToolInvoking,
                RequestState::Composing,
                RequestState::Done
            ]
        );
    }

    #[tokio::test]
    async fn generic_url_uses_browser_scraper_regardless_of_question() {
        let t = tools(&ALL_TOOLS);
        let a = assistant(t.clone(), Arc::new(FakeLlm::default())).await;
        for q in ["Summarize", "What does the linkedin.com/in/ profile say?"] {
            let ans = a
                .ask(&Submission::new("https://example.com/news/1", q))
                .await
                .unwrap();
            assert_eq!(ans.tool, "scrape_browser");
            assert_eq!(ans.category, ToolCategory::GenericBrowse);
        }
    }

    #[tokio::test]
    async fn people_search_requires_both_names_before_any_call() {
        let t = tools(&ALL_TOOLS);
        let llm = Arc::new(FakeLlm::default());
        let a = assistant(t.clone(), llm.clone()).await;
        let url = "https://www.linkedin.com/search/results/people/?keywords=ada";

        let err = a.ask(&Submission::new(url, "Who?")).await.unwrap_err();
        assert!(matches!(err, Error::MissingInput(_)));
        assert!(t.calls.lock().unwrap().is_empty());
        assert!(llm.prompts.lock().unwrap().is_empty());

        // Whitespace-only names never become a PersonName.
        assert!(PersonName::new("", "  ").is_err());

        let sub = Submission::new(url, "Who?")
            .with_person(PersonName::new(" Ada ", "Lovelace\n").unwrap());
        a.ask(&sub).await.unwrap();
        let calls = t.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "linkedin_people_search");
        assert_eq!(calls[0].1["first_name"], serde_json::json!("Ada"));
        assert_eq!(calls[0].1["last_name"], serde_json::json!("Lovelace"));
    }

    #[tokio::test]
    async fn missing_tool_aborts_without_remote_calls() {
        let t = tools(&["scrape_browser"]);
        let llm = Arc::new(FakeLlm::default());
        let a = assistant(t.clone(), llm.clone()).await;

        let mut last = None;
        let err = a
            .ask_with_progress(
                &Submission::new("https://github.com/o/r/blob/main/main.py", "What?"),
                |s| last = Some(s),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
        assert!(matches!(last, Some(RequestState::Failed { .. })));
        assert!(t.calls.lock().unwrap().is_empty());
        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_inputs_are_rejected_up_front() {
        let t = tools(&ALL_TOOLS);
        let a = assistant(t.clone(), Arc::new(FakeLlm::default())).await;
        for (u, q) in [("", "q"), ("https://example.com", "  "), ("", "")] {
            let err = a.ask(&Submission::new(u, q)).await.unwrap_err();
            assert!(matches!(err, Error::MissingInput(_)), "{u:?} {q:?}");
        }
        assert!(t.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tool_failure_skips_the_model() {
        let t = Arc::new(FakeTools {
            listed: ALL_TOOLS.to_vec(),
            fail: true,
            ..Default::default()
        });
        let llm = Arc::new(FakeLlm::default());
        let a = assistant(t, llm.clone()).await;
        let err = a
            .ask(&Submission::new("https://example.com", "q"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolInvocation(_)));
        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn model_failure_is_reported_not_swallowed() {
        let llm = Arc::new(FakeLlm {
            fail: true,
            ..Default::default()
        });
        let a = assistant(tools(&ALL_TOOLS), llm).await;
        let err = a
            .ask(&Submission::new("https://example.com", "q"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ModelInvocation(_)));
    }

    #[tokio::test]
    async fn slow_tool_times_out_as_invocation_error() {
        let t = Arc::new(FakeTools {
            listed: ALL_TOOLS.to_vec(),
            ..Default::default()
        });
        let registry = fetch_registry(t.as_ref(), 1_000).await.unwrap();
        let slow = Arc::new(FakeTools {
            listed: ALL_TOOLS.to_vec(),
            delay_ms: 5_000,
            ..Default::default()
        });
        let a = Assistant::new(
            slow,
            registry,
            Arc::new(FakeLlm::default()),
            AssistantConfig {
                tool_timeout_ms: 50,
                llm_timeout_ms: 1_000,
            },
        );
        match a.ask(&Submission::new("https://example.com", "q")).await {
            Err(Error::ToolInvocation(msg)) => assert!(msg.contains("timed out"), "{msg}"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn registry_fetch_failures_are_connection_errors() {
        let empty = tools(&[]);
        assert!(matches!(
            fetch_registry(empty.as_ref(), 1_000).await,
            Err(Error::Connection(_))
        ));

        let slow = Arc::new(FakeTools {
            listed: ALL_TOOLS.to_vec(),
            delay_ms: 5_000,
            ..Default::default()
        });
        assert!(matches!(
            fetch_registry(slow.as_ref(), 50).await,
            Err(Error::Connection(_))
        ));
    }

    #[tokio::test]
    async fn routing_is_stable_across_requests() {
        let a = assistant(tools(&ALL_TOOLS), Arc::new(FakeLlm::default())).await;
        let url = "https://linkedin.com/company/acme?ref=github.com";
        let (c1, t1) = a.route(url).unwrap();
        let (c2, t2) = a.route(url).unwrap();
        assert_eq!((c1, &t1.name), (c2, &t2.name));
        assert_eq!(t1.name, "linkedin_company_profile");
    }

    #[test]
    fn backend_kind_parses_known_names() {
        assert_eq!(LlmBackendKind::parse("").unwrap(), LlmBackendKind::Ollama);
        assert_eq!(
            LlmBackendKind::parse("OpenAI-Compat").unwrap(),
            LlmBackendKind::OpenAiCompat
        );
        assert!(matches!(
            LlmBackendKind::parse("gpt"),
            Err(Error::NotConfigured(_))
        ));
    }

    #[test]
    fn ollama_backend_reads_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _a = EnvGuard::set("WEBWHIZ_OLLAMA_BASE_URL", "http://ollama.internal:11434/");
        let _b = EnvGuard::set("WEBWHIZ_OLLAMA_MODEL", "  ");
        let c = ollama::OllamaClient::from_env(reqwest::Client::new(), 1_000);
        assert_eq!(c.base_url(), "http://ollama.internal:11434/");
        assert_eq!(c.model(), ollama::DEFAULT_MODEL);
    }
}
