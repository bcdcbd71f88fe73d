use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod route;

pub use route::{classify_url, select_tool, ToolCategory, ToolRegistry};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("missing input: {0}")]
    MissingInput(String),
    #[error("no suitable scraper tool found for {0}")]
    ToolNotFound(String),
    #[error("tool invocation failed: {0}")]
    ToolInvocation(String),
    #[error("model invocation failed: {0}")]
    ModelInvocation(String),
    #[error("tool server connection failed: {0}")]
    Connection(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A callable tool as advertised by the tool server.
///
/// Identity is `name`; the invocation handle lives in the [`ToolProvider`] that listed it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    /// The first category (in routing order) whose name fragments this tool carries.
    pub fn category(&self) -> Option<ToolCategory> {
        ToolCategory::ALL
            .into_iter()
            .find(|c| c.matches_tool_name(&self.name))
    }
}

/// A validated first/last name pair. Only `PersonName::new` builds one, so both parts are never blank.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PersonName {
    first_name: String,
    last_name: String,
}

impl PersonName {
    /// Both parts are required; blank (whitespace-only) parts count as missing.
    pub fn new(first_name: &str, last_name: &str) -> Result<Self> {
        let first_name = first_name.trim();
        let last_name = last_name.trim();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(Error::MissingInput(
                "please enter both first and last name".to_string(),
            ));
        }
        Ok(Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        })
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub url: String,
    /// Extra tool arguments. Only the people-search route fills this in.
    pub extra_fields: BTreeMap<String, String>,
}

impl ScrapeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            extra_fields: BTreeMap::new(),
        }
    }

    pub fn with_person(mut self, name: PersonName) -> Self {
        self.extra_fields
            .insert("first_name".to_string(), name.first_name);
        self.extra_fields
            .insert("last_name".to_string(), name.last_name);
        self
    }

    /// Flat tool input: `{"url": ..., ...extra_fields}`.
    pub fn arguments(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut m = serde_json::Map::new();
        m.insert("url".to_string(), serde_json::json!(self.url));
        for (k, v) in &self.extra_fields {
            if k == "url" {
                continue;
            }
            m.insert(k.clone(), serde_json::json!(v));
        }
        m
    }
}

#[async_trait::async_trait]
pub trait ToolProvider: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;
    /// Invoke `name` and return its text output (untrimmed).
    async fn call_tool(&self, name: &str, req: &ScrapeRequest) -> Result<String>;
}

#[async_trait::async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn complete(&self, prompt: &str) -> Result<String>;
}
