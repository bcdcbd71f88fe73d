//! Prompt assembly for the single completion call.

use webwhiz_core::{CompletionBackend, Result};

/// `Context:` block (scraped text, trimmed) followed by the `Question:` block (verbatim).
pub fn compose_prompt(scraped_text: &str, question: &str) -> String {
    let context = scraped_text.trim();
    let mut out = String::with_capacity(context.len() + question.len() + 32);
    out.push_str("Context:\n\n");
    out.push_str(context);
    out.push_str("\n\nQuestion:\n\n");
    out.push_str(question);
    out
}

/// Build the prompt and return the backend's raw output unmodified.
pub async fn compose_and_ask(
    llm: &dyn CompletionBackend,
    scraped_text: &str,
    question: &str,
) -> Result<String> {
    let prompt = compose_prompt(scraped_text, question);
    tracing::debug!(backend = llm.name(), prompt_chars = prompt.len(), "completion");
    llm.complete(&prompt).await
}
