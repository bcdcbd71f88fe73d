//! Terminal front end: reads form fields, reports progress on stderr, prints results on stdout.

use std::io::{BufRead, IsTerminal, Write};
use webwhiz::envelope::{self, Status};
use webwhiz_core::{Error, PersonName, Result};
use webwhiz_local::{Answer, RequestState};

pub(crate) const TIPS: &str = "\
Examples:
  URL: https://linkedin.com/in/sundarpichai
  Question: What companies has this person worked at?

  URL: https://github.com/username/project/blob/main/main.py
  Question: What does this Python function do?";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub(crate) fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

pub(crate) struct Shell {
    pub(crate) output: OutputFormat,
    pub(crate) kind: &'static str,
}

impl Shell {
    pub(crate) fn new(output: &str, kind: &'static str) -> Self {
        Self {
            output: OutputFormat::parse(output),
            kind,
        }
    }

    pub(crate) fn answer(&self, ans: &Answer, elapsed_ms: u128) -> Status {
        match self.output {
            OutputFormat::Json => {
                let mut v = serde_json::json!({
                    "ok": true,
                    "status": Status::Answer,
                    "tool": ans.tool,
                    "category": ans.category,
                    "answer": ans.text,
                    "timings_ms": ans.timings_ms,
                });
                envelope::add_envelope_fields(&mut v, self.kind, elapsed_ms);
                println!("{v}");
            }
            OutputFormat::Text => {
                println!("### WebWhiz Answer ({} via {}):", ans.category, ans.tool);
                println!("{}", ans.text);
            }
        }
        Status::Answer
    }

    pub(crate) fn failure(&self, e: &Error, elapsed_ms: u128) -> Status {
        let v = envelope::failure(e, self.kind, elapsed_ms);
        let status = envelope::ErrorCode::of(e).status();
        match self.output {
            OutputFormat::Json => println!("{v}"),
            OutputFormat::Text => {
                let label = match status {
                    Status::Warning => "warning",
                    _ => "error",
                };
                println!("{label}: {e}");
                if let Some(h) = v["error"]["hint"].as_str() {
                    println!("hint: {h}");
                }
            }
        }
        status
    }

    /// Progress goes to stderr so stdout stays a clean result channel.
    pub(crate) fn progress(&self, state: &RequestState) {
        if self.output != OutputFormat::Text || !std::io::stderr().is_terminal() {
            return;
        }
        let msg = match state {
            RequestState::ToolInvoking => "Scraping the page...",
            RequestState::Composing => "Thinking...",
            _ => return,
        };
        eprintln!("{msg}");
    }
}

/// Print `label` on stderr and read one trimmed line from `input`; `None` on EOF.
pub(crate) fn prompt_line<R: BufRead + ?Sized>(
    input: &mut R,
    label: &str,
) -> std::io::Result<Option<String>> {
    let mut out = std::io::stderr();
    write!(out, "{label}: ")?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn name_part(given: Option<String>, label: &str, input: &mut Option<&mut dyn BufRead>) -> String {
    if let Some(s) = given.filter(|s| !s.trim().is_empty()) {
        return s;
    }
    let Some(input) = input.as_mut() else {
        return String::new();
    };
    match prompt_line(&mut **input, label) {
        Ok(line) => line.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, field = label, "could not read from stdin");
            String::new()
        }
    }
}

/// Names come from flags first; missing ones are read from `input` when there is one.
pub(crate) fn collect_person(
    first_name: Option<String>,
    last_name: Option<String>,
    mut input: Option<&mut dyn BufRead>,
) -> Result<PersonName> {
    let first = name_part(first_name, "First Name", &mut input);
    let last = name_part(last_name, "Last Name", &mut input);
    PersonName::new(&first, &last)
}
