use serde::Serialize;
use webwhiz_core::Error;

pub const SCHEMA_VERSION: u64 = 1;

/// What the front end shows for a finished request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Answer,
    Warning,
    Error,
}

impl Status {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Answer => 0,
            Self::Error => 1,
            Self::Warning => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    MissingInput,
    ToolNotFound,
    ToolInvocationFailed,
    ModelInvocationFailed,
    ConnectionFailed,
    NotConfigured,
}

impl ErrorCode {
    pub fn of(e: &Error) -> Self {
        match e {
            Error::MissingInput(_) => Self::MissingInput,
            Error::ToolNotFound(_) => Self::ToolNotFound,
            Error::ToolInvocation(_) => Self::ToolInvocationFailed,
            Error::ModelInvocation(_) => Self::ModelInvocationFailed,
            Error::Connection(_) => Self::ConnectionFailed,
            Error::NotConfigured(_) => Self::NotConfigured,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingInput => "missing_input",
            Self::ToolNotFound => "tool_not_found",
            Self::ToolInvocationFailed => "tool_invocation_failed",
            Self::ModelInvocationFailed => "model_invocation_failed",
            Self::ConnectionFailed => "connection_failed",
            Self::NotConfigured => "not_configured",
        }
    }

    pub fn status(self) -> Status {
        match self {
            Self::MissingInput => Status::Warning,
            _ => Status::Error,
        }
    }

    pub fn retryable(self) -> bool {
        match self {
            Self::ToolInvocationFailed | Self::ModelInvocationFailed | Self::ConnectionFailed => {
                true
            }
            // Nothing changes on retry without new input or config.
            Self::MissingInput | Self::ToolNotFound | Self::NotConfigured => false,
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            Self::MissingInput => "Fill in the URL and the question (and both names for a LinkedIn people search).",
            Self::ToolNotFound => "The tool server does not offer a tool for this kind of URL. Run `webwhiz tools` to see what it advertises.",
            Self::ToolInvocationFailed => "The scraping call failed or timed out. Check BRD_API_KEY, or raise WEBWHIZ_TOOL_TIMEOUT_MS.",
            Self::ModelInvocationFailed => "The language model call failed. Check that the backend is running (e.g. `ollama serve`) and the model is pulled.",
            Self::ConnectionFailed => "Could not start or talk to the MCP tool server. Check WEBWHIZ_MCP_COMMAND / WEBWHIZ_MCP_ARGS and run `webwhiz doctor`.",
            Self::NotConfigured => "Set the missing environment variable (see `webwhiz doctor`).",
        }
    }
}

pub fn add_envelope_fields(payload: &mut serde_json::Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = serde_json::json!(SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
}

pub fn error_obj(e: &Error) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject {
        code: &'static str,
        message: String,
        hint: &'static str,
        retryable: bool,
    }

    let code = ErrorCode::of(e);
    let obj = ErrorObject {
        code: code.as_str(),
        message: e.to_string(),
        hint: code.hint(),
        retryable: code.retryable(),
    };
    serde_json::to_value(obj).unwrap_or_else(|_| {
        serde_json::json!({
            "code": code.as_str(),
            "message": e.to_string(),
            "hint": code.hint(),
            "retryable": code.retryable()
        })
    })
}

/// `{ok: false, status, error}` for a failed request.
pub fn failure(e: &Error, kind: &str, elapsed_ms: u128) -> serde_json::Value {
    let code = ErrorCode::of(e);
    let mut v = serde_json::json!({
        "ok": false,
        "status": code.status(),
        "error": error_obj(e),
    });
    add_envelope_fields(&mut v, kind, elapsed_ms);
    v
}
