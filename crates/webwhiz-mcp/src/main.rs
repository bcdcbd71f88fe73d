use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::io::{BufRead, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use webwhiz::envelope::{self, Status};
use webwhiz::mcp::{self, McpServerConfig, McpToolProvider};
use webwhiz_core::{classify_url, ToolCategory, ToolRegistry};
use webwhiz_local::{
    completion_backend_from_env, fetch_registry, http_client, Assistant, AssistantConfig,
    LlmBackendKind, Submission, DEFAULT_LIST_TIMEOUT_MS, DEFAULT_LLM_TIMEOUT_MS,
    DEFAULT_TOOL_TIMEOUT_MS,
};

mod shell;
use shell::Shell;

#[derive(Parser, Debug)]
#[command(name = "webwhiz")]
#[command(about = "Ask questions about a web page (URL-routed MCP scraping + one LLM call)", long_about = None)]
struct Cli {
    /// Raise log verbosity on stderr (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer one question about one URL.
    Ask(AskCmd),
    /// Interactive form: tools are loaded once, then URL/question pairs are read from stdin.
    Session(SessionCmd),
    /// List the tool server's tools and the route each one serves (json).
    Tools(ToolsCmd),
    /// Show which route a URL takes, without contacting any server.
    Route(RouteCmd),
    /// Diagnose configuration/launch issues (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug, Clone)]
struct ServerArgs {
    /// Command that starts the MCP tool server (stdio transport).
    #[arg(long, env = "WEBWHIZ_MCP_COMMAND", default_value = mcp::DEFAULT_COMMAND)]
    mcp_command: String,
    /// Whitespace-separated arguments for the MCP server command.
    #[arg(long, env = "WEBWHIZ_MCP_ARGS", default_value = mcp::DEFAULT_ARGS, allow_hyphen_values = true)]
    mcp_args: String,
    /// Timeout for starting the server and listing its tools (ms).
    #[arg(long, env = "WEBWHIZ_TOOLS_TIMEOUT_MS", default_value_t = DEFAULT_LIST_TIMEOUT_MS)]
    tools_timeout_ms: u64,
}

impl ServerArgs {
    fn config(&self) -> McpServerConfig {
        McpServerConfig::new(
            &self.mcp_command,
            &self.mcp_args,
            std::env::var("BRD_API_KEY").ok(),
        )
    }
}

#[derive(clap::Args, Debug, Clone)]
struct LlmArgs {
    /// Completion backend. Allowed: ollama, openai_compat
    #[arg(long, env = "WEBWHIZ_LLM_BACKEND", default_value = "ollama")]
    llm: String,
    /// Timeout for the completion call (ms).
    #[arg(long, env = "WEBWHIZ_LLM_TIMEOUT_MS", default_value_t = DEFAULT_LLM_TIMEOUT_MS)]
    llm_timeout_ms: u64,
    /// Timeout for each scraping tool call (ms).
    #[arg(long, env = "WEBWHIZ_TOOL_TIMEOUT_MS", default_value_t = DEFAULT_TOOL_TIMEOUT_MS)]
    tool_timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
struct AskCmd {
    /// Page to scrape (LinkedIn profile/company/jobs/post/people search, GitHub file, or any page).
    #[arg(long, default_value = "")]
    url: String,
    /// What you want to know from the page.
    #[arg(long, default_value = "")]
    question: String,
    /// Required for LinkedIn people search URLs (prompted for when stdin is a terminal).
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    /// Output format: text|json
    #[arg(long = "output", alias = "format", default_value = "text")]
    output: String,
    #[command(flatten)]
    server: ServerArgs,
    #[command(flatten)]
    llm: LlmArgs,
}

#[derive(clap::Args, Debug)]
struct SessionCmd {
    /// Output format: text|json
    #[arg(long = "output", alias = "format", default_value = "text")]
    output: String,
    #[command(flatten)]
    server: ServerArgs,
    #[command(flatten)]
    llm: LlmArgs,
}

#[derive(clap::Args, Debug)]
struct ToolsCmd {
    #[command(flatten)]
    server: ServerArgs,
}

#[derive(clap::Args, Debug)]
struct RouteCmd {
    #[arg(long)]
    url: String,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Spawn the MCP server and list its tools to prove it starts.
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    check_mcp: bool,
    #[command(flatten)]
    server: ServerArgs,
    #[command(flatten)]
    llm: LlmArgs,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    // stdout carries results; logs never go there.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// `WEBWHIZ_ENV_FILE=path`: load KEY=VALUE lines without overriding the process environment.
fn load_env_file() {
    let Ok(p) = std::env::var("WEBWHIZ_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        let v = v.trim().trim_matches('"');
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v);
        }
    }
}

/// Startup: build the completion backend, spawn the tool server, load the registry once.
async fn start(
    server: &ServerArgs,
    llm: &LlmArgs,
) -> webwhiz_core::Result<(Assistant, Arc<McpToolProvider>)> {
    let kind = LlmBackendKind::parse(&llm.llm)?;
    let backend = completion_backend_from_env(kind, http_client()?, llm.llm_timeout_ms)?;

    let provider = Arc::new(McpToolProvider::connect(&server.config(), server.tools_timeout_ms).await?);
    let registry = fetch_registry(provider.as_ref(), server.tools_timeout_ms).await?;
    for (category, names) in registry.ambiguities() {
        tracing::warn!(%category, candidates = ?names, "several tools serve one route; using the first");
    }

    let assistant = Assistant::new(
        provider.clone(),
        registry,
        backend,
        AssistantConfig {
            tool_timeout_ms: llm.tool_timeout_ms,
            llm_timeout_ms: llm.llm_timeout_ms,
        },
    );
    Ok((assistant, provider))
}

/// Spawn the server, list its tools, and stop it again.
async fn load_registry(server: &ServerArgs) -> webwhiz_core::Result<ToolRegistry> {
    let provider = McpToolProvider::connect(&server.config(), server.tools_timeout_ms).await?;
    let registry = fetch_registry(&provider, server.tools_timeout_ms).await;
    provider.shutdown().await;
    registry
}

async fn shutdown(assistant: Assistant, provider: Arc<McpToolProvider>) {
    drop(assistant);
    if let Ok(p) = Arc::try_unwrap(provider) {
        p.shutdown().await;
    }
}

/// One submission through routing, optional name collection and the pipeline.
/// Missing names are read from `input` when there is one.
async fn submit(
    assistant: &Assistant,
    shell: &Shell,
    mut sub: Submission,
    first_name: Option<String>,
    last_name: Option<String>,
    input: Option<&mut dyn BufRead>,
) -> Status {
    let t0 = Instant::now();
    if let Err(e) = sub.validate() {
        return shell.failure(&e, t0.elapsed().as_millis());
    }
    let category = match assistant.route(&sub.url) {
        Ok((c, _)) => c,
        Err(e) => return shell.failure(&e, t0.elapsed().as_millis()),
    };
    if category.needs_person_name() && sub.person.is_none() {
        match shell::collect_person(first_name, last_name, input) {
            Ok(p) => sub.person = Some(p),
            Err(e) => return shell.failure(&e, t0.elapsed().as_millis()),
        }
    }
    match assistant
        .ask_with_progress(&sub, |s| shell.progress(&s))
        .await
    {
        Ok(ans) => shell.answer(&ans, t0.elapsed().as_millis()),
        Err(e) => shell.failure(&e, t0.elapsed().as_millis()),
    }
}

async fn run_ask(args: AskCmd) -> ExitCode {
    let shell = Shell::new(&args.output, "ask");
    let t0 = Instant::now();
    let sub = Submission::new(args.url.trim(), args.question.clone());
    // Reject an incomplete form before spawning anything.
    if let Err(e) = sub.validate() {
        return ExitCode::from(shell.failure(&e, t0.elapsed().as_millis()).exit_code());
    }
    let (assistant, provider) = match start(&args.server, &args.llm).await {
        Ok(v) => v,
        Err(e) => return ExitCode::from(shell.failure(&e, t0.elapsed().as_millis()).exit_code()),
    };
    let stdin = std::io::stdin();
    let interactive = stdin.is_terminal();
    let mut input = stdin.lock();
    let status = submit(
        &assistant,
        &shell,
        sub,
        args.first_name,
        args.last_name,
        interactive.then_some(&mut input as &mut dyn BufRead),
    )
    .await;
    shutdown(assistant, provider).await;
    ExitCode::from(status.exit_code())
}

async fn run_session(args: SessionCmd) -> Result<ExitCode> {
    let shell = Shell::new(&args.output, "session");
    let t0 = Instant::now();
    let (assistant, provider) = match start(&args.server, &args.llm).await {
        Ok(v) => v,
        Err(e) => return Ok(ExitCode::from(shell.failure(&e, t0.elapsed().as_millis()).exit_code())),
    };
    eprintln!(
        "WebWhiz: {} tools loaded, answering with {}. Empty line or :q to quit.\n\n{}\n",
        assistant.registry().len(),
        assistant.llm_name(),
        shell::TIPS
    );

    session_loop(&assistant, &shell, &mut std::io::stdin().lock()).await?;
    shutdown(assistant, provider).await;
    Ok(ExitCode::SUCCESS)
}

/// Read URL/question pairs until EOF, an empty URL or `:q`. A failed submission goes back to the
/// prompt. Returns the status of every submission.
async fn session_loop(
    assistant: &Assistant,
    shell: &Shell,
    input: &mut dyn BufRead,
) -> std::io::Result<Vec<Status>> {
    let mut statuses = Vec::new();
    loop {
        let Some(url) = shell::prompt_line(input, "URL")? else {
            break;
        };
        if url.is_empty() || url == ":q" {
            break;
        }
        let Some(question) = shell::prompt_line(input, "Question")? else {
            break;
        };
        let status = submit(
            assistant,
            shell,
            Submission::new(url, question),
            None,
            None,
            Some(&mut *input),
        )
        .await;
        statuses.push(status);
    }
    Ok(statuses)
}

async fn run_tools(args: ToolsCmd) -> ExitCode {
    let t0 = Instant::now();
    let registry = match load_registry(&args.server).await {
        Ok(r) => r,
        Err(e) => {
            println!("{}", envelope::failure(&e, "tools", t0.elapsed().as_millis()));
            return ExitCode::from(Status::Error.exit_code());
        }
    };

    let tools: Vec<serde_json::Value> = registry
        .tools()
        .iter()
        .map(|t| {
            serde_json::json!({
                "name": t.name,
                "description": t.description,
                "category": t.category(),
            })
        })
        .collect();
    let routes: Vec<serde_json::Value> = ToolCategory::ALL
        .into_iter()
        .map(|c| {
            serde_json::json!({
                "category": c,
                "tool": registry.find(c).map(|t| t.name.clone()),
            })
        })
        .collect();
    let ambiguous: Vec<serde_json::Value> = registry
        .ambiguities()
        .into_iter()
        .map(|(c, names)| serde_json::json!({"category": c, "candidates": names}))
        .collect();
    let mut v = serde_json::json!({
        "ok": true,
        "tools": tools,
        "routes": routes,
        "ambiguous": ambiguous,
    });
    envelope::add_envelope_fields(&mut v, "tools", t0.elapsed().as_millis());
    println!("{v}");
    ExitCode::SUCCESS
}

fn run_route(args: RouteCmd) {
    let category = classify_url(&args.url);
    match args.output.to_ascii_lowercase().as_str() {
        "text" => println!(
            "{category}: tool name must contain {}",
            category.required_name_parts().join(" + ")
        ),
        _ => {
            let mut v = serde_json::json!({
                "ok": true,
                "url": args.url,
                "category": category,
                "required_name_parts": category.required_name_parts(),
                "needs_person_name": category.needs_person_name(),
            });
            envelope::add_envelope_fields(&mut v, "route", 0);
            println!("{v}");
        }
    }
}

async fn run_doctor(args: DoctorCmd) -> ExitCode {
    let t0 = Instant::now();
    let mut checks: Vec<serde_json::Value> = Vec::new();

    let token_set = std::env::var("BRD_API_KEY")
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false);
    checks.push(serde_json::json!({
        "name": "brd_api_key_present",
        "ok": token_set,
        "message": if token_set { "BRD_API_KEY is set" } else { "BRD_API_KEY is not set" },
        "hint": if token_set { "" } else { "Export BRD_API_KEY (passed to the MCP server as API_TOKEN)." },
    }));

    let llm = LlmBackendKind::parse(&args.llm.llm).and_then(|kind| {
        completion_backend_from_env(kind, http_client()?, args.llm.llm_timeout_ms)
            .map(|_| kind)
    });
    checks.push(match &llm {
        Ok(kind) => serde_json::json!({
            "name": "llm_backend_configured",
            "ok": true,
            "backend": kind.as_str(),
            "message": "completion backend is configured",
            "hint": "",
        }),
        Err(e) => serde_json::json!({
            "name": "llm_backend_configured",
            "ok": false,
            "backend": args.llm.llm,
            "message": e.to_string(),
            "hint": envelope::ErrorCode::of(e).hint(),
        }),
    });

    if args.check_mcp {
        let cfg = args.server.config();
        checks.push(match load_registry(&args.server).await {
            Ok(r) => serde_json::json!({
                "name": "mcp_server_handshake",
                "ok": true,
                "command": cfg.display_command(),
                "tool_count": r.len(),
                "message": "MCP server started and listed its tools",
                "hint": "",
            }),
            Err(e) => serde_json::json!({
                "name": "mcp_server_handshake",
                "ok": false,
                "command": cfg.display_command(),
                "error": envelope::error_obj(&e),
                "message": "MCP server handshake failed",
                "hint": envelope::ErrorCode::of(&e).hint(),
            }),
        });
    } else {
        checks.push(serde_json::json!({
            "name": "mcp_server_handshake",
            "ok": true,
            "skipped": true,
            "message": "MCP server handshake skipped",
            "hint": "",
        }));
    }

    let ok = checks.iter().all(|c| c["ok"].as_bool().unwrap_or(false));
    let mut v = serde_json::json!({
        "ok": ok,
        "name": "webwhiz",
        "version": env!("CARGO_PKG_VERSION"),
        "checks": checks,
    });
    envelope::add_envelope_fields(&mut v, "doctor", t0.elapsed().as_millis());
    println!("{v}");
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(Status::Error.exit_code())
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    load_env_file();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match cli.command {
        Commands::Ask(args) => run_ask(args).await,
        Commands::Session(args) => run_session(args).await?,
        Commands::Tools(args) => run_tools(args).await,
        Commands::Route(args) => {
            run_route(args);
            ExitCode::SUCCESS
        }
        Commands::Doctor(args) => run_doctor(args).await,
        Commands::Version(args) => {
            let mut v = serde_json::json!({
                "ok": true,
                "name": "webwhiz",
                "version": env!("CARGO_PKG_VERSION"),
            });
            envelope::add_envelope_fields(&mut v, "version", 0);
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("webwhiz {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
            ExitCode::SUCCESS
        }
    };
    Ok(code)
}
