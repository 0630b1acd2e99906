//! huddle: multi-agent sports question answering
//!
//! Usage:
//!   huddle --ask "<question>"   - Answer one question and exit
//!   huddle --cli                - Start interactive CLI mode
//!   huddle --help               - Show help

mod cli;

use huddle_core::orchestration::Synthesizer;
use huddle_core::{
    Config, DomainBuilder, DomainLoader, LlmClassifier, LlmClient, Orchestrator, Query, Response,
};
use huddle_tools::tools_for_domain;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// Answer a single question
    Ask(String),
    /// Interactive CLI mode
    Cli,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    mode: RunMode,
    domain: Option<String>,
}

/// Everything needed to answer questions for one domain
pub struct App {
    pub orchestrator: Orchestrator,
    pub domain: String,
    pub loader: DomainLoader,
}

impl App {
    /// Answer a query; Ctrl+C while it runs cancels outstanding branches
    pub async fn answer(&self, query: &Query) -> huddle_core::Result<Response> {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling...");
                on_interrupt.cancel();
            }
        });

        let result = self.orchestrator.answer_with_cancel(query, cancel).await;
        watcher.abort();
        result
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1));

    match args.mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("huddle {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;
    let domain_name = args.domain.unwrap_or_else(|| config.domains.default.clone());

    tracing::info!("Starting huddle...");
    tracing::info!("Model: {}", config.llm.model);

    let app = build_app(&config, &domain_name).await?;

    match args.mode {
        RunMode::Ask(question) => run_ask(&app, &question).await,
        RunMode::Cli => {
            tracing::info!("Running in CLI mode");
            cli::run_cli(app).await
        }
        _ => Ok(()),
    }
}

/// Load the domain and wire its handler tree into an orchestrator
async fn build_app(config: &Config, domain_name: &str) -> anyhow::Result<App> {
    let client = LlmClient::new(config).map_err(|e| anyhow::anyhow!("Failed to create LLM client: {}", e))?;

    let loader = DomainLoader::new(&config.domains.dir);
    let definition = loader
        .load(domain_name)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load domain: {}", e))?;

    let mut classifier = LlmClassifier::new(Arc::new(client));
    if let Some(persona) = &definition.domain.persona {
        classifier = classifier.with_persona(persona);
    }
    let classifier = Arc::new(classifier);

    let tools = tools_for_domain(&definition, &config.tools);
    tracing::info!("Registered {} tools: {:?}", tools.len(), tools.tool_names());

    let domain = DomainBuilder::new(&definition, &tools, classifier.clone())
        .orchestration(config.orchestration.clone())
        .build()
        .map_err(|e| anyhow::anyhow!("Invalid domain '{}': {}", domain_name, e))?;

    tracing::info!(
        "Domain '{}' ready: {} entry handlers, {} handlers total",
        domain.name,
        domain.registry.len(),
        domain.handler_count
    );

    let synthesizer: Arc<dyn Synthesizer> = classifier.clone();
    let mut builder = Orchestrator::builder(domain.registry, classifier)
        .synthesizer(synthesizer)
        .config(domain.orchestration);
    if let Some(persona) = domain.persona {
        builder = builder.persona(persona);
    }
    let orchestrator = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build orchestrator: {}", e))?;

    Ok(App {
        orchestrator,
        domain: domain.name,
        loader,
    })
}

/// One-shot mode: answer and print per-sub-query status
async fn run_ask(app: &App, question: &str) -> anyhow::Result<()> {
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("Question is empty");
    }

    let response = app
        .answer(&Query::new(question))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to answer: {}", e))?;

    println!("{}", response.answer.text);
    println!();
    cli::print_results(&response);
    Ok(())
}

/// Parse command line arguments
fn parse_args(args: impl IntoIterator<Item = String>) -> Args {
    let mut mode = None;
    let mut domain = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--ask" | "-a" => match args.next() {
                Some(question) => mode = Some(RunMode::Ask(question)),
                None => return Args { mode: RunMode::Help, domain },
            },
            "--domain" | "-d" => domain = args.next(),
            "--cli" | "-c" => mode = mode.or(Some(RunMode::Cli)),
            "--help" | "-h" => return Args { mode: RunMode::Help, domain },
            "--version" | "-v" => return Args { mode: RunMode::Version, domain },
            _ => {}
        }
    }

    Args {
        mode: mode.unwrap_or(RunMode::Cli),
        domain,
    }
}

/// Print help message
fn print_help() {
    println!("huddle - multi-agent sports question answering");
    println!();
    println!("Usage:");
    println!("  huddle --ask \"<question>\"  Answer one question and exit");
    println!("  huddle --cli               Start interactive CLI mode (default)");
    println!("  huddle --domain <name>     Domain to load (nba, mlb, soccer, ...)");
    println!("  huddle --help              Show this help message");
    println!("  huddle --version           Show version");
    println!();
    println!("Environment Variables:");
    println!("  LLM_API_KEY                  API key (required)");
    println!("  LLM_MODEL                    Model name");
    println!("  LLM_PROVIDER                 Provider: claude or openai (default: claude)");
    println!("  LLM_BASE_URL                 Custom API endpoint");
    println!("  HUDDLE_DOMAIN                Default domain (default: nba)");
    println!("  HUDDLE_DOMAINS_DIR           Domain files directory (default: domains)");
    println!("  HUDDLE_MAX_SUBQUERIES        Sub-queries per question (default: 7)");
    println!("  HUDDLE_MAX_HOPS              Routing hops per supervisor (default: 4)");
    println!("  HUDDLE_MAX_CONCURRENCY       Parallel branches (default: 8)");
    println!("  HUDDLE_DISPATCH_DEADLINE_SECS  Per-question deadline (default: 120)");
    println!("  HUDDLE_ON_EXHAUSTED          best_partial or fail (default: best_partial)");
    println!("  TAVILY_API_KEY               Web search API key (optional)");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Args {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_default_is_cli() {
        assert_eq!(args(&[]), Args { mode: RunMode::Cli, domain: None });
    }

    #[test]
    fn test_ask_with_domain() {
        let parsed = args(&["--domain", "mlb", "--ask", "Who won last night?"]);
        assert_eq!(parsed.mode, RunMode::Ask("Who won last night?".to_string()));
        assert_eq!(parsed.domain.as_deref(), Some("mlb"));
    }

    #[test]
    fn test_ask_without_question_shows_help() {
        assert_eq!(args(&["--ask"]).mode, RunMode::Help);
    }

    #[test]
    fn test_ask_wins_over_cli() {
        assert_eq!(args(&["--cli", "-a", "score?"]).mode, RunMode::Ask("score?".to_string()));
    }

    #[test]
    fn test_version() {
        assert_eq!(args(&["-v"]).mode, RunMode::Version);
    }
}
