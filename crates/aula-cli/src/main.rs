//! aula - university assistant in the terminal

mod config;
mod local;

use anyhow::Context;
use aula_ai::ChatTurn;
use aula_engine::{
    ConversationContext, ConversationEngine, ConversationResponse, EngineConfig, ExecutionMode,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::CliConfig;
use crate::local::{LocalComplaints, LocalDocuments};

/// aula - university assistant
#[derive(Parser, Debug)]
#[command(name = "aula")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Provider (openai, anthropic, ollama, custom)
    #[arg(short, long)]
    provider: Option<String>,

    /// Model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Process a single message and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Document corpus (JSON array of {filename, content})
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// User id sent with each turn (anonymous when omitted)
    #[arg(short, long, default_value = "")]
    user: String,

    /// Run the sequential workflow instead of the graph
    #[arg(long)]
    sequential: bool,

    /// Print responses as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Check collaborator health and exit
    #[arg(long)]
    health: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("aula=debug")
            .init();
    }

    if args.init_config {
        match CliConfig::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = CliConfig::load();
    let complaints = Arc::new(LocalComplaints::new());
    let engine = build_engine(&args, &cfg, complaints.clone())?;

    if args.health {
        let report = engine.health_check().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut session = Session::new(args.user.clone(), args.json);

    if let Some(message) = args.command {
        return session.turn(&engine, &message).await;
    }

    run_interactive(&engine, &complaints, &mut session).await
}

fn build_engine(
    args: &Args,
    cfg: &CliConfig,
    complaints: Arc<LocalComplaints>,
) -> anyhow::Result<ConversationEngine> {
    let provider = cfg.provider_config(args.provider.as_deref(), args.model.as_deref())?;
    let model = aula_ai::create_provider(&provider).with_context(|| {
        match provider.provider.api_key_env_var() {
            Some(var) => format!(
                "No API key for {}. Set {} or run: aula --init-config",
                provider.provider.name(),
                var
            ),
            None => format!("Cannot configure provider {}", provider.provider.name()),
        }
    })?;

    let corpus = args
        .corpus
        .clone()
        .or_else(|| cfg.corpus.as_ref().map(PathBuf::from));
    let documents = match corpus {
        Some(path) => LocalDocuments::from_file(&path)
            .with_context(|| format!("Failed to load corpus {}", path.display()))?,
        None => LocalDocuments::sample(),
    };
    if documents.is_empty() {
        eprintln!("Warning: document corpus is empty; questions will go unanswered");
    }
    tracing::info!(documents = documents.len(), "Document corpus ready");

    let mut engine_config: EngineConfig = cfg.engine.clone();
    if args.sequential {
        engine_config.execution_mode = ExecutionMode::Sequential;
    }

    let engine =
        ConversationEngine::from_services(Arc::new(documents), complaints, model, engine_config)?;
    Ok(engine)
}

/// Per-process conversation: one session id plus the running history
struct Session {
    context: ConversationContext,
    json: bool,
}

impl Session {
    fn new(user_id: String, json: bool) -> Self {
        Self {
            context: ConversationContext::new(user_id)
                .with_session(uuid::Uuid::new_v4().to_string()),
            json,
        }
    }

    /// Process one message; Ctrl-C cancels the in-flight turn
    async fn turn(&mut self, engine: &ConversationEngine, message: &str) -> anyhow::Result<()> {
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let response = engine
            .process_with_cancel(message, &self.context, &cancel)
            .await;
        watcher.abort();

        self.print(&response)?;
        self.context.history.push(ChatTurn::user(message));
        self.context
            .history
            .push(ChatTurn::assistant(response.response_text));
        Ok(())
    }

    fn print(&self, response: &ConversationResponse) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(response)?);
            return Ok(());
        }
        println!("{}", response.response_text);
        if !response.suggested_actions.is_empty() {
            println!();
            for action in &response.suggested_actions {
                println!("  • {}", action);
            }
        }
        println!(
            "\n[{:?} | confidence {:.2}{}]",
            response.query_type,
            response.confidence_score,
            if response.requires_followup {
                " | needs follow-up"
            } else {
                ""
            }
        );
        Ok(())
    }
}

async fn run_interactive(
    engine: &ConversationEngine,
    complaints: &LocalComplaints,
    session: &mut Session,
) -> anyhow::Result<()> {
    use std::io::{self, Write};

    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!(
            "aula ({} mode) - /health, /info, /complaints, /reset, /quit",
            engine.execution_mode().as_str()
        );
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/health" => {
                let report = engine.health_check().await;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            "/info" => {
                println!("{}", serde_json::to_string_pretty(&engine.workflow_info())?);
            }
            "/complaints" => {
                let records = complaints.records();
                if records.is_empty() {
                    println!("No complaints filed this session.");
                }
                for record in records {
                    println!(
                        "#{} [{}] {}",
                        record.short_id(),
                        record.category.as_str(),
                        record.title
                    );
                }
            }
            "/reset" => {
                session.context.history.clear();
                println!("History cleared.");
            }
            message => session.turn(engine, message).await?,
        }
        println!();
    }

    Ok(())
}
