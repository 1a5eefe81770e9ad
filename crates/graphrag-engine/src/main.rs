//! CLI entry point for the graphrag question answering engine.
//!
//! `ask` reads one question (flag or JSON request on stdin) and writes the
//! JSON response to stdout. `chat` answers questions line by line within a
//! single session. `trace` prints stored run traces. Logs go to stderr.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use graphrag_engine::{load_settings, AskRequest, GraphRagEngine, Settings};
use graphrag_graph::GraphClient;
use graphrag_llm::{OpenAiChatProvider, OpenAiEmbedder};
use graphrag_trace::FileTraceStore;

#[derive(Parser)]
#[command(name = "graphrag")]
#[command(about = "Answer natural-language questions over a Neo4j knowledge graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: graphrag).
    #[arg(short, long, default_value = "graphrag", global = true)]
    config: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Answer one question (reads a JSON request from stdin without --question).
    Ask {
        #[arg(long)]
        question: Option<String>,
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Interactive multi-turn session. `exit` or `quit` ends it.
    Chat {
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Show one stored run trace, or list the runs of a session.
    Trace {
        /// Run id as printed in the logs.
        id: Option<String>,
        #[arg(long, conflicts_with = "id")]
        session_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if cli.log_json {
        fmt().json().with_env_filter(filter).with_writer(std::io::stderr).init();
    } else {
        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    let settings = load_settings(&cli.config)?;

    match cli.command {
        Command::Ask {
            question,
            session_id,
        } => {
            let engine = build_engine(&settings).await?;
            let mut request = match question {
                Some(q) => AskRequest::new(q),
                None => {
                    let input = std::io::read_to_string(std::io::stdin())?;
                    serde_json::from_str(&input)?
                }
            };
            if session_id.is_some() {
                request.session_id = session_id;
            }
            let response = engine.ask(request).await;
            println!("{}", serde_json::to_string(&response)?);
        }
        Command::Chat { session_id } => {
            let engine = build_engine(&settings).await?;
            chat(&engine, session_id).await?;
        }
        Command::Trace { id, session_id } => {
            show_traces(&settings, id.as_deref(), session_id.as_deref())?;
        }
    }

    Ok(())
}

async fn build_engine(settings: &Settings) -> anyhow::Result<GraphRagEngine> {
    let graph = GraphClient::connect(&settings.neo4j).await?;
    let llm = OpenAiChatProvider::new(settings.llm.clone())?;
    let embedder = OpenAiEmbedder::new(settings.embedding.clone())?;
    Ok(GraphRagEngine::new(
        Arc::new(graph),
        Arc::new(llm),
        Arc::new(embedder),
        settings,
    )?)
}

fn show_traces(settings: &Settings, id: Option<&str>, session_id: Option<&str>) -> anyhow::Result<()> {
    let dir = settings
        .trace
        .dir
        .as_deref()
        .context("no trace directory configured (set trace.dir)")?;
    let store = FileTraceStore::open(dir)?;

    match (id, session_id) {
        (Some(id), _) => {
            let trace = store.load(id.parse()?)?;
            println!("{}", serde_json::to_string_pretty(&trace)?);
        }
        (None, Some(session_id)) => {
            for trace in store.for_session(session_id)? {
                println!(
                    "{}  {}  {:<8}  {}",
                    trace.id,
                    trace.started_at.to_rfc3339(),
                    trace.status.as_deref().unwrap_or("-"),
                    trace.question
                );
            }
        }
        (None, None) => anyhow::bail!("pass a run id or --session-id"),
    }
    Ok(())
}

async fn chat(engine: &GraphRagEngine, session_id: Option<String>) -> anyhow::Result<()> {
    let mut session_id = session_id;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if matches!(question, "exit" | "quit") {
            break;
        }
        if !question.is_empty() {
            let mut request = AskRequest::new(question);
            request.session_id = session_id.clone();
            let response = engine.ask(request).await;
            println!("{}", response.answer);
            eprintln!(
                "[{} | confidence {:.2} | {} steps | session {}]",
                response.status, response.confidence, response.steps_taken, response.session_id
            );
            session_id = Some(response.session_id);
        }
        prompt()?;
    }
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    eprint!("> ");
    std::io::stderr().flush()
}
