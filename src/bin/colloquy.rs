//! Colloquy CLI
//!
//! Command-line interface for document ingestion, retrieval queries, and
//! tool-server operations. Prints one JSON value per invocation so shell
//! pipelines and the web layer's scripts can consume it directly.

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use colloquy_lib::{
    Config, default_config_path,
    ChromaStore, OllamaEmbedder, Retriever,
    ToolClient,
};

#[derive(Parser)]
#[command(name = "colloquy")]
#[command(about = "Colloquy CLI - retrieval and tool operations for the chat assistant", long_about = None)]
struct Cli {
    /// Config file path (default: ~/.colloquy/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a document into the vector store
    Ingest {
        /// Path to the document file
        path: PathBuf,
        /// Document id (default: a fresh ULID)
        #[arg(long)]
        doc_id: Option<String>,
    },
    /// Retrieve the chunks that best answer a query
    Query {
        /// Query text
        text: String,
    },
    /// Tool-server commands
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
    /// Check backend availability
    Status,
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List the tools the configured server exposes
    List,
    /// Invoke a tool by name
    Call {
        /// Tool name
        name: String,
        /// JSON arguments object (default: {})
        #[arg(long, default_value = "{}")]
        arguments: String,
    },
}

// ============ Output Types ============

#[derive(Serialize)]
struct StatusOutput {
    chroma: String,
    heartbeat: Option<i64>,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

// ============ Main ============

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            fail(&format!("config: {}", e));
            return;
        }
    };

    let result = match cli.command {
        Commands::Ingest { path, doc_id } => handle_ingest(&config, path, doc_id).await,
        Commands::Query { text } => handle_query(&config, &text).await,
        Commands::Tools { action } => handle_tools(&config, action).await,
        Commands::Status => handle_status(&config).await,
    };

    match result {
        Ok(json) => println!("{}", json),
        Err(e) => fail(&e.to_string()),
    }
}

fn fail(message: &str) {
    let error = ErrorOutput {
        error: message.to_string(),
    };
    println!(
        "{}",
        serde_json::to_string(&error).unwrap_or_else(|_| r#"{"error":"unknown"}"#.to_string())
    );
    std::process::exit(1);
}

fn build_retriever(config: &Config) -> Retriever {
    let embedder = Arc::new(OllamaEmbedder::new(
        &config.embedding.base_url,
        &config.embedding.model,
    ));
    let store = Arc::new(ChromaStore::new(&config.chroma.base_url));
    Retriever::new(embedder, store, config.retrieval.clone())
}

// ============ Handlers ============

async fn handle_ingest(
    config: &Config,
    path: PathBuf,
    doc_id: Option<String>,
) -> anyhow::Result<String> {
    let retriever = build_retriever(config);

    let summary = match doc_id {
        Some(id) => {
            let text = std::fs::read_to_string(&path)?;
            retriever.ingest(&id, &text).await?
        }
        None => retriever.ingest_file(&path).await?,
    };

    Ok(serde_json::to_string(&summary)?)
}

async fn handle_query(config: &Config, text: &str) -> anyhow::Result<String> {
    let retriever = build_retriever(config);
    let chunks = retriever.retrieve(text).await?;
    Ok(serde_json::to_string(&chunks)?)
}

async fn handle_tools(config: &Config, action: ToolsAction) -> anyhow::Result<String> {
    let command = config
        .tool_server
        .command
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no tool server configured (toolServer.command)"))?;

    let client = ToolClient::new();
    client
        .start(
            &command,
            &config.tool_server.args,
            config.tool_server.working_dir.as_deref(),
        )
        .await?;

    let result = match action {
        ToolsAction::List => {
            let tools = client.list_tools().await?;
            serde_json::to_string(&tools)?
        }
        ToolsAction::Call { name, arguments } => {
            let arguments: Value = serde_json::from_str(&arguments)?;
            let result = client.invoke_tool(&name, arguments).await?;
            serde_json::to_string(&result)?
        }
    };

    client.stop().await;
    Ok(result)
}

async fn handle_status(config: &Config) -> anyhow::Result<String> {
    let store = ChromaStore::new(&config.chroma.base_url);
    let output = match store.heartbeat().await {
        Ok(heartbeat) => StatusOutput {
            chroma: "ok".to_string(),
            heartbeat: Some(heartbeat),
        },
        Err(_) => StatusOutput {
            chroma: "unavailable".to_string(),
            heartbeat: None,
        },
    };
    Ok(serde_json::to_string(&output)?)
}
