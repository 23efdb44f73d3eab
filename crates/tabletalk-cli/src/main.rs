//! Tabletalk CLI
//!
//! Three entry points into the system: load the raw datasets, ask a
//! one-shot question, or serve the HTTP gateway.
//!
//! # Usage
//! ```bash
//! tabletalk load [--data-dir data/raw]
//! tabletalk ask "total amount per sector"
//! tabletalk serve [--port 8000] [--host 127.0.0.1]
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use tabletalk_core::{Engine, EngineConfig, LlmModel, OpenRouterClient};
use tabletalk_gateway::{Gateway, GatewayConfig};
use tabletalk_sandbox::ProgramSandbox;
use tabletalk_store::SqliteStore;

/// Tabletalk - natural-language questions over tabular data
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the raw CSV datasets into SQLite
    Load {
        /// Directory holding the raw CSV exports
        #[arg(long, default_value = "data/raw")]
        data_dir: String,
    },

    /// Ask a single question and print the result envelope
    Ask {
        /// The question
        question: String,
    },

    /// Serve the HTTP chat endpoint
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_target(false)
            .init();
    }

    let config = EngineConfig::from_env();

    match args.command {
        Command::Load { data_dir } => {
            let report = tabletalk_store::load_dir(data_dir.as_ref(), &config.db_path)
                .context("dataset load failed")?;
            for (table, rows) in &report.tables {
                println!("loaded {rows} rows into '{table}'");
            }
            Ok(())
        }

        Command::Ask { question } => {
            let engine = build_engine(&config)?;
            let envelope = engine.process(&question).await;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }

        Command::Serve { host, port } => {
            let engine = Arc::new(build_engine(&config)?);
            let gateway_config = GatewayConfig::default().with_host(host).with_port(port);
            let gateway = Gateway::new(gateway_config, engine);
            gateway.start().await.context("gateway stopped")?;
            Ok(())
        }
    }
}

/// Wire the engine from configuration: one shared model client, a
/// store over the configured database, and the chart sandbox.
fn build_engine(config: &EngineConfig) -> Result<Engine> {
    if config.api_key.is_empty() {
        anyhow::bail!("OPENROUTER_API_KEY is not set");
    }

    let llm = Arc::new(OpenRouterClient::new(
        config.api_key.clone(),
        LlmModel::Custom(config.model.clone()),
    ));
    let store = Arc::new(SqliteStore::new(&config.db_path));
    let sandbox = Arc::new(ProgramSandbox::new().with_timeout_ms(config.sandbox_timeout_ms));

    Ok(Engine::new(llm, store, sandbox).with_sample_rows(config.sample_rows))
}
