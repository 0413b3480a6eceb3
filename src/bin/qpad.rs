//! querypad CLI.
//!
//! Thin wrapper around the engine: reads a paste from a file or stdin,
//! mints a session id when none is supplied, and prints the trace to stderr
//! and the JSON result to stdout. Session issuance and namespace naming live
//! here, outside the core.

use anyhow::Context;
use clap::Parser;
use querypad::schema::builtin::builtin_registry;
use querypad::schema::SchemaRegistry;
use querypad::{Config, Engine};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Translate a pasted ORM-style statement into SQL and execute it.
#[derive(Parser)]
#[command(name = "qpad")]
#[command(about = "Translate pasted ORM-style calls into SQL and execute them", long_about = None)]
#[command(version)]
struct Cli {
    /// Source file containing the paste (stdin if omitted)
    file: Option<PathBuf>,

    /// Session identifier (a fresh one is minted if omitted)
    #[arg(long, env = "QUERYPAD_SESSION")]
    session: Option<String>,

    /// Schema registry YAML (builtin demo models if omitted)
    #[arg(long, env = "QUERYPAD_SCHEMA_PATH")]
    schema: Option<PathBuf>,

    /// Postgres connection string
    #[arg(long, env = "QUERYPAD_DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    let schema_path = cli.schema.or_else(|| config.schema_path.clone());
    let registry = match &schema_path {
        Some(path) => SchemaRegistry::from_yaml_file(path)
            .with_context(|| format!("loading schema registry from {}", path.display()))?,
        None => builtin_registry(),
    };

    let source = match &cli.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading paste from {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading paste from stdin")?;
            buf
        }
    };

    let session = cli
        .session
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    let engine = Engine::new(config, registry)?;
    engine.start_sweeper();

    let outcome = engine.translate_and_execute(&session, &source).await;
    for line in &outcome.trace {
        eprintln!("{line}");
    }

    if outcome.success {
        let result = outcome.result.unwrap_or(serde_json::Value::Null);
        println!("{}", serde_json::to_string_pretty(&result)?);
        Ok(())
    } else {
        eprintln!("error: {}", outcome.error.unwrap_or_default());
        std::process::exit(1);
    }
}
