//! SIMAP CLI, the main entry point.
//!
//! Commands:
//! - `serve`            Start the HTTP server
//! - `ask`              Run one question through the pipeline and print the JSON response
//! - `prompt activate`  Store a system prompt and make it the active one
//! - `doctor`           Check configuration, database and vector store

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod services;

#[derive(Parser)]
#[command(
    name = "simap",
    about = "Asistente de consultas SIMAP para agencias PAMI",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ./simap.toml)
    #[arg(short, long, global = true, env = "SIMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Override the listen host
        #[arg(long)]
        host: Option<String>,

        /// Override the listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Answer one question and print the JSON response
    Ask {
        question: String,

        #[arg(long)]
        user_id: Option<i64>,

        #[arg(long)]
        unit: Option<String>,
    },

    /// Manage system prompts
    Prompt {
        #[command(subcommand)]
        action: PromptAction,
    },

    /// Diagnose configuration and dependencies
    Doctor {
        /// Create the database tables if they are missing
        #[arg(long)]
        init_db: bool,
    },
}

#[derive(Subcommand)]
enum PromptAction {
    /// Insert a prompt from a file and make it the only active one
    Activate {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        name: String,

        #[arg(long = "version", id = "prompt_version")]
        prompt_version: String,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Serve { host, port } => commands::serve::run(config, host, port).await?,
        Commands::Ask {
            question,
            user_id,
            unit,
        } => commands::ask::run(config, question, user_id, unit).await?,
        Commands::Prompt {
            action:
                PromptAction::Activate {
                    file,
                    name,
                    prompt_version,
                },
        } => commands::prompt::activate(config, &file, &name, &prompt_version).await?,
        Commands::Doctor { init_db } => commands::doctor::run(config, init_db).await?,
    }

    Ok(())
}
