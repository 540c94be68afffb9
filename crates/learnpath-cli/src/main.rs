//! learnpath CLI — an interactive, LLM-driven tutor in the terminal.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "learnpath",
    version,
    about = "Personalized learning plans and quizzes from an LLM tutor"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive tutoring session
    Start {
        /// Topic to learn (asked interactively if omitted)
        #[arg(long)]
        topic: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Provider to use instead of `default_provider`
        #[arg(long)]
        provider: Option<String>,

        /// Model to use instead of `default_model`
        #[arg(long)]
        model: Option<String>,

        /// Print a JSON snapshot of the session after every step
        #[arg(long)]
        json: bool,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate the config and print the resolved settings
    CheckConfig {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter learnpath.toml
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("learnpath=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start {
            topic,
            config,
            provider,
            model,
            json,
        } => commands::start::execute(topic, config, provider, model, json).await,
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config).await
        }
        Commands::CheckConfig { config } => commands::check_config::execute(config),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
