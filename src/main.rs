use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use evidence_annotator::{
    config::{Config, LogFormat},
    server::{AppState, McpServer},
    store::SheetsClient,
};

#[derive(Debug, Parser)]
#[command(name = "evidence-annotator", version, about = "Claim verification study server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve MCP requests on stdin/stdout (default)
    Serve,
    /// Open every worksheet, load both tables and report what was found
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Evidence annotator starting..."
    );

    let client = match SheetsClient::new(&config.sheets, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %c.base_url(), "Sheets client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Sheets client");
            return Err(e.into());
        }
    };

    let state = match AppState::connect(config, Arc::new(client)).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "Failed to open study workbook");
            return Err(e.into());
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await,
        Command::Check => check(&state).await,
    }
}

async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let server = McpServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn check(state: &AppState) -> anyhow::Result<()> {
    let summary = state.flow.catalog().load().await?;

    println!(
        "{}: {} examples ({} skipped), {} assignments",
        state.config.tables.spreadsheet,
        summary.examples,
        summary.skipped_examples,
        summary.assignments
    );
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
