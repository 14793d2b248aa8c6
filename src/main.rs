use clap::Parser;
use drugrag::cli::handlers;
use drugrag::cli::Cli;
use drugrag::cli::Commands;
use drugrag::config::AppConfig;
use drugrag::Result;
use tracing::info;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    // Initialize logging
    if cli.verbose {
        drugrag::logging::init_logging_with_level("debug")?;
    } else {
        drugrag::logging::init_logging_with_config(&config)?;
    }
    info!("Configuration loaded successfully");

    for warning in config.credential_warnings() {
        warn!("{}", warning);
    }

    match cli.command {
        Commands::Batch { input, output } => {
            handlers::handle_batch_command(&config, input, output).await?;
        }
        Commands::Ask { text } => {
            handlers::handle_ask_command(&config, &text).await?;
        }
        Commands::Retrieve { text, top_k } => {
            handlers::handle_retrieve_command(&config, &text, top_k).await?;
        }
        Commands::Filter { raw } => {
            handlers::handle_filter_command(&config, &raw)?;
        }
        Commands::Embed => {
            handlers::handle_embed_command(&config).await?;
        }
        Commands::Diagnose => {
            handlers::handle_diagnose_command(&config).await?;
        }
        Commands::Config => {
            handlers::handle_config_command(&config)?;
        }
    }

    Ok(())
}
