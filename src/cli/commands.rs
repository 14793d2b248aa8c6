//! CLI command definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(name = "drugrag")]
#[command(about = "Discharge medication recommendation over a medical knowledge graph")]
#[command(version)]
pub struct Cli {
    /// Enable verbose debug logging (default: info level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: config.toml, then config.example.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Recommend medications for every case of a JSONL file
    Batch {
        /// Input JSONL file (default: [batch] input)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Output JSON file (default: [batch] output)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Recommend medications for one case description
    Ask {
        /// Case text
        text: String,
    },
    /// Show the knowledge retrieved for a text
    Retrieve {
        /// Query text
        text: String,
        /// Number of snippets (default: [retrieval] top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Restrict a raw JSON array of names to the candidate list
    Filter {
        /// Raw model output, e.g. '["阿司匹林","布洛芬"]'
        raw: String,
    },
    /// Write missing node embeddings into the graph
    Embed,
    /// Show knowledge graph statistics
    Diagnose,
    /// Show current configuration
    Config,
}
