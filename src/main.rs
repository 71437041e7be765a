use clap::{Parser, Subcommand};
use docqa::Result;
use docqa::commands::{ask_question, chat, index_documents, query_documents, show_status};
use docqa::config::{DEFAULT_BASE_DIR, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Question answering over a folder of PDF, TXT and DOCX documents")]
#[command(version)]
struct Cli {
    /// Knowledge base directory holding config.toml, documents/ and the index
    #[arg(long, global = true, default_value = DEFAULT_BASE_DIR)]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding and generation services
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Build the document index, reusing a persisted one when present
    Index {
        /// Ignore the persisted index and rebuild from the documents folder
        #[arg(long)]
        rebuild: bool,
    },
    /// Show the documents retrieved for a query
    Query {
        /// Query text
        text: String,
        /// Number of documents to retrieve
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Answer a question from the indexed documents
    Ask {
        /// Question text
        question: String,
        /// Number of documents to use as context
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Ask questions interactively
    Chat,
    /// Show the state of the documents folder, index and services
    Status,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let base_dir = cli.base_dir.as_path();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(base_dir)?;
            } else {
                run_interactive_config(base_dir)?;
            }
        }
        Commands::Index { rebuild } => {
            index_documents(base_dir, rebuild)?;
        }
        Commands::Query { text, top_k } => {
            query_documents(base_dir, &text, top_k)?;
        }
        Commands::Ask { question, top_k } => {
            ask_question(base_dir, &question, top_k)?;
        }
        Commands::Chat => {
            chat(base_dir)?;
        }
        Commands::Status => {
            show_status(base_dir)?;
        }
    }

    Ok(())
}
