use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "sift",
    version,
    about = "Question answering over a chunked document"
)]
pub struct Cli {
    /// Configuration file (falls back to $SIFT_CONFIG, then config/default.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Aggregate chunks into semantic groups and print the group map as JSON
    Index(IndexArgs),
    /// Answer a question about the chunked document
    Ask(AskArgs),
}

#[derive(Debug, clap::Args)]
pub struct CorpusArgs {
    /// JSON array of chunk strings or `{"id", "text"}` objects
    #[arg(long)]
    pub chunks: PathBuf,

    /// Enrich groups with regex heuristics only, without calling the model
    #[arg(long)]
    pub no_summarize: bool,
}

#[derive(Debug, clap::Args)]
pub struct IndexArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,
}

#[derive(Debug, clap::Args)]
pub struct AskArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Retrieval strategy
    #[arg(long, value_enum, default_value_t = Mode::React)]
    pub mode: Mode,

    /// Print the full outcome as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Stream session events to stderr as JSON lines
    #[arg(long)]
    pub events: bool,

    /// The question
    pub question: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Iterative tool-calling loop that ends with an answer
    React,
    /// Multi-round planner that assembles answer context
    Multihop,
}
