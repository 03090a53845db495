use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "event-search",
    about = "Index events and search them with a JSON query language"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index events from a JSON-lines file ("-" reads stdin)
    Index(IndexArgs),
    /// Delete an event and all its shows
    Delete {
        /// Identity of the event
        identity: u64,
    },
    /// Free-text search over event names, descriptions and tags
    Search(SearchArgs),
    /// Search with a JSON query, e.g. '{"type":"future events"}'
    Query(QueryArgs),
    /// Run a full JSON search request
    Request(RequestArgs),
    /// Show index statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// JSON-lines file with one event per line
    pub input: PathBuf,
}

impl IndexArgs {
    pub fn reads_stdin(&self) -> bool {
        self.input.as_os_str() == "-"
    }
}

// -- Search --

/// Result window and presentation, shared by the search commands.
#[derive(Debug, Args)]
pub struct PageArgs {
    /// Skip this many results
    #[arg(long, default_value = "0")]
    pub start: usize,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub limit: usize,

    /// Do not compute relevance scores
    #[arg(long)]
    pub no_scoring: bool,

    /// Include the stored event JSON with each result
    #[arg(long)]
    pub payload: bool,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search text
    pub text: String,

    #[command(flatten)]
    pub page: PageArgs,
}

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// The query as JSON
    pub query: String,

    #[command(flatten)]
    pub page: PageArgs,
}

#[derive(Debug, Parser)]
pub struct RequestArgs {
    /// {"query": ..., "scoring": ..., "includePayload": ..., "startIndex":
    /// ..., "limit": ...}
    pub request: String,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "event-search",
            &mut std::io::stdout(),
        );
    }
}
