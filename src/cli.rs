//! CLI definitions for statusdex.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::model::{AccountId, PostId};

/// statusdex - status search with per-viewer visibility and content filters
#[derive(Parser, Debug)]
#[command(name = "statusdex")]
#[command(version = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n  Built: ", env!("VERGEN_BUILD_TIMESTAMP"),
    "\n  Rustc: ", env!("VERGEN_RUSTC_SEMVER"),
    "\n  Target: ", env!("VERGEN_CARGO_TARGET_TRIPLE"),
))]
#[command(about = "Index, search and filter social statuses")]
#[command(long_about = r#"
statusdex indexes social statuses for search and applies per-user content
filters when rendering timelines.

Features:
  - Substring search over CJK and Latin text via n-grams
  - Stemmed whole-word search ("running" finds "run")
  - Results limited to accounts that mentioned, favourited or reblogged a status
  - Keyword filters that hide or drop statuses per timeline

Quick start:
  1. Import an export:  statusdex import export.json
  2. Build the index:   statusdex index
  3. Search:            statusdex search "query" --viewer 42
  4. Filter a timeline: statusdex timeline --viewer 42 --context home
"#)]
pub struct Cli {
    /// Path to the database file
    #[arg(long, env = "STATUSDEX_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Path to the search index directory
    #[arg(long, env = "STATUSDEX_INDEX", global = true)]
    pub index: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Be verbose (repeat for more detail)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a JSON export of posts, edges and filters
    Import(ImportArgs),

    /// Build or update the search index from imported posts
    Index(IndexArgs),

    /// Search statuses visible to a viewer
    Search(SearchArgs),

    /// Apply a viewer's filters to a timeline
    Timeline(TimelineArgs),

    /// Show the normalized form of some text
    Normalize(NormalizeArgs),

    /// Show row and document counts
    Stats,

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Path to the export file
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Delete the existing index and rebuild it
    #[arg(long, short = 'F')]
    pub force: bool,

    /// Posts per batch
    #[arg(long, short = 'b')]
    pub batch_size: Option<usize>,

    /// Number of document builder threads (0 = auto)
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query
    pub query: String,

    /// Account searching
    #[arg(long, short = 'u')]
    pub viewer: AccountId,

    /// Maximum number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Skip first N results (for pagination)
    #[arg(long, default_value = "0")]
    pub offset: usize,
}

#[derive(Args, Debug)]
pub struct TimelineArgs {
    /// Account viewing the timeline
    #[arg(long, short = 'u')]
    pub viewer: AccountId,

    /// UI column: home, notifications, public, thread or list:<id>
    #[arg(long, short = 'c', default_value = "home")]
    pub context: String,

    /// Posts to render (defaults to the most recent ones)
    pub ids: Vec<PostId>,

    /// How many recent posts to render when no ids are given
    #[arg(long, short = 'n', default_value = "20")]
    pub limit: usize,

    /// Include dropped posts in the output
    #[arg(long)]
    pub show_dropped: bool,
}

#[derive(Args, Debug)]
pub struct NormalizeArgs {
    /// Text to normalize
    pub text: String,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Set a configuration value (key=value)
    #[arg(long)]
    pub set: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
}

impl OutputFormat {
    /// Parse the `output.format` config value.
    #[must_use]
    pub fn from_config(value: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(value, true).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_search() {
        let cli = Cli::try_parse_from(["statusdex", "search", "hello", "--viewer", "42", "-n", "5"])
            .unwrap();
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.query, "hello");
                assert_eq!(args.viewer, 42);
                assert_eq!(args.limit, Some(5));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_timeline_ids_and_verbosity() {
        let cli = Cli::try_parse_from([
            "statusdex", "-vv", "timeline", "--viewer", "1", "--context", "list:3", "5", "6",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Timeline(args) => {
                assert_eq!(args.context, "list:3");
                assert_eq!(args.ids, vec![5, 6]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn search_requires_viewer() {
        assert!(Cli::try_parse_from(["statusdex", "search", "hello"]).is_err());
    }

    #[test]
    fn output_format_from_config() {
        assert_eq!(OutputFormat::from_config("json"), Some(OutputFormat::Json));
        assert_eq!(
            OutputFormat::from_config("json-pretty"),
            Some(OutputFormat::JsonPretty)
        );
        assert_eq!(OutputFormat::from_config("xml"), None);
    }
}
