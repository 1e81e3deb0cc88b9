//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stravajson_api::{DEFAULT_MAX_PAGES, DEFAULT_PER_PAGE, MAX_PER_PAGE};

/// stravajson - download your Strava activities as JSON
#[derive(Debug, Parser)]
#[command(name = "stravajson")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Save the Strava client id/secret and write a minimal .env
    Init(InitArgs),

    /// Fetch activities
    Fetch(FetchArgs),
}

/// Arguments for `init`.
#[derive(Debug, Args)]
pub struct InitArgs {
    /// Strava client id (prompted for when omitted)
    #[arg(long)]
    pub client_id: Option<String>,

    /// Where to write the environment file
    #[arg(long, default_value = ".env")]
    pub env_file: PathBuf,
}

/// Arguments for `fetch`.
#[derive(Debug, Args)]
pub struct FetchArgs {
    // --- Time window (choose date OR epoch) ---
    /// Start date (YYYY-MM-DD, local)
    #[arg(long, help_heading = "Time window")]
    pub after: Option<String>,

    /// End date (YYYY-MM-DD, local, exclusive of the following day)
    #[arg(long, help_heading = "Time window")]
    pub before: Option<String>,

    /// Start epoch seconds (UTC)
    #[arg(long, help_heading = "Time window", allow_negative_numbers = true)]
    pub after_epoch: Option<i64>,

    /// End epoch seconds (UTC)
    #[arg(long, help_heading = "Time window", allow_negative_numbers = true)]
    pub before_epoch: Option<i64>,

    // --- Paging ---
    /// Items per page
    #[arg(
        long,
        default_value_t = DEFAULT_PER_PAGE,
        value_parser = clap::value_parser!(u32).range(1..=MAX_PER_PAGE as i64)
    )]
    pub per_page: u32,

    /// Max pages to fetch
    #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
    pub max_pages: u32,

    // --- Filter ---
    /// Filter to type == Run (default)
    #[arg(long, overrides_with = "all_types")]
    pub only_runs: bool,

    /// Include all activity types
    #[arg(long, overrides_with = "only_runs")]
    pub all_types: bool,

    // --- Output ---
    /// Output JSON file path [default: data/activities_<timestamp>.json]
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Merge into --out, deduplicating by activity id
    #[arg(long)]
    pub append: bool,
}

impl FetchArgs {
    /// Whether only runs are kept; `--all-types` turns the filter off.
    pub fn only_runs(&self) -> bool {
        !self.all_types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch(args: &[&str]) -> FetchArgs {
        let mut argv = vec!["stravajson", "fetch"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Fetch(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn fetch_defaults() {
        let args = fetch(&["--after", "2024-01-01"]);
        assert_eq!(args.after.as_deref(), Some("2024-01-01"));
        assert_eq!(args.per_page, 200);
        assert_eq!(args.max_pages, 10);
        assert!(args.only_runs());
        assert!(!args.append);
        assert_eq!(args.out, None);
    }

    #[test]
    fn last_type_flag_wins() {
        assert!(!fetch(&["--all-types"]).only_runs());
        assert!(fetch(&["--all-types", "--only-runs"]).only_runs());
        assert!(!fetch(&["--only-runs", "--all-types"]).only_runs());
    }

    #[test]
    fn per_page_is_bounded() {
        let argv = ["stravajson", "fetch", "--per-page", "201"];
        assert!(Cli::try_parse_from(argv).is_err());
        let argv = ["stravajson", "fetch", "--per-page", "0"];
        assert!(Cli::try_parse_from(argv).is_err());
        assert_eq!(fetch(&["--per-page", "50"]).per_page, 50);
    }

    #[test]
    fn verbose_after_subcommand() {
        let cli = Cli::try_parse_from(["stravajson", "fetch", "--after-epoch", "0", "-v"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn init_arguments() {
        let cli = Cli::try_parse_from(["stravajson", "init", "--client-id", "42"]).unwrap();
        match cli.command {
            Command::Init(args) => {
                assert_eq!(args.client_id.as_deref(), Some("42"));
                assert_eq!(args.env_file, PathBuf::from(".env"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
