use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod formatters;

#[derive(Parser)]
#[command(name = "marketsnap")]
#[command(version, about = "Multi-asset market snapshot with period returns")]
#[command(
    long_about = "Fetch daily closes for a configurable universe of indices, rates, commodities and crypto, and show 1D/1W/1M/1Y/QTD/YTD returns as a terminal heatmap or CSV/JSON export."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Path to a TOML config file
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the return heatmap (default)
    Show {
        /// Compute as of this date (YYYY-MM-DD) instead of today
        #[arg(long)]
        as_of: Option<String>,

        /// Ignore the cached snapshot and refetch everything
        #[arg(long)]
        refresh: bool,
    },

    /// Write the snapshot to CSV and/or JSON files
    Export {
        /// Compute as of this date (YYYY-MM-DD) instead of today
        #[arg(long)]
        as_of: Option<String>,

        /// Ignore the cached snapshot and refetch everything
        #[arg(long)]
        refresh: bool,

        /// CSV output path (default: <output_dir>/market_snapshot_YYYYMMDD.csv)
        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,

        /// Also write the full report as JSON
        #[arg(long = "json-out", value_name = "PATH")]
        json_out: Option<PathBuf>,
    },

    /// Show the reference date used for each period
    Anchors {
        /// Anchor date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        as_of: Option<String>,
    },

    /// List the configured instrument universe
    Instruments,

    /// Snapshot cache management
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Delete the cached snapshot
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "marketsnap",
            "export",
            "--as-of",
            "2024-01-03",
            "--csv",
            "out.csv",
            "--no-color",
        ])
        .unwrap();
        assert!(cli.no_color);
        match cli.command {
            Some(Commands::Export { as_of, csv, .. }) => {
                assert_eq!(as_of.as_deref(), Some("2024-01-03"));
                assert_eq!(csv, Some(PathBuf::from("out.csv")));
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn test_no_subcommand_is_allowed() {
        let cli = Cli::try_parse_from(["marketsnap", "--json"]).unwrap();
        assert!(cli.json);
        assert!(cli.command.is_none());
    }
}
