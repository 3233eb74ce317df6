use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rollcall", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging for rollcall crates (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the telemetry listener and period monitor (default)
    Serve,

    /// Generate sample configuration
    ConfigSample {
        /// Output path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the period the timetable gives for the current time
    Status,

    /// List recorded attendance history
    History {
        /// Only rows for this date (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Only rows for this period label
        #[arg(short, long)]
        label: Option<String>,

        /// Maximum number of rows
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_history_args() {
        let cli = Cli::parse_from([
            "rollcall",
            "history",
            "--date",
            "2026-03-02",
            "--label",
            "Math",
            "-n",
            "5",
            "--json",
            "-c",
            "school.yaml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("school.yaml")));
        match cli.command {
            Some(Commands::History {
                date,
                label,
                limit,
                json,
            }) => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 2));
                assert_eq!(label.as_deref(), Some("Math"));
                assert_eq!(limit, Some(5));
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_no_subcommand_defaults_to_none() {
        let cli = Cli::parse_from(["rollcall", "--verbose"]);
        assert!(cli.command.is_none());
        assert!(cli.verbose);
    }
}
