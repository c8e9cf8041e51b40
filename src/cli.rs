//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Export open repository records for long-term preservation.
///
/// Records whose first file was attached within the date range are exported
/// as PDFs into the configured directory, indexed by `metadata.csv`. Runs are
/// resumable: records already in the CSV are skipped.
#[derive(Parser, Debug)]
#[command(name = "libsafe-export")]
#[command(author, version, about)]
pub struct Args {
    /// Earliest file attachment date to include (YYYY-MM-DD, inclusive)
    #[arg(short = 's', long = "start", visible_alias = "from-date", value_name = "DATE")]
    pub start: Option<String>,

    /// Latest file attachment date to include (YYYY-MM-DD, inclusive)
    #[arg(short = 'e', long = "end", value_name = "DATE")]
    pub end: Option<String>,

    /// Stop after this many records are exported (0 for no limit)
    #[arg(short = 'n', long = "number", default_value_t = 0, value_name = "COUNT")]
    pub number: usize,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Also append logs to this file (overrides EXPORT_LOG_FILE)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Load environment variables from this file instead of ./.env
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<PathBuf>,
}

impl Args {
    /// Default log level from the verbosity flags. `RUST_LOG` takes priority.
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["libsafe-export"]).unwrap();
        assert_eq!(args.start, None);
        assert_eq!(args.end, None);
        assert_eq!(args.number, 0);
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(!args.json);
        assert_eq!(args.default_log_level(), "info");
    }

    #[test]
    fn test_cli_date_flags() {
        let args = Args::try_parse_from([
            "libsafe-export",
            "-s",
            "2024-01-01",
            "--end",
            "2024-01-31",
        ])
        .unwrap();
        assert_eq!(args.start.as_deref(), Some("2024-01-01"));
        assert_eq!(args.end.as_deref(), Some("2024-01-31"));
    }

    #[test]
    fn test_cli_from_date_alias() {
        let args = Args::try_parse_from(["libsafe-export", "--from-date", "2024-01-01"]).unwrap();
        assert_eq!(args.start.as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn test_cli_number_flag() {
        let args = Args::try_parse_from(["libsafe-export", "-n", "25"]).unwrap();
        assert_eq!(args.number, 25);

        let result = Args::try_parse_from(["libsafe-export", "--number", "-1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["libsafe-export", "-v"]).unwrap();
        assert_eq!(args.default_log_level(), "debug");

        let args = Args::try_parse_from(["libsafe-export", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.default_log_level(), "trace");
    }

    #[test]
    fn test_cli_quiet_wins_over_verbose() {
        let args = Args::try_parse_from(["libsafe-export", "-q", "-v"]).unwrap();
        assert_eq!(args.default_log_level(), "error");
    }

    #[test]
    fn test_cli_file_options() {
        let args = Args::try_parse_from([
            "libsafe-export",
            "--json",
            "--log-file",
            "/var/log/export.log",
            "--env-file",
            "prod.env",
        ])
        .unwrap();
        assert!(args.json);
        assert_eq!(args.log_file, Some(PathBuf::from("/var/log/export.log")));
        assert_eq!(args.env_file, Some(PathBuf::from("prod.env")));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["libsafe-export", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["libsafe-export", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
