//! CLI interface for the screener
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Abstract screener
///
/// Assigns submitted abstracts to reviewers, gates scoring behind conflict
/// of interest screening, and records scores and comments.
#[derive(Parser, Debug)]
#[command(name = "screener")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database and schema
    Init,

    /// Load documents and reviewers from a JSON catalog
    Import {
        /// Catalog file
        file: PathBuf,
    },

    /// Start an interactive review session
    Review {
        /// Registered reviewer name
        #[arg(short, long)]
        reviewer: String,
    },

    /// Show a reviewer's COI and review progress
    Status {
        /// Registered reviewer name
        #[arg(short, long)]
        reviewer: String,
    },

    /// Administrative commands
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

/// Admin actions
#[derive(Subcommand, Debug)]
pub enum AdminAction {
    /// List submitted responses
    Responses {
        /// Only this reviewer's responses, in screening order
        #[arg(short, long)]
        reviewer: Option<String>,
    },

    /// Show per-reviewer completion
    Progress,

    /// Delete every COI decision and response
    Reset {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Delete one reviewer's responses so they can start over
    RefreshUser {
        /// Registered reviewer name
        #[arg(short, long)]
        reviewer: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["screener", "init"]);
        assert!(matches!(cli.command, Command::Init));
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from([
            "screener",
            "--json",
            "--log",
            "debug",
            "status",
            "--reviewer",
            "Dr. A",
        ]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
        if let Command::Status { reviewer } = cli.command {
            assert_eq!(reviewer, "Dr. A");
        } else {
            panic!("Expected Status command");
        }
    }

    #[test]
    fn test_import_command() {
        let cli = Cli::parse_from(["screener", "import", "catalog.json"]);
        if let Command::Import { file } = cli.command {
            assert_eq!(file, PathBuf::from("catalog.json"));
        } else {
            panic!("Expected Import command");
        }
    }

    #[test]
    fn test_admin_responses_optional_reviewer() {
        let cli = Cli::parse_from(["screener", "admin", "responses"]);
        assert!(matches!(
            cli.command,
            Command::Admin {
                action: AdminAction::Responses { reviewer: None }
            }
        ));

        let cli = Cli::parse_from(["screener", "admin", "responses", "-r", "Dr. B"]);
        if let Command::Admin {
            action: AdminAction::Responses { reviewer },
        } = cli.command
        {
            assert_eq!(reviewer.as_deref(), Some("Dr. B"));
        } else {
            panic!("Expected Admin Responses command");
        }
    }

    #[test]
    fn test_admin_reset_requires_flag_to_confirm() {
        let cli = Cli::parse_from(["screener", "admin", "reset"]);
        assert!(matches!(
            cli.command,
            Command::Admin {
                action: AdminAction::Reset { yes: false }
            }
        ));
    }

    #[test]
    fn test_admin_refresh_user() {
        let cli = Cli::parse_from(["screener", "admin", "refresh-user", "--reviewer", "Dr. C"]);
        if let Command::Admin {
            action: AdminAction::RefreshUser { reviewer },
        } = cli.command
        {
            assert_eq!(reviewer, "Dr. C");
        } else {
            panic!("Expected Admin RefreshUser command");
        }
    }

    #[test]
    fn test_review_requires_reviewer() {
        assert!(Cli::try_parse_from(["screener", "review"]).is_err());
    }
}
