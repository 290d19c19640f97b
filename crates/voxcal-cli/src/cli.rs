//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// voxcal - talk to your calendar
#[derive(Debug, Parser)]
#[command(name = "voxcal")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "VOXCAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// User the tokens are stored under (overrides `user_id` in config)
    #[arg(long, short, env = "VOXCAL_USER")]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect a Google Calendar account
    Connect {
        /// Reconnect even if a credential is already stored
        #[arg(long, short)]
        force: bool,

        /// Print the consent URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Show the calendar connection status
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List upcoming events
    Events {
        /// Number of days ahead to include
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=90))]
        days: u32,

        /// Maximum number of events to show
        #[arg(long)]
        limit: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Forget the stored calendar credential
    Disconnect,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show configuration file path
    Path,

    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_defaults_to_one_day() {
        let cli = Cli::try_parse_from(["voxcal", "events"]).unwrap();
        match cli.command {
            Command::Events { days, limit, json } => {
                assert_eq!(days, 1);
                assert_eq!(limit, None);
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn events_rejects_zero_days() {
        assert!(Cli::try_parse_from(["voxcal", "events", "--days", "0"]).is_err());
    }

    #[test]
    fn global_flags_before_subcommand() {
        let cli = Cli::try_parse_from(["voxcal", "-v", "--user", "bob", "connect", "--force"]).unwrap();
        assert!(cli.debug);
        assert_eq!(cli.user.as_deref(), Some("bob"));
        assert!(matches!(
            cli.command,
            Command::Connect {
                force: true,
                no_browser: false
            }
        ));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["voxcal"]).is_err());
    }

    #[test]
    fn config_actions() {
        let cli = Cli::try_parse_from(["voxcal", "config", "dump"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Dump
            }
        ));
    }
}
