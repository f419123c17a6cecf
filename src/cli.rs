//! CLI definitions for modhost.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// modhost CLI.
#[derive(Parser)]
#[command(name = "modhost")]
#[command(about = "Module host with dependency-ordered lifecycle and a tick scheduler")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/modhost.toml", global = true)]
    pub config: PathBuf,

    /// Module discovery directory (overrides the configuration)
    #[arg(short, long, global = true, env = "MODHOST_MODULES")]
    pub modules: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Load and enable modules, then run until Ctrl-C (default)
    Run,

    /// List discovered modules and their activation order
    Modules {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::try_parse_from(["modhost"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config/modhost.toml"));
    }

    #[test]
    fn test_modules_command() {
        let cli = Cli::try_parse_from(["modhost", "modules", "--format", "json", "-m", "/tmp/mods"])
            .unwrap();
        assert_eq!(cli.modules, Some(PathBuf::from("/tmp/mods")));
        match cli.command {
            Some(Commands::Modules { format }) => assert_eq!(format, "json"),
            _ => panic!("expected modules command"),
        }
    }
}
