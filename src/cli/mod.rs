//! CLI command definitions for todo-board
//!
//! The main entry point is the `Cli` struct; the web server runs when no
//! subcommand is given.

pub mod tasks;

use clap::{Parser, Subcommand};
use tasks::TasksArgs;

/// Todo board server and CLI tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the web server (default if no subcommand given)
    Serve {
        /// Port for the web surface (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Write the default reference collections (labels, priorities, ...)
    Seed,

    /// Sign in as the configured identity and list tasks one page at a time
    Tasks(TasksArgs),

    /// Show or toggle the light/dark preference
    Theme {
        /// Flip the stored preference
        #[arg(long)]
        toggle: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_no_subcommand() {
        let cli = Cli::parse_from(["todo-board"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log, "2");
        assert!(!cli.verbose);
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::parse_from(["todo-board", "serve", "--port", "8080", "-d", "x.db"]);
        assert_eq!(cli.database.as_deref(), Some("x.db"));
        match cli.command {
            Some(Command::Serve { port }) => assert_eq!(port, Some(8080)),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
