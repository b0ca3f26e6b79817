//! CLI interface for Scout
//!
//! Command-line interface built with clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::orchestrator::Workflow;

/// Scout sales-research agent
///
/// Lets a reasoning engine research a company, find its decision makers,
/// score the opportunity and draft outreach, within an iteration and spend
/// budget.
#[derive(Parser, Debug)]
#[command(name = "scout")]
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

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Research a company now
    Run {
        /// Company web domain, e.g. acme.com
        #[arg(long)]
        domain: String,

        /// Known company name
        #[arg(long)]
        name: Option<String>,

        /// Which part of the pipeline to run (full, research, contacts)
        #[arg(long, default_value = "full")]
        workflow: Workflow,

        /// Role to target; repeat for several
        #[arg(long = "role", value_name = "ROLE")]
        roles: Vec<String>,

        /// Override the configured iteration cap
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Override the configured spend ceiling
        #[arg(long)]
        budget: Option<f64>,

        /// Extra instructions for the agent
        #[arg(long)]
        notes: Option<String>,

        /// Run invocations of a turn concurrently
        #[arg(long)]
        concurrent: bool,
    },

    /// List saved opportunities
    Opportunities {
        /// Number of opportunities to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show run history
    History {
        /// Number of runs to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show every step of a past run
    Replay {
        /// Run ID to replay
        run_id: String,
    },

    /// Print the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["scout", "--json", "--log", "debug", "config"]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
        assert!(matches!(cli.command, Command::Config));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from([
            "scout",
            "run",
            "--domain",
            "acme.com",
            "--workflow",
            "contacts",
            "--role",
            "CTO",
            "--role",
            "VP Sales",
            "--budget",
            "0.5",
        ]);
        if let Command::Run {
            domain,
            workflow,
            roles,
            budget,
            max_iterations,
            ..
        } = cli.command
        {
            assert_eq!(domain, "acme.com");
            assert_eq!(workflow, Workflow::Contacts);
            assert_eq!(roles, vec!["CTO", "VP Sales"]);
            assert_eq!(budget, Some(0.5));
            assert!(max_iterations.is_none());
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_bad_workflow_rejected() {
        assert!(Cli::try_parse_from(["scout", "run", "--domain", "a.com", "--workflow", "x"]).is_err());
    }

    #[test]
    fn test_history_command() {
        let cli = Cli::parse_from(["scout", "history", "--limit", "20"]);
        if let Command::History { limit } = cli.command {
            assert_eq!(limit, 20);
        } else {
            panic!("Expected History command");
        }
    }
}
