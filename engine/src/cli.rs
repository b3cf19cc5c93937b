//! CLI interface for Shipwright
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Shipwright project delivery orchestrator
///
/// Plans website and automation projects from templates and runs the plan
/// through simulated execution, review and validation.
#[derive(Parser, Debug)]
#[command(name = "shipwright")]
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
    /// Show the step template for a project type
    Templates {
        /// Project type (website, automation)
        project_type: String,
    },

    /// Create a project and print its generated plan
    Plan {
        /// Project type (website, automation)
        project_type: String,

        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Create, plan, execute and validate a project
    Run {
        /// Project type (website, automation)
        project_type: String,

        #[command(flatten)]
        project: ProjectArgs,

        /// Steps executed concurrently (overrides config)
        #[arg(long, value_name = "N")]
        parallel: Option<usize>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
pub struct ProjectArgs {
    /// Project name
    #[arg(long)]
    pub name: String,

    /// Project description
    #[arg(long, default_value = "")]
    pub description: String,

    /// Requirement as key=value (repeatable), e.g. --require cms=true
    #[arg(long = "require", value_name = "KEY=VALUE")]
    pub requirements: Vec<String>,
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate,
}
