//! Command-line interface for safewatch.
//!
//! This module provides the CLI structure for the `safewatch` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, ConsentCommand, ContactsCommand, IncidentCommand, StatusCommand, TokenArg,
};

/// safewatch - Personal-safety incident tracking
///
/// Records consent, tracks incident locations, alerts emergency contacts on
/// the first location update and produces ordered incident reports.
#[derive(Debug, Parser)]
#[command(name = "safewatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record consent and obtain a token
    #[command(subcommand)]
    Consent(ConsentCommand),

    /// Start, update, stop and report incidents
    #[command(subcommand)]
    Incident(IncidentCommand),

    /// Manage emergency contacts
    #[command(subcommand)]
    Contacts(ContactsCommand),

    /// Show database status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.verbose, self.quiet)
    }
}
