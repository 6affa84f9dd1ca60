//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Bearer token for authenticated commands.
#[derive(Debug, Clone, Args)]
pub struct TokenArg {
    /// Bearer token from `consent register`
    #[arg(long, env = "SAFEWATCH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

impl TokenArg {
    /// The `Authorization` header value for this token, if one was given.
    #[must_use]
    pub fn authorization(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {t}"))
    }
}

/// Consent commands.
#[derive(Debug, Subcommand)]
pub enum ConsentCommand {
    /// Record consent and print a bearer token
    Register {
        /// User giving consent
        user_id: String,

        /// Consent text (defaults to the standard location-sharing text)
        #[arg(long)]
        text: Option<String>,
    },

    /// List consents recorded for a user
    List {
        /// User to list
        user_id: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Incident commands.
#[derive(Debug, Subcommand)]
pub enum IncidentCommand {
    /// Start (or restart) an incident
    Start {
        /// Incident identifier
        incident_id: String,

        /// Owner of the incident
        #[arg(short, long)]
        user: String,

        #[command(flatten)]
        auth: TokenArg,
    },

    /// Append a location to an incident
    Update {
        /// Incident identifier
        incident_id: String,

        /// Owner whose contacts are alerted on the first update
        #[arg(short, long)]
        user: String,

        /// Latitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        /// Longitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Accuracy in meters
        #[arg(long)]
        accuracy: Option<f64>,

        /// Client timestamp (defaults to now)
        #[arg(long)]
        timestamp: Option<String>,

        #[command(flatten)]
        auth: TokenArg,
    },

    /// Stop an incident and print its report
    Stop {
        /// Incident identifier
        incident_id: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        #[command(flatten)]
        auth: TokenArg,
    },

    /// Print an incident's report
    Report {
        /// Incident identifier
        incident_id: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        #[command(flatten)]
        auth: TokenArg,
    },

    /// Show an incident's stored record
    Show {
        /// Incident identifier
        incident_id: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Emergency contact commands.
#[derive(Debug, Subcommand)]
pub enum ContactsCommand {
    /// Register an emergency contact
    Add {
        /// Owner the contact belongs to
        owner_id: String,

        /// Contact display name
        name: String,

        /// Phone number for SMS alerts
        #[arg(long)]
        phone: Option<String>,

        /// Email address
        #[arg(long)]
        email: Option<String>,
    },

    /// List an owner's contacts
    List {
        /// Owner to list
        owner_id: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
