//! `safewatch` - Personal-safety incident tracking
//!
//! A user starts an incident, streams location updates and stops it. The
//! first location ever stored for an incident alerts the owner's emergency
//! contacts exactly once, and reports list locations in the order the store
//! accepted them.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod api;
pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod consent;
pub mod contacts;
pub mod engine;
pub mod error;
pub mod incident;
pub mod logging;
pub mod notify;
pub mod storage;

pub use api::{ApiResponse, Service};
pub use app::App;
pub use auth::{IdentityVerifier, JwtIdentity, Subject, TokenIssuer};
pub use config::Config;
pub use contacts::{Contact, ContactDirectory};
pub use engine::{AppendLocation, AppendOutcome, IncidentEngine, StartIncident, StopOutcome};
pub use error::{Error, Result};
pub use incident::{Incident, IncidentState, NewLocation, Report, ReportEntry};
pub use logging::init_logging;
pub use notify::{Dispatcher, Notifier, NotifyError};
pub use storage::{Storage, StorageStats};
