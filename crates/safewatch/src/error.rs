//! Error types for safewatch.
//!
//! This module defines all error types used throughout the safewatch crate.
//! Request-level failures (`BadRequest`, `Unauthorized`) carry just enough
//! detail for a caller to react; storage failures keep their source for logs.

use std::path::PathBuf;
use thiserror::Error;

/// Machine-readable reason attached to a [`Error::BadRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadRequestReason {
    /// A required field was absent or empty.
    MissingField,
    /// A field was present but had an unusable value.
    InvalidField,
    /// The request body could not be parsed at all.
    MalformedBody,
}

impl BadRequestReason {
    /// The wire code for this reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingField => "missing_field",
            Self::InvalidField => "invalid_field",
            Self::MalformedBody => "malformed_body",
        }
    }
}

impl std::fmt::Display for BadRequestReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for safewatch operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query or transaction failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// The storage connection lock was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    StoragePoisoned,

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Request Errors ===
    /// A request was missing a required field or carried an invalid one.
    #[error("bad request: {reason} ({field})")]
    BadRequest {
        /// Machine-readable reason code.
        reason: BadRequestReason,
        /// The offending field, or `body` for unparseable payloads.
        field: String,
    },

    /// The caller did not present a valid bearer credential.
    #[error("unauthorized")]
    Unauthorized,

    /// A bearer token could not be issued.
    #[error("failed to issue token: {0}")]
    TokenIssue(String),

    // === Notification Errors ===
    /// The outbound notifier could not be constructed.
    #[error("notifier setup failed: {0}")]
    NotifierSetup(String),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for safewatch operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a missing-field error.
    #[must_use]
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::BadRequest {
            reason: BadRequestReason::MissingField,
            field: field.into(),
        }
    }

    /// Create an invalid-field error.
    #[must_use]
    pub fn invalid_field(field: impl Into<String>) -> Self {
        Self::BadRequest {
            reason: BadRequestReason::InvalidField,
            field: field.into(),
        }
    }

    /// Create an error for a body that could not be parsed.
    #[must_use]
    pub fn malformed_body() -> Self {
        Self::BadRequest {
            reason: BadRequestReason::MalformedBody,
            field: "body".to_string(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new notifier setup error.
    #[must_use]
    pub fn notifier_setup(message: impl Into<String>) -> Self {
        Self::NotifierSetup(message.into())
    }

    /// Check if this error should be reported to the caller as a bad request.
    #[must_use]
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::BadRequest { .. })
    }

    /// Check if this error is an authentication failure.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Check if this error came from the storage layer.
    #[must_use]
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            Self::DatabaseOpen { .. }
                | Self::DatabaseQuery(_)
                | Self::DatabaseMigration { .. }
                | Self::StoragePoisoned
        )
    }
}
