//! `SQLite` schema definitions for safewatch.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the incidents table.
pub const CREATE_INCIDENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS incidents (
    incident_id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    stopped_at TEXT
)
";

/// SQL statement to create the locations table.
///
/// `sequence` is the ordering key. No foreign key to `incidents`: samples
/// for unknown incidents are accepted.
pub const CREATE_LOCATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS locations (
    sequence INTEGER PRIMARY KEY AUTOINCREMENT,
    incident_id TEXT NOT NULL,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    accuracy REAL NOT NULL DEFAULT 0.0,
    ts TEXT NOT NULL
)
";

/// SQL statement to create an index for per-incident ordered scans.
pub const CREATE_LOCATIONS_INCIDENT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_locations_incident ON locations(incident_id, sequence)
";

/// SQL statement to create the contacts table.
pub const CREATE_CONTACTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    phone TEXT,
    email TEXT
)
";

/// SQL statement to create an index on `owner_id` for contact lookup.
pub const CREATE_CONTACTS_OWNER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_contacts_owner ON contacts(owner_id)
";

/// SQL statement to create the append-only consents table.
pub const CREATE_CONSENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS consents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    consent_text TEXT NOT NULL,
    ts TEXT NOT NULL
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_INCIDENTS_TABLE,
    CREATE_LOCATIONS_TABLE,
    CREATE_LOCATIONS_INCIDENT_INDEX,
    CREATE_CONTACTS_TABLE,
    CREATE_CONTACTS_OWNER_INDEX,
    CREATE_CONSENTS_TABLE,
    CREATE_METADATA_TABLE,
];
