//! Storage layer for safewatch.
//!
//! This module provides `SQLite`-based persistent storage for incidents,
//! their location samples, emergency contacts, and consent records.
//!
//! All cross-request coordination happens here. Appending a sample and
//! counting the incident's samples run inside one `IMMEDIATE` transaction,
//! so exactly one writer can ever observe a count of 1, even when several
//! connections share the same database file.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use crate::consent::ConsentRecord;
use crate::contacts::{Contact, ContactDirectory};
use crate::error::{Error, Result};
use crate::incident::{Incident, InsertedLocation, LocationSample, NewLocation};

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Storage engine for incidents and their locations.
///
/// Holds a single connection behind a mutex; clone an `Arc<Storage>` to share
/// it between request handlers.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL lets report reads proceed while a sample insert holds the write lock
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::StoragePoisoned)
    }

    // === Incidents ===

    /// Create an incident, or reset an existing one to active.
    ///
    /// An existing record is overwritten: owner and start time are replaced and
    /// `stopped_at` is cleared. Samples already stored for the id are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert_incident_start(
        &self,
        incident_id: &str,
        owner_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r"
            INSERT INTO incidents (incident_id, owner_id, started_at, stopped_at)
            VALUES (?1, ?2, ?3, NULL)
            ON CONFLICT(incident_id) DO UPDATE SET
                owner_id = excluded.owner_id,
                started_at = excluded.started_at,
                stopped_at = NULL
            ",
            params![incident_id, owner_id, encode_timestamp(started_at)],
        )?;
        debug!("Upserted incident {}", incident_id);
        Ok(())
    }

    /// Mark an active incident as stopped.
    ///
    /// Returns the number of rows changed: 0 when the id is unknown or the
    /// incident was already stopped, in which case `stopped_at` keeps its
    /// first value. The stored value is never earlier than `started_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_incident_stopped(&self, incident_id: &str, stopped_at: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        // Fixed-width UTC timestamps compare correctly as text
        let affected = conn.execute(
            r"
            UPDATE incidents SET stopped_at = MAX(?1, started_at)
            WHERE incident_id = ?2 AND stopped_at IS NULL
            ",
            params![encode_timestamp(stopped_at), incident_id],
        )?;
        Ok(affected)
    }

    /// Get an incident by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_incident(&self, incident_id: &str) -> Result<Option<Incident>> {
        let conn = self.lock()?;
        let incident = conn
            .query_row(
                r"
                SELECT incident_id, owner_id, started_at, stopped_at
                FROM incidents WHERE incident_id = ?1
                ",
                [incident_id],
                Self::row_to_incident,
            )
            .optional()?;
        Ok(incident)
    }

    // === Locations ===

    /// Append a sample and return its sequence with the incident's new sample count.
    ///
    /// Both happen in one `IMMEDIATE` transaction: if anything fails, no
    /// sample is visible, and no two callers can observe the same count.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub fn insert_location_atomic(
        &self,
        incident_id: &str,
        location: &NewLocation,
    ) -> Result<InsertedLocation> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            r"
            INSERT INTO locations (incident_id, lat, lon, accuracy, ts)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                incident_id,
                location.lat,
                location.lon,
                location.accuracy,
                location.ts,
            ],
        )?;
        let sequence = tx.last_insert_rowid();

        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM locations WHERE incident_id = ?1",
            [incident_id],
            |row| row.get(0),
        )?;

        tx.commit()?;

        debug!(
            "Inserted location {} for incident {} (count {})",
            sequence, incident_id, count
        );
        Ok(InsertedLocation { sequence, count })
    }

    /// List an incident's samples in ascending sequence order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_locations(&self, incident_id: &str) -> Result<Vec<LocationSample>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r"
            SELECT incident_id, sequence, lat, lon, accuracy, ts
            FROM locations WHERE incident_id = ?1
            ORDER BY sequence ASC
            ",
        )?;

        let samples = stmt
            .query_map([incident_id], |row| {
                Ok(LocationSample {
                    incident_id: row.get(0)?,
                    sequence: row.get(1)?,
                    lat: row.get(2)?,
                    lon: row.get(3)?,
                    accuracy: row.get(4)?,
                    ts: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(samples)
    }

    // === Contacts ===

    /// Register an emergency contact. Returns the assigned row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn add_contact(&self, contact: &Contact) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO contacts (owner_id, name, phone, email) VALUES (?1, ?2, ?3, ?4)",
            params![contact.owner_id, contact.name, contact.phone, contact.email],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List the contacts registered by an owner, in registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_contacts(&self, owner_id: &str) -> Result<Vec<Contact>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT owner_id, name, phone, email FROM contacts WHERE owner_id = ?1 ORDER BY id ASC",
        )?;

        let contacts = stmt
            .query_map([owner_id], |row| {
                Ok(Contact {
                    owner_id: row.get(0)?,
                    name: row.get(1)?,
                    phone: row.get(2)?,
                    email: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(contacts)
    }

    // === Consents ===

    /// Append a consent record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record_consent(
        &self,
        user_id: &str,
        consent_text: &str,
        ts: DateTime<Utc>,
    ) -> Result<ConsentRecord> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO consents (user_id, consent_text, ts) VALUES (?1, ?2, ?3)",
            params![user_id, consent_text, encode_timestamp(ts)],
        )?;
        let id = conn.last_insert_rowid();
        info!("Recorded consent {} for {}", id, user_id);

        Ok(ConsentRecord {
            id,
            user_id: user_id.to_string(),
            consent_text: consent_text.to_string(),
            ts,
        })
    }

    /// List every consent a user has recorded, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_consents(&self, user_id: &str) -> Result<Vec<ConsentRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, consent_text, ts FROM consents WHERE user_id = ?1 ORDER BY id ASC",
        )?;

        let records = stmt
            .query_map([user_id], |row| {
                Ok(ConsentRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    consent_text: row.get(2)?,
                    ts: decode_timestamp(row, 3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    // === Maintenance ===

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let conn = self.lock()?;
        let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

        let total_incidents = count("SELECT COUNT(*) FROM incidents")?;
        let active_incidents = count("SELECT COUNT(*) FROM incidents WHERE stopped_at IS NULL")?;
        let total_locations = count("SELECT COUNT(*) FROM locations")?;
        let total_contacts = count("SELECT COUNT(*) FROM contacts")?;
        let total_consents = count("SELECT COUNT(*) FROM consents")?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_incidents,
            active_incidents,
            total_locations,
            total_contacts,
            total_consents,
            db_size_bytes,
        })
    }

    fn row_to_incident(row: &rusqlite::Row) -> rusqlite::Result<Incident> {
        let stopped_at = match row.get::<_, Option<String>>(3)? {
            Some(_) => Some(decode_timestamp(row, 3)?),
            None => None,
        };
        Ok(Incident {
            incident_id: row.get(0)?,
            owner_id: row.get(1)?,
            started_at: decode_timestamp(row, 2)?,
            stopped_at,
        })
    }
}

impl ContactDirectory for Storage {
    fn list_contacts(&self, owner_id: &str) -> Result<Vec<Contact>> {
        Storage::list_contacts(self, owner_id)
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Total number of incidents ever started.
    pub total_incidents: i64,
    /// Incidents without a stop time.
    pub active_incidents: i64,
    /// Total number of location samples stored.
    pub total_locations: i64,
    /// Total number of registered contacts.
    pub total_contacts: i64,
    /// Total number of consent records.
    pub total_consents: i64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
