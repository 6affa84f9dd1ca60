//! Incident lifecycle engine.
//!
//! State machine per incident id:
//!
//! ```text
//! NONE --start--> ACTIVE --stop--> STOPPED
//!                 ACTIVE --start--> ACTIVE   (start time reset, samples kept)
//!                 STOPPED --start--> ACTIVE  (same overwrite)
//!                 STOPPED --append/stop--> STOPPED
//! ```
//!
//! Appending is accepted in every state, including for ids that were never
//! started. The first sample ever stored for an incident triggers exactly one
//! alert fan-out to the owner's contacts; the decision comes from the
//! store's atomic insert-and-count, not from in-process state.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::auth::Subject;
use crate::config::DEFAULT_MAP_LINK_BASE;
use crate::contacts::{Contact, ContactDirectory};
use crate::error::{Error, Result};
use crate::incident::{Incident, NewLocation, Report};
use crate::notify::{alert_message, map_link, Dispatcher, NotificationJob};
use crate::storage::Storage;

/// Request to start (or restart) an incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartIncident {
    /// Client-supplied incident id.
    pub incident_id: String,
    /// Owner of the incident.
    pub owner_id: String,
}

impl StartIncident {
    /// Build and validate a start request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] if either id is empty.
    pub fn new(incident_id: impl Into<String>, owner_id: impl Into<String>) -> Result<Self> {
        let cmd = Self {
            incident_id: incident_id.into(),
            owner_id: owner_id.into(),
        };
        cmd.validate()?;
        Ok(cmd)
    }

    fn validate(&self) -> Result<()> {
        require("incident_id", &self.incident_id)?;
        require("user_id", &self.owner_id)
    }
}

/// Request to append a location sample.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendLocation {
    /// Incident the sample belongs to.
    pub incident_id: String,
    /// Owner whose contacts are alerted on the first sample.
    pub owner_id: String,
    /// The validated position.
    pub location: NewLocation,
}

impl AppendLocation {
    /// Build and validate an append request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] if either id is empty.
    pub fn new(
        incident_id: impl Into<String>,
        owner_id: impl Into<String>,
        location: NewLocation,
    ) -> Result<Self> {
        let cmd = Self {
            incident_id: incident_id.into(),
            owner_id: owner_id.into(),
            location,
        };
        cmd.validate()?;
        Ok(cmd)
    }

    fn validate(&self) -> Result<()> {
        require("incident_id", &self.incident_id)?;
        require("user_id", &self.owner_id)
    }
}

/// What an append did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Sequence assigned to the sample.
    pub sequence: i64,
    /// Samples stored for the incident after this append.
    pub sample_count: i64,
    /// Contacts queued for an alert (0 unless this was the first sample).
    pub alerts_queued: usize,
}

impl AppendOutcome {
    /// Whether this append stored the incident's first sample.
    #[must_use]
    pub fn is_first(&self) -> bool {
        self.sample_count == 1
    }
}

/// What a stop did.
#[derive(Debug, Clone, PartialEq)]
pub struct StopOutcome {
    /// True if this call set `stopped_at`; false for unknown or already
    /// stopped incidents.
    pub stopped_now: bool,
    /// The incident's full report.
    pub report: Report,
}

/// Orchestrates the incident store, contact directory and alert dispatch.
#[derive(Debug)]
pub struct IncidentEngine {
    store: Arc<Storage>,
    contacts: Arc<dyn ContactDirectory>,
    dispatcher: Dispatcher,
    map_link_base: String,
}

impl IncidentEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(
        store: Arc<Storage>,
        contacts: Arc<dyn ContactDirectory>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            store,
            contacts,
            dispatcher,
            map_link_base: DEFAULT_MAP_LINK_BASE.to_string(),
        }
    }

    /// Use a different prefix for map links in alerts.
    #[must_use]
    pub fn with_map_link_base(mut self, base: impl Into<String>) -> Self {
        self.map_link_base = base.into();
        self
    }

    /// Start an incident, or reset an existing one to active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for empty ids, or a storage error.
    pub fn start(&self, caller: &Subject, cmd: &StartIncident) -> Result<()> {
        cmd.validate()?;
        self.store
            .upsert_incident_start(&cmd.incident_id, &cmd.owner_id, Utc::now())?;
        info!(
            incident = %cmd.incident_id,
            owner = %cmd.owner_id,
            caller = %caller,
            "incident started"
        );
        Ok(())
    }

    /// Append a location sample, alerting contacts if it is the first one.
    ///
    /// Returns once the alert job is queued; delivery happens in the
    /// background and its failures never reach the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for empty ids (nothing is stored), or a
    /// storage error if the insert transaction fails.
    pub async fn append_location(
        &self,
        caller: &Subject,
        cmd: &AppendLocation,
    ) -> Result<AppendOutcome> {
        cmd.validate()?;
        let inserted = self
            .store
            .insert_location_atomic(&cmd.incident_id, &cmd.location)?;

        let mut outcome = AppendOutcome {
            sequence: inserted.sequence,
            sample_count: inserted.count,
            alerts_queued: 0,
        };

        if inserted.is_first() {
            info!(
                incident = %cmd.incident_id,
                owner = %cmd.owner_id,
                caller = %caller,
                "first location received"
            );
            outcome.alerts_queued = self.alert_contacts(cmd).await;
        } else {
            debug!(
                incident = %cmd.incident_id,
                sequence = inserted.sequence,
                "location appended"
            );
        }

        Ok(outcome)
    }

    /// Stop an incident and return its report.
    ///
    /// Stopping an unknown or already stopped incident is not an error; it
    /// leaves `stopped_at` untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for an empty id, or a storage error.
    pub fn stop(&self, caller: &Subject, incident_id: &str) -> Result<StopOutcome> {
        require("incident_id", incident_id)?;
        let changed = self.store.set_incident_stopped(incident_id, Utc::now())?;

        if changed > 0 {
            info!(incident = %incident_id, caller = %caller, "incident stopped");
        } else {
            debug!(
                incident = %incident_id,
                "stop ignored: incident unknown or already stopped"
            );
        }

        Ok(StopOutcome {
            stopped_now: changed > 0,
            report: self.assemble_report(incident_id)?,
        })
    }

    /// Report every sample of an incident in sequence order.
    ///
    /// Any authenticated caller may read any incident.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for an empty id, or a storage error.
    pub fn report(&self, caller: &Subject, incident_id: &str) -> Result<Report> {
        require("incident_id", incident_id)?;
        debug!(incident = %incident_id, caller = %caller, "report requested");
        self.assemble_report(incident_id)
    }

    /// Look up the stored incident record.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn incident(&self, incident_id: &str) -> Result<Option<Incident>> {
        self.store.get_incident(incident_id)
    }

    fn assemble_report(&self, incident_id: &str) -> Result<Report> {
        let samples = self.store.list_locations(incident_id)?;
        Ok(Report::from_samples(incident_id, samples))
    }

    /// Queue one alert per contact with a phone. Returns how many were queued.
    ///
    /// The sample is already committed here, so failures are logged rather
    /// than returned: failing the request would invite a retry that can never
    /// be "first" again.
    async fn alert_contacts(&self, cmd: &AppendLocation) -> usize {
        let contacts = match self.contacts.list_contacts(&cmd.owner_id) {
            Ok(contacts) => contacts,
            Err(e) => {
                error!(
                    incident = %cmd.incident_id,
                    owner = %cmd.owner_id,
                    "contact lookup failed; no alerts sent: {}",
                    e
                );
                return 0;
            }
        };

        let recipients: Vec<Contact> = contacts
            .into_iter()
            .filter(|c| c.sms_target().is_some())
            .collect();
        if recipients.is_empty() {
            warn!(owner = %cmd.owner_id, "no contacts with a phone number");
            return 0;
        }

        let queued = recipients.len();
        let link = map_link(&self.map_link_base, cmd.location.lat, cmd.location.lon);
        let job = NotificationJob {
            incident_id: cmd.incident_id.clone(),
            recipients,
            message: alert_message(&cmd.owner_id, &link),
        };

        match self.dispatcher.enqueue(job).await {
            Ok(()) => queued,
            Err(e) => {
                error!(incident = %cmd.incident_id, "could not queue alerts: {}", e);
                0
            }
        }
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::missing_field(field))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::init_test_logging;
    use crate::notify::{Notifier, NotifyError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recording {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, phone: &str, message: &str) -> std::result::Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((phone.to_string(), message.to_string()));
            Ok(())
        }
    }

    #[derive(Debug)]
    struct BrokenDirectory;

    impl ContactDirectory for BrokenDirectory {
        fn list_contacts(&self, _owner_id: &str) -> Result<Vec<Contact>> {
            Err(Error::StoragePoisoned)
        }
    }

    fn caller() -> Subject {
        Subject::new("alice")
    }

    fn at(lat: f64, ts: &str) -> AppendLocation {
        AppendLocation::new(
            "inc-1",
            "alice",
            NewLocation::new(lat, -122.0, None, ts).unwrap(),
        )
        .unwrap()
    }

    fn setup() -> (IncidentEngine, Arc<Storage>, Arc<Recording>, crate::notify::DispatchWorker) {
        init_test_logging();
        let store = Arc::new(Storage::open_in_memory().unwrap());
        store
            .add_contact(&Contact::new("alice", "Bob").with_phone("+15550100"))
            .unwrap();
        store
            .add_contact(&Contact::new("alice", "Carol").with_email("c@example.com"))
            .unwrap();
        let notifier = Arc::new(Recording::default());
        let (dispatcher, worker) = Dispatcher::spawn(notifier.clone(), 8);
        let engine = IncidentEngine::new(store.clone(), store.clone(), dispatcher);
        (engine, store, notifier, worker)
    }

    #[test]
    fn test_start_incident_validation() {
        assert!(StartIncident::new("", "alice").unwrap_err().is_bad_request());
        let err = StartIncident::new("inc-1", " ").unwrap_err();
        assert!(err.to_string().contains("user_id"));
        assert!(StartIncident::new("inc-1", "alice").is_ok());
    }

    #[test]
    fn test_append_location_validation() {
        let loc = NewLocation::new(1.0, 2.0, None, "t").unwrap();
        let err = AppendLocation::new("", "alice", loc).unwrap_err();
        assert!(err.to_string().contains("incident_id"));
    }

    #[tokio::test]
    async fn test_start_then_incident_is_active() {
        let (engine, _store, _notifier, _worker) = setup();
        engine
            .start(&caller(), &StartIncident::new("inc-1", "alice").unwrap())
            .unwrap();

        let incident = engine.incident("inc-1").unwrap().unwrap();
        assert!(incident.is_active());
        assert_eq!(incident.owner_id, "alice");
    }

    #[tokio::test]
    async fn test_start_rejects_unvalidated_command() {
        let (engine, store, _notifier, _worker) = setup();
        let cmd = StartIncident {
            incident_id: String::new(),
            owner_id: "alice".to_string(),
        };
        assert!(engine.start(&caller(), &cmd).unwrap_err().is_bad_request());
        assert_eq!(store.stats().unwrap().total_incidents, 0);
    }

    #[tokio::test]
    async fn test_first_append_alerts_phone_contacts_once() {
        let (engine, _store, notifier, worker) = setup();

        let first = engine.append_location(&caller(), &at(37.0, "t1")).await.unwrap();
        let second = engine.append_location(&caller(), &at(37.1, "t2")).await.unwrap();

        assert!(first.is_first());
        assert_eq!(first.alerts_queued, 1);
        assert!(!second.is_first());
        assert_eq!(second.alerts_queued, 0);

        drop(engine);
        let stats = worker.finish().await;
        assert_eq!(stats.delivered, 1);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+15550100");
        assert!(sent[0].1.contains("alice"));
        assert!(sent[0].1.contains("query=37.0,-122.0"));
    }

    #[tokio::test]
    async fn test_append_with_custom_map_link() {
        let (engine, _store, notifier, worker) = setup();
        let engine = engine.with_map_link_base("https://maps.example/?q=");

        engine.append_location(&caller(), &at(1.5, "t1")).await.unwrap();
        drop(engine);
        worker.finish().await;

        let sent = notifier.sent.lock().unwrap();
        assert!(sent[0].1.contains("https://maps.example/?q=1.5,-122.0"));
    }

    #[tokio::test]
    async fn test_append_without_phone_contacts() {
        init_test_logging();
        let store = Arc::new(Storage::open_in_memory().unwrap());
        let notifier = Arc::new(Recording::default());
        let (dispatcher, worker) = Dispatcher::spawn(notifier.clone(), 8);
        let engine = IncidentEngine::new(store.clone(), store, dispatcher);

        let outcome = engine.append_location(&caller(), &at(1.0, "t")).await.unwrap();
        assert!(outcome.is_first());
        assert_eq!(outcome.alerts_queued, 0);

        drop(engine);
        assert_eq!(worker.finish().await.jobs, 0);
    }

    #[tokio::test]
    async fn test_contact_lookup_failure_does_not_fail_append() {
        init_test_logging();
        let store = Arc::new(Storage::open_in_memory().unwrap());
        let (dispatcher, _worker) = Dispatcher::spawn(Arc::new(Recording::default()), 8);
        let engine = IncidentEngine::new(store.clone(), Arc::new(BrokenDirectory), dispatcher);

        let outcome = engine.append_location(&caller(), &at(1.0, "t")).await.unwrap();
        assert_eq!(outcome.alerts_queued, 0);
        assert_eq!(store.list_locations("inc-1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_to_stopped_incident_is_accepted() {
        let (engine, _store, _notifier, _worker) = setup();
        engine
            .start(&caller(), &StartIncident::new("inc-1", "alice").unwrap())
            .unwrap();
        engine.stop(&caller(), "inc-1").unwrap();

        engine.append_location(&caller(), &at(1.0, "t")).await.unwrap();

        let incident = engine.incident("inc-1").unwrap().unwrap();
        assert!(!incident.is_active());
        assert_eq!(engine.report(&caller(), "inc-1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_twice() {
        let (engine, _store, _notifier, _worker) = setup();
        engine
            .start(&caller(), &StartIncident::new("inc-1", "alice").unwrap())
            .unwrap();
        engine.append_location(&caller(), &at(1.0, "t")).await.unwrap();

        let first = engine.stop(&caller(), "inc-1").unwrap();
        let stopped_at = engine.incident("inc-1").unwrap().unwrap().stopped_at;
        let second = engine.stop(&caller(), "inc-1").unwrap();

        assert!(first.stopped_now);
        assert!(!second.stopped_now);
        assert_eq!(first.report, second.report);
        assert_eq!(
            engine.incident("inc-1").unwrap().unwrap().stopped_at,
            stopped_at
        );
    }

    #[tokio::test]
    async fn test_stop_unknown_incident() {
        let (engine, _store, _notifier, _worker) = setup();
        let outcome = engine.stop(&caller(), "ghost").unwrap();
        assert!(!outcome.stopped_now);
        assert!(outcome.report.is_empty());
        assert!(engine.incident("ghost").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_report_requires_id() {
        let (engine, _store, _notifier, _worker) = setup();
        assert!(engine.report(&caller(), "").unwrap_err().is_bad_request());
        assert!(engine.stop(&caller(), "").unwrap_err().is_bad_request());
    }
}
