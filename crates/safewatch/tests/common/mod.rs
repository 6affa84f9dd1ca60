//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use safewatch::notify::{DispatchStats, DispatchWorker};
use safewatch::{
    App, Config, Contact, Dispatcher, IncidentEngine, Notifier, NotifyError, Storage, Subject,
};

/// Notifier that records every message instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    /// Every `(phone, message)` sent so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, phone: &str, message: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((phone.to_string(), message.to_string()));
        Ok(())
    }
}

/// Engine over an in-memory store with two phone contacts for "alice".
pub struct Harness {
    pub engine: Arc<IncidentEngine>,
    pub store: Arc<Storage>,
    pub notifier: Arc<RecordingNotifier>,
    worker: DispatchWorker,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(Storage::open_in_memory().unwrap());
        seed_contacts(&store);
        let notifier = Arc::new(RecordingNotifier::default());
        let (dispatcher, worker) = Dispatcher::spawn(notifier.clone(), 16);
        let engine = Arc::new(IncidentEngine::new(store.clone(), store.clone(), dispatcher));
        Self {
            engine,
            store,
            notifier,
            worker,
        }
    }

    /// Drop the engine and wait for every queued alert.
    ///
    /// All other clones of `engine` must already be gone.
    pub async fn finish(self) -> DispatchStats {
        drop(self.engine);
        self.worker.finish().await
    }
}

/// A fully wired app over an in-memory store.
pub fn app() -> (App, Arc<RecordingNotifier>) {
    let store = Arc::new(Storage::open_in_memory().unwrap());
    seed_contacts(&store);
    let notifier = Arc::new(RecordingNotifier::default());
    let app = App::with_parts(Config::default(), store, notifier.clone()).unwrap();
    (app, notifier)
}

/// Bob and Dan have phones; Carol only has an email.
pub fn seed_contacts(store: &Storage) {
    store
        .add_contact(&Contact::new("alice", "Bob").with_phone("+15550100"))
        .unwrap();
    store
        .add_contact(&Contact::new("alice", "Carol").with_email("carol@example.com"))
        .unwrap();
    store
        .add_contact(&Contact::new("alice", "Dan").with_phone("+15550101"))
        .unwrap();
}

pub fn alice() -> Subject {
    Subject::new("alice")
}
