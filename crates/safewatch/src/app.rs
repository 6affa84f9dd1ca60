//! Process wiring.
//!
//! [`App`] builds every long-lived component once at startup: storage, the
//! notifier and its dispatch worker, the token identity, the engine and the
//! service in front of it.

use std::sync::Arc;

use tracing::info;

use crate::api::Service;
use crate::auth::JwtIdentity;
use crate::config::Config;
use crate::engine::IncidentEngine;
use crate::error::Result;
use crate::notify::{build_notifier, DispatchStats, DispatchWorker, Dispatcher, Notifier};
use crate::storage::Storage;

/// A fully wired safewatch instance.
#[derive(Debug)]
pub struct App {
    config: Config,
    store: Arc<Storage>,
    identity: Arc<JwtIdentity>,
    service: Service,
    worker: DispatchWorker,
}

impl App {
    /// Open the configured database and build the configured notifier.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the notifier or
    /// token identity cannot be built.
    pub fn from_config(config: Config) -> Result<Self> {
        let store = Arc::new(Storage::open(config.database_path())?);
        let notifier = build_notifier(&config)?;
        Self::with_parts(config, store, notifier)
    }

    /// Wire an app around an existing store and notifier.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the token identity cannot be built.
    pub fn with_parts(
        config: Config,
        store: Arc<Storage>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let identity = Arc::new(JwtIdentity::from_config(&config.auth)?);
        info!(
            "notifier: {} (queue capacity {})",
            notifier.name(),
            config.notifier.queue_capacity
        );
        let (dispatcher, worker) = Dispatcher::spawn(notifier, config.notifier.queue_capacity);

        let engine = IncidentEngine::new(store.clone(), store.clone(), dispatcher)
            .with_map_link_base(config.notifier.map_link_base.clone());
        let service = Service::new(
            Arc::new(engine),
            store.clone(),
            identity.clone(),
            identity.clone(),
        );

        Ok(Self {
            config,
            store,
            identity,
            service,
            worker,
        })
    }

    /// The loaded configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The incident store.
    #[must_use]
    pub fn store(&self) -> &Arc<Storage> {
        &self.store
    }

    /// The token identity used to issue and verify bearer tokens.
    #[must_use]
    pub fn identity(&self) -> &Arc<JwtIdentity> {
        &self.identity
    }

    /// The request surface.
    #[must_use]
    pub fn service(&self) -> &Service {
        &self.service
    }

    /// The incident engine.
    #[must_use]
    pub fn engine(&self) -> &IncidentEngine {
        self.service.engine()
    }

    /// Drop the engine and wait for queued alerts to be sent.
    ///
    /// Hangs if a clone of the engine's `Arc` is still alive elsewhere.
    pub async fn shutdown(self) -> DispatchStats {
        let Self {
            service, worker, ..
        } = self;
        drop(service);
        worker.finish().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{IdentityVerifier, TokenIssuer};
    use crate::contacts::Contact;
    use crate::notify::LogNotifier;

    fn app() -> App {
        crate::logging::init_test_logging();
        let store = Arc::new(Storage::open_in_memory().unwrap());
        App::with_parts(Config::default(), store, Arc::new(LogNotifier)).unwrap()
    }

    #[tokio::test]
    async fn test_tokens_round_trip_through_identity() {
        let app = app();
        let token = app.identity().issue("alice").unwrap();
        let subject = app.identity().verify(&token).unwrap();
        assert_eq!(subject.as_str(), "alice");
    }

    #[tokio::test]
    async fn test_shutdown_flushes_alerts() {
        let app = app();
        app.store()
            .add_contact(&Contact::new("alice", "Bob").with_phone("+15550100"))
            .unwrap();
        let auth = format!("Bearer {}", app.identity().issue("alice").unwrap());

        let resp = app
            .service()
            .update_location(
                Some(&auth),
                br#"{"incident_id":"inc-1","user_id":"alice","lat":1,"lon":2,"timestamp":"t"}"#,
            )
            .await;
        assert_eq!(resp.status, 201);

        let stats = app.shutdown().await;
        assert_eq!(stats.jobs, 1);
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn test_from_config_opens_file_database() {
        crate::logging::init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.database_path = Some(dir.path().join("nested").join("incidents.db"));

        let app = App::from_config(config).unwrap();
        assert!(app.store().path().exists());
        assert_eq!(app.engine().incident("inc-1").unwrap(), None);
        app.shutdown().await;
    }
}
