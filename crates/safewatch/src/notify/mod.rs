//! Outbound notifications to emergency contacts.
//!
//! A [`Notifier`] delivers one message to one phone number. The
//! [`Dispatcher`] moves that work off the request path: the engine enqueues a
//! [`NotificationJob`] and returns, and a background worker sends to every
//! recipient independently.

pub mod dispatch;
pub mod twilio;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{Config, NotifierKind};

pub use dispatch::{DispatchStats, DispatchWorker, Dispatcher, NotificationJob};
pub use twilio::TwilioNotifier;

/// Errors from a single notification attempt.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The provider refused the message.
    #[error("provider rejected message ({status}): {message}")]
    Rejected {
        /// HTTP status returned by the provider.
        status: u16,
        /// Provider's error description.
        message: String,
    },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider did not answer in time.
    #[error("send timed out")]
    Timeout,
}

/// Delivers a text message to a phone number.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Send `message` to `phone`.
    ///
    /// # Errors
    ///
    /// Returns a [`NotifyError`] if the message was not accepted.
    async fn send(&self, phone: &str, message: &str) -> Result<(), NotifyError>;
}

/// Notifier that only writes the message to the log.
///
/// Used when no SMS provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, phone: &str, message: &str) -> Result<(), NotifyError> {
        info!(phone, "notification (log only): {}", message);
        Ok(())
    }
}

/// Build the notifier selected by configuration.
///
/// # Errors
///
/// Returns an error if the Twilio client cannot be constructed.
pub fn build_notifier(config: &Config) -> crate::Result<Arc<dyn Notifier>> {
    match config.notifier.kind {
        NotifierKind::Log => Ok(Arc::new(LogNotifier)),
        NotifierKind::Twilio => Ok(Arc::new(TwilioNotifier::new(
            &config.notifier.twilio,
            config.notifier_timeout(),
        )?)),
    }
}

/// Build the map link for a position.
///
/// Coordinates keep their decimal point, so whole degrees render as `37.0`.
#[must_use]
pub fn map_link(base: &str, lat: f64, lon: f64) -> String {
    format!("{base}{lat:?},{lon:?}")
}

/// Build the alert text sent to each contact.
#[must_use]
pub fn alert_message(owner_id: &str, link: &str) -> String {
    format!("EMERGENCY: {owner_id} triggered an incident. Location: {link}")
}
