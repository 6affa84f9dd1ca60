//! Background fan-out of notification jobs.
//!
//! The engine holds a cloneable [`Dispatcher`] and enqueues one
//! [`NotificationJob`] per first-location event. A single worker task drains
//! the queue and spawns one send per recipient, so a slow or failing contact
//! never delays or fails another. Each recipient gets at most one attempt.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::{Notifier, NotifyError};
use crate::contacts::Contact;
use crate::error::{Error, Result};

/// One alert fan-out: the same message to every recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationJob {
    /// Incident that triggered the alert.
    pub incident_id: String,
    /// Contacts to alert; entries without a phone are skipped.
    pub recipients: Vec<Contact>,
    /// Message body.
    pub message: String,
}

/// Counters reported by the worker when it shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Jobs received.
    pub jobs: u64,
    /// Sends started.
    pub attempted: u64,
    /// Sends the provider accepted.
    pub delivered: u64,
    /// Sends that failed or panicked.
    pub failed: u64,
}

/// Handle for enqueueing notification jobs.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<NotificationJob>,
}

/// The running worker; await [`DispatchWorker::finish`] after every
/// [`Dispatcher`] clone has been dropped to flush outstanding sends.
#[derive(Debug)]
pub struct DispatchWorker {
    handle: JoinHandle<DispatchStats>,
}

impl Dispatcher {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, or if `capacity` is 0.
    #[must_use]
    pub fn spawn(notifier: Arc<dyn Notifier>, capacity: usize) -> (Self, DispatchWorker) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(run_worker(rx, notifier));
        (Self { tx }, DispatchWorker { handle })
    }

    /// Queue a job, waiting for room if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the worker has stopped.
    pub async fn enqueue(&self, job: NotificationJob) -> Result<()> {
        self.tx.send(job).await.map_err(|e| {
            Error::internal(format!(
                "notification worker stopped; dropped job for {}",
                e.0.incident_id
            ))
        })
    }
}

impl DispatchWorker {
    /// Wait for the queue to close and every in-flight send to finish.
    pub async fn finish(self) -> DispatchStats {
        match self.handle.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("notification worker failed: {}", e);
                DispatchStats::default()
            }
        }
    }
}

type SendOutcome = (String, std::result::Result<(), NotifyError>);

async fn run_worker(
    mut rx: mpsc::Receiver<NotificationJob>,
    notifier: Arc<dyn Notifier>,
) -> DispatchStats {
    let mut stats = DispatchStats::default();
    let mut inflight: JoinSet<SendOutcome> = JoinSet::new();

    info!("notification worker started ({})", notifier.name());
    loop {
        tokio::select! {
            job = rx.recv() => {
                let Some(job) = job else { break };
                stats.jobs += 1;
                start_job(&mut inflight, &notifier, job, &mut stats);
            }
            Some(done) = inflight.join_next(), if !inflight.is_empty() => {
                record(&mut stats, done);
            }
        }
    }

    while let Some(done) = inflight.join_next().await {
        record(&mut stats, done);
    }

    info!(
        "notification worker stopped: {} jobs, {} delivered, {} failed",
        stats.jobs, stats.delivered, stats.failed
    );
    stats
}

fn start_job(
    inflight: &mut JoinSet<SendOutcome>,
    notifier: &Arc<dyn Notifier>,
    job: NotificationJob,
    stats: &mut DispatchStats,
) {
    let message: Arc<str> = Arc::from(job.message);
    for contact in job.recipients {
        let Some(phone) = contact.sms_target().map(str::to_string) else {
            debug!("skipping contact {} without phone", contact.name);
            continue;
        };

        stats.attempted += 1;
        let notifier = Arc::clone(notifier);
        let message = Arc::clone(&message);
        inflight.spawn(async move {
            let result = notifier.send(&phone, &message).await;
            (phone, result)
        });
    }
    debug!("dispatched alerts for incident {}", job.incident_id);
}

fn record(stats: &mut DispatchStats, done: std::result::Result<SendOutcome, JoinError>) {
    match done {
        Ok((phone, Ok(()))) => {
            stats.delivered += 1;
            debug!(phone = %phone, "notification delivered");
        }
        Ok((phone, Err(e))) => {
            stats.failed += 1;
            error!(phone = %phone, "notification failed: {}", e);
        }
        Err(e) => {
            stats.failed += 1;
            warn!("notification task aborted: {}", e);
        }
    }
}
