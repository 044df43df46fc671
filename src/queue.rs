use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::{
    db::{StatusChange, Store},
    errors::StoreError,
    models::BookingStatus,
    notifier::{NotifyOutcome, Notifier},
};

/// Producer handle for booking confirmations. Cloneable; `enqueue` never waits.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    tx: mpsc::UnboundedSender<String>,
}

impl NotificationQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the worker pool has gone away.
    pub fn enqueue(&self, booking_id: impl Into<String>) -> bool {
        let booking_id = booking_id.into();
        match self.tx.send(booking_id) {
            Ok(()) => true,
            Err(mpsc::error::SendError(booking_id)) => {
                log::warn!("Worker pool stopped, dropping notification for {}", booking_id);
                false
            }
        }
    }
}

pub type CompletedJob = (String, NotifyOutcome);

pub struct WorkerPool;

impl WorkerPool {
    /// Runs one task per queued booking, at most `workers` at a time.
    /// The handle resolves after every queue handle is dropped and all
    /// queued jobs have finished.
    pub fn spawn(
        notifier: Notifier,
        mut rx: mpsc::UnboundedReceiver<String>,
        workers: usize,
    ) -> JoinHandle<Vec<CompletedJob>> {
        tokio::spawn(async move {
            let notifier = Arc::new(notifier);
            let permits = Arc::new(Semaphore::new(workers.max(1)));
            let mut jobs = JoinSet::new();
            let mut completed = Vec::new();

            while let Some(booking_id) = rx.recv().await {
                let permit = match permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let notifier = notifier.clone();
                jobs.spawn(async move {
                    let outcome = notifier.notify_booking_confirmed(&booking_id).await;
                    drop(permit);
                    (booking_id, outcome)
                });

                while let Some(joined) = jobs.try_join_next() {
                    collect(joined, &mut completed);
                }
            }

            while let Some(joined) = jobs.join_next().await {
                collect(joined, &mut completed);
            }
            log::info!("Worker pool drained, {} notifications processed", completed.len());
            completed
        })
    }
}

fn collect(joined: Result<CompletedJob, tokio::task::JoinError>, completed: &mut Vec<CompletedJob>) {
    match joined {
        Ok(job) => completed.push(job),
        Err(e) => log::error!("Notification task aborted: {}", e),
    }
}

/// Moves a pending booking to confirmed and queues its confirmation mail.
/// Anything else is left untouched and nothing is queued.
pub async fn confirm_booking(
    store: &Store,
    queue: &NotificationQueue,
    booking_id: &str,
) -> Result<StatusChange, StoreError> {
    let change = store
        .set_booking_status(booking_id, BookingStatus::Confirmed)
        .await?;
    if change == StatusChange::Updated {
        queue.enqueue(booking_id);
    }
    Ok(change)
}
