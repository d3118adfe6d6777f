//! Background polling of the claims store.

use std::sync::Arc;
use std::time::Duration;

use shared_types::{PortalErrorKind, SyncConfig};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::store::{ClaimsStore, RefreshOutcome};

/// Delay before the next poll after `failures` consecutive failures.
///
/// Doubles per failure, capped at `max_backoff` (never below `interval`).
pub fn backoff_delay(interval: Duration, max_backoff: Duration, failures: u32) -> Duration {
    if failures == 0 {
        return interval;
    }
    let factor = 2u32.saturating_pow(failures.min(16));
    interval
        .saturating_mul(factor)
        .min(max_backoff.max(interval))
}

/// Running poll loop. Dropping the handle aborts the task.
pub struct PollerHandle {
    task: Option<JoinHandle<()>>,
    stop: watch::Sender<bool>,
    wake: Arc<Notify>,
}

impl PollerHandle {
    fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>, Arc<Notify>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (stop, stop_rx) = watch::channel(false);
        let wake = Arc::new(Notify::new());
        let task = tokio::spawn(body(stop_rx, Arc::clone(&wake)));
        Self {
            task: Some(task),
            stop,
            wake,
        }
    }

    /// Poll now instead of waiting for the next tick (app back in the foreground).
    pub fn poll_now(&self) {
        self.wake.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop after the current fetch, if any, and wait for the loop to exit.
    pub async fn stop(mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Sleep for `delay`. Returns `false` when the loop should exit.
async fn pause(delay: Duration, stop: &mut watch::Receiver<bool>, wake: &Notify) -> bool {
    let closed = tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = wake.notified() => false,
        changed = stop.changed() => changed.is_err(),
    };
    !closed && !*stop.borrow()
}

pub struct SyncPoller {
    store: Arc<ClaimsStore>,
    interval: Duration,
    max_backoff: Duration,
    watch_interval: Duration,
}

impl SyncPoller {
    pub fn new(store: Arc<ClaimsStore>, config: &SyncConfig) -> Self {
        Self {
            store,
            interval: Duration::from_secs(config.effective_poll_interval_secs()),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            watch_interval: Duration::from_secs(config.claim_watch_interval_secs.max(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the list poll. The first refresh runs immediately.
    pub fn spawn(&self) -> PollerHandle {
        let store = Arc::clone(&self.store);
        let interval = self.interval;
        let max_backoff = self.max_backoff;

        PollerHandle::spawn(move |mut stop, wake| async move {
            tracing::info!(interval_secs = interval.as_secs(), "Claims poller started");
            let mut failures = 0u32;
            loop {
                match store.refresh().await {
                    Ok(RefreshOutcome::Completed) => failures = 0,
                    Ok(RefreshOutcome::Coalesced) => {}
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        tracing::warn!(error = %e, failures, "Poll failed");
                    }
                }
                let delay = backoff_delay(interval, max_backoff, failures);
                if !pause(delay, &mut stop, &wake).await {
                    break;
                }
            }
            tracing::info!("Claims poller stopped");
        })
    }

    /// Poll one claim until it reaches a terminal status, disappears, or
    /// the handle is stopped.
    pub fn watch_claim(&self, claim_id: impl Into<String>) -> PollerHandle {
        let store = Arc::clone(&self.store);
        let claim_id = claim_id.into();
        let interval = self.watch_interval;
        let max_backoff = self.max_backoff;

        PollerHandle::spawn(move |mut stop, wake| async move {
            let mut failures = 0u32;
            loop {
                match store.refresh_claim_by_id(&claim_id).await {
                    Ok(claim) if claim.status.is_terminal() => {
                        tracing::info!(claim_id = %claim_id, status = %claim.status, "Claim closed, watch ended");
                        break;
                    }
                    Ok(_) => failures = 0,
                    Err(e) if e.kind == PortalErrorKind::NotFound => {
                        tracing::warn!(claim_id = %claim_id, "Watched claim no longer exists");
                        break;
                    }
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        tracing::warn!(claim_id = %claim_id, error = %e, failures, "Claim poll failed");
                    }
                }
                let delay = backoff_delay(interval, max_backoff, failures);
                if !pause(delay, &mut stop, &wake).await {
                    break;
                }
            }
        })
    }
}
