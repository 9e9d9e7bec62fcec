//! Periodic background maintenance.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::channel::PollRegistry;
use crate::store::TripStore;

/// `tokio::time::interval` panics on a zero period.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Spawn a task that expires pending offers past their deadline.
pub fn spawn_offer_sweep(
    store: Arc<dyn TripStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval.max(MIN_PERIOD));
        timer.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match store.expire_stale_offers(Utc::now()).await {
                        Ok(expired) if expired > 0 => info!(expired, "Expired stale ride offers"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Offer expiry sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("Offer sweep shutting down");
                    return;
                }
            }
        }
    })
}

/// Spawn a task that closes long-poll sessions nobody has polled recently.
pub fn spawn_poll_reaper(
    polls: Arc<PollRegistry>,
    interval: Duration,
    idle_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval.max(MIN_PERIOD));
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    polls.reap_idle(idle_timeout);
                }
                _ = shutdown.changed() => return,
            }
        }
    })
}
