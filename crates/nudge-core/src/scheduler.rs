//! Process-wide job scheduling: the per-tick reminder scan and the
//! once-daily digest, each with at most one in-flight instance.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use tokio::time::MissedTickBehavior;

use crate::clock::{self, Clock};
use crate::jobs::{run_daily_digest, run_reminder_scan};
use crate::notify::Notifier;
use crate::store::TaskStore;

/// Owns the two job loops. Constructed once by the process entry point with
/// explicit collaborators; the engine keeps no static state.
pub struct Scheduler<S, N, C> {
    store: Arc<S>,
    notifier: Arc<N>,
    clock: Arc<C>,
    scan_interval: StdDuration,
    digest_hour: u32,
}

impl<S, N, C> Scheduler<S, N, C>
where
    S: TaskStore + 'static,
    N: Notifier + 'static,
    C: Clock + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        clock: Arc<C>,
        scan_interval: StdDuration,
        digest_hour: u32,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            scan_interval,
            digest_hour,
        }
    }

    /// Runs both job loops until the process is stopped. The loops may run
    /// concurrently with each other (they write disjoint columns; the digest
    /// writes nothing), but neither ever overlaps itself.
    pub async fn run(self) {
        let scan = tokio::spawn(scan_loop(
            self.store.clone(),
            self.notifier.clone(),
            self.clock.clone(),
            self.scan_interval,
        ));
        let digest = tokio::spawn(digest_loop(
            self.store,
            self.notifier,
            self.clock,
            self.digest_hour,
        ));
        let _ = tokio::join!(scan, digest);
    }
}

async fn scan_loop<S, N, C>(store: Arc<S>, notifier: Arc<N>, clock: Arc<C>, every: StdDuration)
where
    S: TaskStore,
    N: Notifier,
    C: Clock,
{
    let mut ticker = tokio::time::interval(every);
    // Coalesce overlapping ticks: a slow scan skips missed ticks instead of
    // bursting, so at most one scan is ever in flight.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        match run_reminder_scan(store.as_ref(), notifier.as_ref(), clock.as_ref()).await {
            Ok(outcome) if outcome.is_quiet() => {
                tracing::debug!("reminder scan: nothing to do");
            }
            Ok(outcome) => {
                tracing::info!(
                    lead = outcome.lead_sent,
                    due = outcome.due_sent,
                    advanced = outcome.advanced,
                    stalled = outcome.stalled,
                    failed = outcome.delivery_failures,
                    "reminder scan finished"
                );
            }
            Err(e) => tracing::error!(error = %e, "reminder scan failed"),
        }
    }
}

async fn digest_loop<S, N, C>(store: Arc<S>, notifier: Arc<N>, clock: Arc<C>, hour: u32)
where
    S: TaskStore,
    N: Notifier,
    C: Clock,
{
    loop {
        let now = clock.now();
        let next = next_digest_instant(now, hour);
        let wait = (next - now).to_std().unwrap_or(StdDuration::ZERO);
        tracing::debug!(at = %clock::format_stored(&next), "next digest scheduled");
        tokio::time::sleep(wait).await;

        match run_daily_digest(store.as_ref(), notifier.as_ref(), clock.as_ref()).await {
            Ok(outcome) => tracing::info!(
                sent = outcome.digests_sent,
                skipped = outcome.owners_skipped,
                failed = outcome.failures,
                "daily digest finished"
            ),
            Err(e) => tracing::error!(error = %e, "daily digest failed"),
        }
    }
}

/// The next local `hour:00` strictly after `now`.
fn next_digest_instant(now: DateTime<Tz>, hour: u32) -> DateTime<Tz> {
    let today = clock::local_midnight(now) + Duration::hours(i64::from(hour));
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}
