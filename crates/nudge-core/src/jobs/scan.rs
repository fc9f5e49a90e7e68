//! The reminder scan: one pass over open tasks per tick, firing lead-time and
//! due-time notifications at most once each and advancing recurring tasks.

use chrono::{DateTime, Duration};
use chrono_tz::Tz;

use crate::clock::{self, Clock};
use crate::error::CoreError;
use crate::models::{DueOutcome, Task};
use crate::notify::{Delivery, Notifier};
use crate::recurrence::Rule;
use crate::store::TaskStore;

/// Upper bound on `next()` applications when rolling a recurring task past
/// "now". A task due years in the past with a small interval must terminate,
/// not spin; exhausting the ceiling stalls the task instead.
pub const ADVANCE_CEILING: usize = 1000;

/// Counters from one scan invocation, for logging and operational visibility.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Lead-time notifications attempted (delivered or not, each stamps).
    pub lead_sent: usize,
    /// Due-time notifications attempted.
    pub due_sent: usize,
    /// Recurring tasks rolled forward to a future occurrence.
    pub advanced: usize,
    /// Recurring tasks that exhausted the advance ceiling and were frozen.
    pub stalled: usize,
    pub delivery_failures: usize,
}

impl ScanOutcome {
    pub fn is_quiet(&self) -> bool {
        *self == ScanOutcome::default()
    }
}

/// Runs one reminder scan tick.
///
/// "Now" is snapshotted once, minute-truncated, and reused for every
/// comparison in the tick. The lead pass and the due pass each commit their
/// writes in a single transaction. Delivery failures are logged and swallowed
/// per message; they never abort the tick and never prevent stamping, so a
/// failed delivery is a permanently missed notification rather than a retry
/// (at-most-once per occurrence).
pub async fn run_reminder_scan<S, N, C>(
    store: &S,
    notifier: &N,
    clock: &C,
) -> Result<ScanOutcome, CoreError>
where
    S: TaskStore + ?Sized,
    N: Notifier + ?Sized,
    C: Clock + ?Sized,
{
    let now = clock.now();
    let mut outcome = ScanOutcome::default();

    // Lead pass.
    let mut lead_stamps = Vec::new();
    for candidate in store.lead_candidates().await? {
        let Some(minutes) = candidate.effective_lead_minutes() else {
            continue;
        };
        if minutes < 0 {
            continue;
        }
        let Some(due) = candidate.task.due_at else {
            continue;
        };
        // An override large enough to overflow the duration or the datetime
        // cannot produce a meaningful threshold; skip it instead of letting
        // one bad row take down every tick.
        let lead_time = match Duration::try_minutes(minutes).and_then(|d| due.checked_sub_signed(d))
        {
            Some(t) => t,
            None => {
                tracing::warn!(
                    task = candidate.task.id,
                    minutes,
                    "lead minutes out of range; skipping lead reminder"
                );
                continue;
            }
        };
        if now < lead_time {
            continue;
        }
        let task = &candidate.task;
        if let Delivery::Failed(reason) = notifier.send(task.owner, &lead_text(task, due, minutes)).await {
            outcome.delivery_failures += 1;
            tracing::warn!(task = task.id, owner = task.owner, %reason, "lead reminder delivery failed");
        }
        lead_stamps.push(task.id);
        outcome.lead_sent += 1;
    }
    if !lead_stamps.is_empty() {
        store.mark_lead_notified(&lead_stamps, now).await?;
    }

    // Due pass.
    let mut resolutions = Vec::new();
    for task in store.due_tasks(now).await? {
        if let Delivery::Failed(reason) = notifier.send(task.owner, &due_text(&task)).await {
            outcome.delivery_failures += 1;
            tracing::warn!(task = task.id, owner = task.owner, %reason, "due reminder delivery failed");
        }
        outcome.due_sent += 1;

        let resolution = match (task.recurrence, task.due_at) {
            (Some(rule), Some(due)) => match advance_past(rule, due, now) {
                Some(next) => {
                    outcome.advanced += 1;
                    DueOutcome::Advance(next)
                }
                None => {
                    outcome.stalled += 1;
                    tracing::warn!(
                        task = task.id,
                        rule = %rule,
                        "recurrence advance exhausted its ceiling; task frozen with stale due time"
                    );
                    DueOutcome::Stamp
                }
            },
            _ => DueOutcome::Stamp,
        };
        resolutions.push((task.id, resolution));
    }
    if !resolutions.is_empty() {
        store.apply_due_outcomes(&resolutions, now).await?;
    }

    Ok(outcome)
}

/// Applies `next()` from the current due time until the result is strictly
/// greater than `now`, or `None` when the ceiling is exhausted.
fn advance_past(rule: Rule, from: DateTime<Tz>, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
    let mut next = from;
    for _ in 0..ADVANCE_CEILING {
        next = rule.next(next);
        if next > now {
            return Some(next);
        }
    }
    None
}

fn lead_text(task: &Task, due: DateTime<Tz>, minutes: i64) -> String {
    format!(
        "Reminder: task #{} — \"{}\"\nDue: {} ({} min ahead)",
        task.id,
        task.title,
        clock::format_stored(&due),
        minutes,
    )
}

fn due_text(task: &Task) -> String {
    let due = task
        .due_at
        .map(|d| clock::format_stored(&d))
        .unwrap_or_else(|| "—".to_string());
    format!(
        "Task #{} — \"{}\" is now due.\nDue: {}",
        task.id, task.title, due,
    )
}
