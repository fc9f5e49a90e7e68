//! The daily digest: one message per owner summarizing overdue and due-today
//! tasks, sent at a fixed local hour.

use chrono::Duration;

use crate::clock::{self, Clock};
use crate::error::CoreError;
use crate::models::Task;
use crate::notify::{Delivery, Notifier};
use crate::store::TaskStore;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DigestOutcome {
    pub digests_sent: usize,
    /// Owners with open tasks but nothing overdue or due today.
    pub owners_skipped: usize,
    pub failures: usize,
}

/// Runs one digest pass over all owners with open tasks.
///
/// Per-owner failures (store or delivery) are logged and discarded so one
/// owner never blocks the rest. The digest only reads task state; it writes
/// nothing.
pub async fn run_daily_digest<S, N, C>(
    store: &S,
    notifier: &N,
    clock: &C,
) -> Result<DigestOutcome, CoreError>
where
    S: TaskStore + ?Sized,
    N: Notifier + ?Sized,
    C: Clock + ?Sized,
{
    let now = clock.now();
    let today = clock::local_midnight(now);
    let tomorrow = today + Duration::days(1);

    let mut outcome = DigestOutcome::default();
    for owner in store.owners_with_open_tasks().await? {
        match digest_for_owner(store, notifier, owner, today, tomorrow).await {
            Ok(Some(Delivery::Delivered)) => outcome.digests_sent += 1,
            Ok(Some(Delivery::Failed(reason))) => {
                outcome.failures += 1;
                tracing::warn!(owner, %reason, "digest delivery failed");
            }
            Ok(None) => outcome.owners_skipped += 1,
            Err(e) => {
                outcome.failures += 1;
                tracing::warn!(owner, error = %e, "digest pass failed for owner");
            }
        }
    }
    Ok(outcome)
}

/// `Ok(None)` when the owner has nothing overdue and nothing due today.
async fn digest_for_owner<S, N>(
    store: &S,
    notifier: &N,
    owner: i64,
    today: chrono::DateTime<chrono_tz::Tz>,
    tomorrow: chrono::DateTime<chrono_tz::Tz>,
) -> Result<Option<Delivery>, CoreError>
where
    S: TaskStore + ?Sized,
    N: Notifier + ?Sized,
{
    let overdue = store.open_tasks_in_range(owner, None, today).await?;
    let due_today = store.open_tasks_in_range(owner, Some(today), tomorrow).await?;
    if overdue.is_empty() && due_today.is_empty() {
        return Ok(None);
    }
    let text = digest_text(&overdue, &due_today);
    Ok(Some(notifier.send(owner, &text).await))
}

/// Overdue section first, then due-today, each task one summary line.
fn digest_text(overdue: &[Task], due_today: &[Task]) -> String {
    let mut lines = vec!["Daily task digest:".to_string()];
    if !overdue.is_empty() {
        lines.push("Overdue:".to_string());
        lines.extend(overdue.iter().map(summary_line));
    }
    if !due_today.is_empty() {
        if !overdue.is_empty() {
            lines.push(String::new());
        }
        lines.push("Due today:".to_string());
        lines.extend(due_today.iter().map(summary_line));
    }
    lines.join("\n")
}

fn summary_line(task: &Task) -> String {
    let due = task
        .due_at
        .map(|d| clock::format_stored(&d))
        .unwrap_or_else(|| "—".to_string());
    format!("— #{} {} (due {})", task.id, task.title, due)
}
