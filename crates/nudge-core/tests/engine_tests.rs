//! End-to-end engine tests: reminder scan and daily digest against a real
//! SQLite store, with a settable clock and a recording notifier.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Asia::Tashkent;
use chrono_tz::Tz;
use tempfile::TempDir;

use nudge_core::clock::{parse_stored, Clock, SystemClock};
use nudge_core::db::{establish_connection, DbPool};
use nudge_core::jobs::{run_daily_digest, run_reminder_scan};
use nudge_core::models::NewTaskData;
use nudge_core::notify::{Delivery, Notifier};
use nudge_core::store::{SqliteStore, TaskStore};

fn instant(s: &str) -> DateTime<Tz> {
    parse_stored(s, Tashkent).expect("valid test instant")
}

struct FixedClock(Mutex<DateTime<Tz>>);

impl FixedClock {
    fn at(s: &str) -> Self {
        Self(Mutex::new(instant(s)))
    }

    fn set(&self, s: &str) {
        *self.0.lock().unwrap() = instant(s);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        *self.0.lock().unwrap()
    }

    fn timezone(&self) -> Tz {
        Tashkent
    }
}

/// Records every send; fails delivery for the listed owners.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(i64, String)>>,
    fail_owners: Vec<i64>,
}

impl RecordingNotifier {
    fn failing_for(owners: &[i64]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_owners: owners.to_vec(),
        }
    }

    fn messages(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, owner: i64, text: &str) -> Delivery {
        self.sent.lock().unwrap().push((owner, text.to_string()));
        if self.fail_owners.contains(&owner) {
            Delivery::Failed("unreachable".to_string())
        } else {
            Delivery::Delivered
        }
    }
}

async fn setup() -> (SqliteStore, DbPool, TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.db");
    let pool = establish_connection(&path.to_string_lossy())
        .await
        .expect("test database");
    let store = SqliteStore::new(pool.clone(), Arc::new(SystemClock::new(Tashkent)));
    (store, pool, dir)
}

fn new_task(owner: i64, title: &str, due: Option<&str>) -> NewTaskData {
    NewTaskData {
        owner,
        title: title.to_string(),
        due_at: due.map(instant),
        ..Default::default()
    }
}

#[tokio::test]
async fn lead_then_due_scenario() {
    let (store, _pool, _dir) = setup().await;
    let notifier = RecordingNotifier::default();
    let clock = FixedClock::at("2025-01-10T16:59+05:00");

    let mut data = new_task(1, "Workout", Some("2025-01-10T18:00+05:00"));
    data.lead_minutes = Some(60);
    let task = store.add_task(data).await.unwrap();

    // One minute before the lead time: nothing fires.
    let outcome = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert!(outcome.is_quiet());
    assert_eq!(notifier.count(), 0);

    // Exactly at the lead time: the lead notification fires once.
    clock.set("2025-01-10T17:00+05:00");
    let outcome = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert_eq!(outcome.lead_sent, 1);
    assert_eq!(outcome.due_sent, 0);
    assert_eq!(notifier.count(), 1);
    assert!(notifier.messages()[0].1.contains("60 min ahead"));

    let task_now = store.find_task(task.id).await.unwrap().unwrap();
    assert_eq!(task_now.lead_notified_at, Some(instant("2025-01-10T17:00+05:00")));

    // At the due time: the due notification fires; the task stays open.
    clock.set("2025-01-10T18:00+05:00");
    let outcome = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert_eq!(outcome.due_sent, 1);
    assert_eq!(notifier.count(), 2);
    assert!(notifier.messages()[1].1.contains("is now due"));

    let task_now = store.find_task(task.id).await.unwrap().unwrap();
    assert!(!task_now.completed);
    assert_eq!(task_now.due_notified_at, Some(instant("2025-01-10T18:00+05:00")));
}

#[tokio::test]
async fn task_without_due_is_never_selected() {
    let (store, _pool, _dir) = setup().await;
    let notifier = RecordingNotifier::default();
    let clock = FixedClock::at("2025-06-01T12:00+05:00");

    let mut data = new_task(1, "Someday", None);
    data.lead_minutes = Some(60);
    data.recurrence = Some("FREQ=DAILY".parse().unwrap());
    store.add_task(data).await.unwrap();
    store.set_default_lead_minutes(1, Some(30)).await.unwrap();

    let outcome = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert!(outcome.is_quiet());
    assert_eq!(notifier.count(), 0);
}

#[tokio::test]
async fn scan_is_idempotent_within_a_minute() {
    let (store, _pool, _dir) = setup().await;
    let notifier = RecordingNotifier::default();
    let clock = FixedClock::at("2025-01-10T18:00+05:00");

    let mut recurring = new_task(1, "Recurring", Some("2025-01-10T18:00+05:00"));
    recurring.recurrence = Some("FREQ=DAILY".parse().unwrap());
    store.add_task(recurring).await.unwrap();
    let mut leaded = new_task(2, "Leaded", Some("2025-01-10T19:00+05:00"));
    leaded.lead_minutes = Some(60);
    store.add_task(leaded).await.unwrap();

    let first = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert_eq!(first.due_sent, 1);
    assert_eq!(first.lead_sent, 1);
    let after_first = notifier.count();

    let second = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert!(second.is_quiet());
    assert_eq!(notifier.count(), after_first);
}

#[tokio::test]
async fn lead_pass_never_reselects_after_stamp_even_without_rearm() {
    let (store, pool, _dir) = setup().await;
    let notifier = RecordingNotifier::default();
    let clock = FixedClock::at("2025-01-10T17:00+05:00");

    let mut data = new_task(1, "Guarded", Some("2025-01-10T18:00+05:00"));
    data.lead_minutes = Some(60);
    let task = store.add_task(data).await.unwrap();

    run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert_eq!(notifier.count(), 1);

    // Pull the due time earlier behind the store's back, without the re-arm
    // the reschedule operation would perform.
    sqlx::query("UPDATE tasks SET due_at = '2025-01-10T17:30+05:00' WHERE id = $1")
        .bind(task.id)
        .execute(&pool)
        .await
        .unwrap();

    clock.set("2025-01-10T17:10+05:00");
    let outcome = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert_eq!(outcome.lead_sent, 0);
    assert_eq!(notifier.count(), 1);
}

#[tokio::test]
async fn recurring_task_advances_two_periods() {
    let (store, _pool, _dir) = setup().await;
    let notifier = RecordingNotifier::default();
    let clock = FixedClock::at("2025-01-04T09:00+05:00");

    let mut data = new_task(1, "Every other day", Some("2025-01-01T09:00+05:00"));
    data.recurrence = Some("FREQ=DAILY;INTERVAL=2".parse().unwrap());
    let task = store.add_task(data).await.unwrap();
    store.mark_lead_notified(&[task.id], instant("2025-01-01T08:00+05:00"))
        .await
        .unwrap();

    let outcome = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert_eq!(outcome.due_sent, 1);
    assert_eq!(outcome.advanced, 1);
    assert_eq!(outcome.stalled, 0);

    let advanced = store.find_task(task.id).await.unwrap().unwrap();
    assert_eq!(advanced.due_at, Some(instant("2025-01-05T09:00+05:00")));
    assert!(advanced.lead_notified_at.is_none());
    assert!(advanced.due_notified_at.is_none());
    assert!(!advanced.completed);
}

#[tokio::test]
async fn pathological_recurrence_stalls_deterministically() {
    let (store, _pool, _dir) = setup().await;
    let notifier = RecordingNotifier::default();
    // Over 1800 daily occurrences behind: past the advance ceiling.
    let clock = FixedClock::at("2025-01-01T09:00+05:00");

    let mut data = new_task(1, "Ancient", Some("2020-01-01T09:00+05:00"));
    data.recurrence = Some("FREQ=DAILY".parse().unwrap());
    let task = store.add_task(data).await.unwrap();

    let outcome = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert_eq!(outcome.due_sent, 1);
    assert_eq!(outcome.stalled, 1);
    assert_eq!(outcome.advanced, 0);

    // Frozen: stale due time kept, due stamp set, no further firing.
    let stalled = store.find_task(task.id).await.unwrap().unwrap();
    assert_eq!(stalled.due_at, Some(instant("2020-01-01T09:00+05:00")));
    assert_eq!(stalled.due_notified_at, Some(instant("2025-01-01T09:00+05:00")));
    assert!(!stalled.completed);

    let again = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert!(again.is_quiet());
}

#[tokio::test]
async fn zero_lead_fires_at_due_time_not_never() {
    let (store, _pool, _dir) = setup().await;
    let notifier = RecordingNotifier::default();
    let clock = FixedClock::at("2025-01-10T17:59+05:00");

    let mut data = new_task(1, "Zero lead", Some("2025-01-10T18:00+05:00"));
    data.lead_minutes = Some(0);
    store.add_task(data).await.unwrap();

    let outcome = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert!(outcome.is_quiet());

    // Redundant with the due notification but not suppressed.
    clock.set("2025-01-10T18:00+05:00");
    let outcome = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert_eq!(outcome.lead_sent, 1);
    assert_eq!(outcome.due_sent, 1);
    assert_eq!(notifier.count(), 2);
}

#[tokio::test]
async fn task_override_beats_owner_default() {
    let (store, _pool, _dir) = setup().await;
    let notifier = RecordingNotifier::default();
    let clock = FixedClock::at("2025-01-10T17:00+05:00");

    store.set_default_lead_minutes(1, Some(60)).await.unwrap();
    let mut data = new_task(1, "Short lead", Some("2025-01-10T18:00+05:00"));
    data.lead_minutes = Some(30);
    store.add_task(data).await.unwrap();

    // Owner default would fire now; the 30-minute override must not.
    let outcome = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert_eq!(outcome.lead_sent, 0);

    clock.set("2025-01-10T17:30+05:00");
    let outcome = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert_eq!(outcome.lead_sent, 1);
    assert!(notifier.messages()[0].1.contains("30 min ahead"));
}

#[tokio::test]
async fn negative_override_disables_lead_reminder() {
    let (store, _pool, _dir) = setup().await;
    let notifier = RecordingNotifier::default();
    let clock = FixedClock::at("2025-01-10T18:00+05:00");

    store.set_default_lead_minutes(1, Some(60)).await.unwrap();
    let mut data = new_task(1, "No lead", Some("2025-01-10T18:00+05:00"));
    data.lead_minutes = Some(-1);
    store.add_task(data).await.unwrap();

    let outcome = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert_eq!(outcome.lead_sent, 0);
    assert_eq!(outcome.due_sent, 1);
}

#[tokio::test]
async fn absurd_lead_override_does_not_poison_the_scan() {
    let (store, _pool, _dir) = setup().await;
    let notifier = RecordingNotifier::default();
    let clock = FixedClock::at("2025-01-10T18:00+05:00");

    // An override no duration can represent; the row persists, so every tick
    // sees it.
    let mut data = new_task(1, "Absurd lead", Some("2025-01-11T10:00+05:00"));
    data.lead_minutes = Some(i64::MAX);
    store.add_task(data).await.unwrap();
    store.add_task(new_task(2, "Due now", Some("2025-01-10T18:00+05:00")))
        .await
        .unwrap();

    let outcome = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert_eq!(outcome.lead_sent, 0);
    assert_eq!(outcome.due_sent, 1);
    assert_eq!(notifier.count(), 1);
    assert_eq!(notifier.messages()[0].0, 2);

    // Still harmless on the next tick.
    clock.set("2025-01-10T18:01+05:00");
    let again = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert!(again.is_quiet());
}

#[tokio::test]
async fn delivery_failure_still_stamps_and_is_not_retried() {
    let (store, _pool, _dir) = setup().await;
    let notifier = RecordingNotifier::failing_for(&[1]);
    let clock = FixedClock::at("2025-01-10T18:00+05:00");

    let mut data = new_task(1, "Unreachable owner", Some("2025-01-10T18:30+05:00"));
    data.lead_minutes = Some(30);
    store.add_task(data).await.unwrap();
    store.add_task(new_task(1, "Due now", Some("2025-01-10T18:00+05:00")))
        .await
        .unwrap();

    let outcome = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert_eq!(outcome.lead_sent, 1);
    assert_eq!(outcome.due_sent, 1);
    assert_eq!(outcome.delivery_failures, 2);

    // Both stamps were written despite the failures: nothing re-offers.
    let again = run_reminder_scan(&store, &notifier, &clock).await.unwrap();
    assert!(again.is_quiet());
}

#[tokio::test]
async fn digest_has_overdue_then_due_today_sections() {
    let (store, _pool, _dir) = setup().await;
    let notifier = RecordingNotifier::default();
    let clock = FixedClock::at("2025-01-10T09:00+05:00");

    store.add_task(new_task(1, "Late report", Some("2025-01-09T15:00+05:00")))
        .await
        .unwrap();
    store.add_task(new_task(1, "Dentist", Some("2025-01-10T18:00+05:00")))
        .await
        .unwrap();
    // Due tomorrow: in neither section.
    store.add_task(new_task(1, "Groceries", Some("2025-01-11T10:00+05:00")))
        .await
        .unwrap();

    let outcome = run_daily_digest(&store, &notifier, &clock).await.unwrap();
    assert_eq!(outcome.digests_sent, 1);

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    let text = &messages[0].1;
    let overdue_pos = text.find("Overdue:").expect("overdue section");
    let today_pos = text.find("Due today:").expect("due-today section");
    assert!(overdue_pos < today_pos);
    assert!(text.contains("Late report"));
    assert!(text.contains("Dentist"));
    assert!(!text.contains("Groceries"));
}

#[tokio::test]
async fn digest_skips_quiet_owners() {
    let (store, _pool, _dir) = setup().await;
    let notifier = RecordingNotifier::default();
    let clock = FixedClock::at("2025-01-10T09:00+05:00");

    // Owner 1: only a completed task, not even scanned.
    let done = store.add_task(new_task(1, "Done", Some("2025-01-09T10:00+05:00")))
        .await
        .unwrap();
    store.complete_task(done.id).await.unwrap();
    // Owner 2: open tasks, but nothing overdue or due today.
    store.add_task(new_task(2, "No due", None)).await.unwrap();
    store.add_task(new_task(2, "Next week", Some("2025-01-17T10:00+05:00")))
        .await
        .unwrap();

    let outcome = run_daily_digest(&store, &notifier, &clock).await.unwrap();
    assert_eq!(outcome.digests_sent, 0);
    assert_eq!(outcome.owners_skipped, 1);
    assert_eq!(notifier.count(), 0);
}

#[tokio::test]
async fn one_owner_delivery_failure_does_not_block_others() {
    let (store, _pool, _dir) = setup().await;
    let notifier = RecordingNotifier::failing_for(&[1]);
    let clock = FixedClock::at("2025-01-10T09:00+05:00");

    store.add_task(new_task(1, "Broken channel", Some("2025-01-09T10:00+05:00")))
        .await
        .unwrap();
    store.add_task(new_task(2, "Healthy channel", Some("2025-01-09T11:00+05:00")))
        .await
        .unwrap();

    let outcome = run_daily_digest(&store, &notifier, &clock).await.unwrap();
    assert_eq!(outcome.digests_sent, 1);
    assert_eq!(outcome.failures, 1);
    assert!(notifier
        .messages()
        .iter()
        .any(|(owner, text)| *owner == 2 && text.contains("Healthy channel")));
}
