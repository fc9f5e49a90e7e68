use chrono::DateTime;
use chrono_tz::Tz;

use crate::recurrence::Rule;

/// One user's actionable item.
///
/// The two notified timestamps are set at most once per occurrence: any
/// mutation of `due_at` (manual reschedule, recurrence advance) clears both so
/// the new occurrence is treated as fresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// Unique, immutable, assigned at creation.
    pub id: i64,
    /// Owning user; every query is scoped by owner.
    pub owner: i64,
    pub title: String,
    pub category: Option<String>,
    /// Minute precision in the deployment timezone. `None` means no deadline
    /// and disables both reminder paths.
    pub due_at: Option<DateTime<Tz>>,
    pub completed: bool,
    pub created_at: DateTime<Tz>,
    /// Task-level lead override in minutes. `None` falls back to the owner
    /// default; 0 fires coincident with the due time; negative disables.
    pub lead_minutes: Option<i64>,
    pub lead_notified_at: Option<DateTime<Tz>>,
    pub due_notified_at: Option<DateTime<Tz>>,
    pub recurrence: Option<Rule>,
}

/// Per-owner settings, one lazily created row per user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSettings {
    pub owner: i64,
    /// Fallback lead time when a task has no override, 0..=1440.
    pub default_lead_minutes: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct NewTaskData {
    pub owner: i64,
    pub title: String,
    pub category: Option<String>,
    pub due_at: Option<DateTime<Tz>>,
    pub lead_minutes: Option<i64>,
    pub recurrence: Option<Rule>,
}

/// An open task awaiting its lead-time reminder, joined with its owner's
/// default lead minutes.
#[derive(Debug, Clone)]
pub struct LeadCandidate {
    pub task: Task,
    pub owner_default_lead_minutes: Option<i64>,
}

impl LeadCandidate {
    /// Task-level override if present, else the owner default, else `None`
    /// (lead reminders disabled). A present override always wins, including a
    /// negative (disabling) one.
    pub fn effective_lead_minutes(&self) -> Option<i64> {
        self.task.lead_minutes.or(self.owner_default_lead_minutes)
    }
}

/// How the due-time pass resolves one fired task. Applied atomically by the
/// store so a reader never observes a half-applied advance.
#[derive(Debug, Clone, PartialEq)]
pub enum DueOutcome {
    /// Stamp `due_notified_at`; the task stays open (non-recurring tasks, and
    /// recurring tasks whose advance stalled).
    Stamp,
    /// Roll `due_at` forward to the next future occurrence and clear both
    /// notified timestamps.
    Advance(DateTime<Tz>),
}
