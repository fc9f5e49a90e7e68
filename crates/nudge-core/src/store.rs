//! Durable task and settings storage.
//!
//! The engine only ever sees the typed records from [`crate::models`]; all
//! TEXT-timestamp and rule-string conversion happens here, through the clock
//! module's parse/format pair.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use sqlx::{FromRow, Sqlite, Transaction};

use crate::clock::{self, Clock};
use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{DueOutcome, LeadCandidate, NewTaskData, Task, UserSettings};
use crate::recurrence::Rule;

#[async_trait]
pub trait TaskStore: Send + Sync {
    // CRUD consumed by the surrounding command layer.
    async fn add_task(&self, data: NewTaskData) -> Result<Task, CoreError>;
    async fn find_task(&self, id: i64) -> Result<Option<Task>, CoreError>;
    async fn delete_task(&self, id: i64) -> Result<(), CoreError>;
    /// Completes a task. A recurring task with a due time advances to the
    /// next occurrence strictly after its current due time and stays open
    /// with both notified timestamps cleared; anything else is marked done.
    async fn complete_task(&self, id: i64) -> Result<Task, CoreError>;
    /// Sets a new due time and clears both notified timestamps
    /// unconditionally. Every due-time mutation must uphold this re-arm.
    async fn reschedule_task(&self, id: i64, due_at: DateTime<Tz>) -> Result<Task, CoreError>;
    async fn set_recurrence(&self, id: i64, rule: Option<Rule>) -> Result<Task, CoreError>;
    async fn set_lead_minutes(&self, id: i64, minutes: Option<i64>) -> Result<Task, CoreError>;
    async fn set_category(&self, id: i64, category: Option<String>) -> Result<Task, CoreError>;

    // Reminder scan queries and pass commits.
    /// Open tasks with a due time and no lead stamp, joined with the owner's
    /// default lead minutes. The timing check happens in the scan because the
    /// effective lead differs per task.
    async fn lead_candidates(&self) -> Result<Vec<LeadCandidate>, CoreError>;
    /// Open tasks with `due_at <= now` and no due stamp, ascending by due.
    async fn due_tasks(&self, now: DateTime<Tz>) -> Result<Vec<Task>, CoreError>;
    /// Stamps `lead_notified_at` for a whole lead pass in one transaction.
    async fn mark_lead_notified(&self, ids: &[i64], at: DateTime<Tz>) -> Result<(), CoreError>;
    /// Applies a whole due pass in one transaction; each advance writes
    /// `due_at` and clears both notified timestamps atomically.
    async fn apply_due_outcomes(
        &self,
        outcomes: &[(i64, DueOutcome)],
        at: DateTime<Tz>,
    ) -> Result<(), CoreError>;

    // Digest queries.
    async fn owners_with_open_tasks(&self) -> Result<Vec<i64>, CoreError>;
    /// Open tasks for `owner` with `from <= due_at < to` (`from = None` means
    /// unbounded below), ascending by due time.
    async fn open_tasks_in_range(
        &self,
        owner: i64,
        from: Option<DateTime<Tz>>,
        to: DateTime<Tz>,
    ) -> Result<Vec<Task>, CoreError>;

    // Per-owner settings.
    async fn user_settings(&self, owner: i64) -> Result<UserSettings, CoreError>;
    async fn set_default_lead_minutes(
        &self,
        owner: i64,
        minutes: Option<i64>,
    ) -> Result<(), CoreError>;
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: i64,
    owner_id: i64,
    title: String,
    category: Option<String>,
    due_at: Option<String>,
    completed: bool,
    created_at: String,
    lead_minutes: Option<i64>,
    lead_notified_at: Option<String>,
    due_notified_at: Option<String>,
    recurrence: Option<String>,
}

#[derive(Debug, FromRow)]
struct LeadRow {
    #[sqlx(flatten)]
    task: TaskRow,
    owner_default_lead_minutes: Option<i64>,
}

pub struct SqliteStore {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    fn tz(&self) -> Tz {
        self.clock.timezone()
    }

    fn to_task(&self, row: TaskRow) -> Result<Task, CoreError> {
        let parse_opt = |text: Option<String>| -> Result<Option<DateTime<Tz>>, CoreError> {
            text.map(|t| clock::parse_stored(&t, self.tz())).transpose()
        };
        Ok(Task {
            id: row.id,
            owner: row.owner_id,
            title: row.title,
            category: row.category,
            due_at: parse_opt(row.due_at)?,
            completed: row.completed,
            created_at: clock::parse_stored(&row.created_at, self.tz())?,
            lead_minutes: row.lead_minutes,
            lead_notified_at: parse_opt(row.lead_notified_at)?,
            due_notified_at: parse_opt(row.due_notified_at)?,
            recurrence: row.recurrence.map(|r| r.parse()).transpose()?,
        })
    }

    async fn fetch_task_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: i64,
    ) -> Result<Task, CoreError> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        row.map(|r| self.to_task(r))
            .transpose()?
            .ok_or(CoreError::NotFound(id))
    }

    /// Runs a single-column update that re-reads the row, mapping a missing
    /// row to `NotFound`.
    async fn update_returning(
        &self,
        sql: &str,
        value: Option<String>,
        id: i64,
    ) -> Result<Task, CoreError> {
        let row: Option<TaskRow> = sqlx::query_as(sql)
            .bind(value)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| self.to_task(r))
            .transpose()?
            .ok_or(CoreError::NotFound(id))
    }

    /// Open tasks with a due time for one owner, parsed and sorted ascending.
    async fn open_due_tasks_for_owner(&self, owner: i64) -> Result<Vec<Task>, CoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE owner_id = $1 AND completed = 0 AND due_at IS NOT NULL",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        let mut tasks = rows
            .into_iter()
            .map(|r| self.to_task(r))
            .collect::<Result<Vec<_>, _>>()?;
        tasks.sort_by_key(|t| t.due_at);
        Ok(tasks)
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn add_task(&self, data: NewTaskData) -> Result<Task, CoreError> {
        if data.title.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "Task title must not be empty.".to_string(),
            ));
        }
        let created_at = self.clock.now();
        let row: TaskRow = sqlx::query_as(
            r#"INSERT INTO tasks
                (owner_id, title, category, due_at, completed, created_at, lead_minutes, recurrence)
            VALUES ($1, $2, $3, $4, 0, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(data.owner)
        .bind(data.title.trim())
        .bind(&data.category)
        .bind(data.due_at.as_ref().map(clock::format_stored))
        .bind(clock::format_stored(&created_at))
        .bind(data.lead_minutes)
        .bind(data.recurrence.map(|r| r.to_string()))
        .fetch_one(&self.pool)
        .await?;
        self.to_task(row)
    }

    async fn find_task(&self, id: i64) -> Result<Option<Task>, CoreError> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| self.to_task(r)).transpose()
    }

    async fn delete_task(&self, id: i64) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(id));
        }
        Ok(())
    }

    async fn complete_task(&self, id: i64) -> Result<Task, CoreError> {
        let mut tx = self.pool.begin().await?;
        let task = self.fetch_task_in_tx(&mut tx, id).await?;

        let updated = match (task.recurrence, task.due_at) {
            (Some(rule), Some(due)) => {
                // Advance from the current due time, not from "now": completing
                // early must not skip the scheduled occurrence.
                let next = rule.next(due);
                let row: TaskRow = sqlx::query_as(
                    r#"UPDATE tasks
                    SET due_at = $1, lead_notified_at = NULL, due_notified_at = NULL
                    WHERE id = $2
                    RETURNING *
                    "#,
                )
                .bind(clock::format_stored(&next))
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
                self.to_task(row)?
            }
            _ => {
                let row: TaskRow =
                    sqlx::query_as("UPDATE tasks SET completed = 1 WHERE id = $1 RETURNING *")
                        .bind(id)
                        .fetch_one(&mut *tx)
                        .await?;
                self.to_task(row)?
            }
        };

        tx.commit().await?;
        Ok(updated)
    }

    async fn reschedule_task(&self, id: i64, due_at: DateTime<Tz>) -> Result<Task, CoreError> {
        self.update_returning(
            r#"UPDATE tasks
            SET due_at = $1, lead_notified_at = NULL, due_notified_at = NULL
            WHERE id = $2
            RETURNING *
            "#,
            Some(clock::format_stored(&due_at)),
            id,
        )
        .await
    }

    async fn set_recurrence(&self, id: i64, rule: Option<Rule>) -> Result<Task, CoreError> {
        self.update_returning(
            "UPDATE tasks SET recurrence = $1 WHERE id = $2 RETURNING *",
            rule.map(|r| r.to_string()),
            id,
        )
        .await
    }

    async fn set_lead_minutes(&self, id: i64, minutes: Option<i64>) -> Result<Task, CoreError> {
        let row: Option<TaskRow> =
            sqlx::query_as("UPDATE tasks SET lead_minutes = $1 WHERE id = $2 RETURNING *")
                .bind(minutes)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|r| self.to_task(r))
            .transpose()?
            .ok_or(CoreError::NotFound(id))
    }

    async fn set_category(&self, id: i64, category: Option<String>) -> Result<Task, CoreError> {
        self.update_returning(
            "UPDATE tasks SET category = $1 WHERE id = $2 RETURNING *",
            category,
            id,
        )
        .await
    }

    async fn lead_candidates(&self) -> Result<Vec<LeadCandidate>, CoreError> {
        let rows: Vec<LeadRow> = sqlx::query_as(
            r#"SELECT t.*, us.default_lead_minutes AS owner_default_lead_minutes
            FROM tasks t
            LEFT JOIN user_settings us ON us.owner_id = t.owner_id
            WHERE t.completed = 0 AND t.due_at IS NOT NULL AND t.lead_notified_at IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                Ok(LeadCandidate {
                    task: self.to_task(r.task)?,
                    owner_default_lead_minutes: r.owner_default_lead_minutes,
                })
            })
            .collect()
    }

    async fn due_tasks(&self, now: DateTime<Tz>) -> Result<Vec<Task>, CoreError> {
        // The due comparison happens on parsed instants, not on the stored
        // text, so rows written under a different UTC offset compare
        // correctly. The unnotified set this scans is small.
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"SELECT * FROM tasks
            WHERE completed = 0 AND due_at IS NOT NULL AND due_notified_at IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let mut tasks = rows
            .into_iter()
            .map(|r| self.to_task(r))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|t| t.due_at.is_some_and(|due| due <= now))
            .collect::<Vec<_>>();
        tasks.sort_by_key(|t| t.due_at);
        Ok(tasks)
    }

    async fn mark_lead_notified(&self, ids: &[i64], at: DateTime<Tz>) -> Result<(), CoreError> {
        let stamp = clock::format_stored(&at);
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("UPDATE tasks SET lead_notified_at = $1 WHERE id = $2")
                .bind(&stamp)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn apply_due_outcomes(
        &self,
        outcomes: &[(i64, DueOutcome)],
        at: DateTime<Tz>,
    ) -> Result<(), CoreError> {
        let stamp = clock::format_stored(&at);
        let mut tx = self.pool.begin().await?;
        for (id, outcome) in outcomes {
            match outcome {
                DueOutcome::Stamp => {
                    sqlx::query("UPDATE tasks SET due_notified_at = $1 WHERE id = $2")
                        .bind(&stamp)
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                }
                DueOutcome::Advance(next) => {
                    sqlx::query(
                        r#"UPDATE tasks
                        SET due_at = $1, lead_notified_at = NULL, due_notified_at = NULL
                        WHERE id = $2
                        "#,
                    )
                    .bind(clock::format_stored(next))
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn owners_with_open_tasks(&self) -> Result<Vec<i64>, CoreError> {
        let owners =
            sqlx::query_scalar("SELECT DISTINCT owner_id FROM tasks WHERE completed = 0")
                .fetch_all(&self.pool)
                .await?;
        Ok(owners)
    }

    async fn open_tasks_in_range(
        &self,
        owner: i64,
        from: Option<DateTime<Tz>>,
        to: DateTime<Tz>,
    ) -> Result<Vec<Task>, CoreError> {
        let tasks = self.open_due_tasks_for_owner(owner).await?;
        Ok(tasks
            .into_iter()
            .filter(|t| {
                t.due_at.is_some_and(|due| {
                    due < to && from.map_or(true, |lower| due >= lower)
                })
            })
            .collect())
    }

    async fn user_settings(&self, owner: i64) -> Result<UserSettings, CoreError> {
        let minutes: Option<Option<i64>> = sqlx::query_scalar(
            "SELECT default_lead_minutes FROM user_settings WHERE owner_id = $1",
        )
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        Ok(UserSettings {
            owner,
            default_lead_minutes: minutes.flatten(),
        })
    }

    async fn set_default_lead_minutes(
        &self,
        owner: i64,
        minutes: Option<i64>,
    ) -> Result<(), CoreError> {
        if let Some(m) = minutes {
            if !(0..=1440).contains(&m) {
                return Err(CoreError::InvalidInput(format!(
                    "Default lead minutes must be within 0..=1440, got {m}."
                )));
            }
        }
        sqlx::query(
            r#"INSERT INTO user_settings (owner_id, default_lead_minutes) VALUES ($1, $2)
            ON CONFLICT(owner_id) DO UPDATE SET default_lead_minutes = excluded.default_lead_minutes
            "#,
        )
        .bind(owner)
        .bind(minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
