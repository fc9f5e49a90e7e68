//! # Nudge Core Library
//!
//! The reminder and recurrence engine behind the `nudged` daemon: a periodic
//! scan that fires lead-time and due-time notifications at most once per
//! occurrence, advances recurring tasks to their next future occurrence with
//! bounded iteration, and a once-daily digest of overdue and due-today tasks.
//!
//! ## Core Modules
//!
//! - [`clock`]: minute-granularity time in one deployment timezone, plus the
//!   persisted timestamp encoding
//! - [`recurrence`]: compact `FREQ/INTERVAL` rules and next-occurrence math
//! - [`models`]: typed task and settings records
//! - [`store`]: the task store trait and its SQLite implementation
//! - [`notify`]: best-effort delivery with an explicit per-message result
//! - [`jobs`]: the reminder scan and daily digest passes
//! - [`scheduler`]: the two fixed-cadence job loops
//! - [`db`]: connection and migration bootstrap
//! - [`error`]: error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use nudge_core::{
//!     clock::SystemClock, db, notify::StdoutNotifier, scheduler::Scheduler,
//!     store::SqliteStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), nudge_core::error::CoreError> {
//!     let tz = chrono_tz::Asia::Tashkent;
//!     let pool = db::establish_connection("tasks.db").await?;
//!     let clock = Arc::new(SystemClock::new(tz));
//!
//!     let scheduler = Scheduler::new(
//!         Arc::new(SqliteStore::new(pool, clock.clone())),
//!         Arc::new(StdoutNotifier),
//!         clock,
//!         Duration::from_secs(60),
//!         9,
//!     );
//!     scheduler.run().await;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod notify;
pub mod quick_due;
pub mod recurrence;
pub mod scheduler;
pub mod store;
