//! The two periodic jobs: the per-tick reminder scan and the once-daily
//! digest. Both take their collaborators (store, notifier, clock) as explicit
//! parameters; there is no ambient state.

pub mod digest;
pub mod scan;

pub use digest::{run_daily_digest, DigestOutcome};
pub use scan::{run_reminder_scan, ScanOutcome, ADVANCE_CEILING};
