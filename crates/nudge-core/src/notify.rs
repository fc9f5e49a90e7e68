use async_trait::async_trait;

/// Per-message delivery result. Failure is a value inspected (and usually
/// discarded) by the caller, never an error that escapes a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed(String),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

/// Delivers a message to one user. Best-effort: implementations report
/// failure through [`Delivery`] and must not panic, so one recipient's
/// failure never blocks the rest of a pass.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, owner: i64, text: &str) -> Delivery;
}

/// Prints notifications to stdout. Stands in for a real delivery channel in
/// local deployments; the jobs only ever talk to the [`Notifier`] trait.
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn send(&self, owner: i64, text: &str) -> Delivery {
        println!("→ owner {owner}\n{text}\n");
        Delivery::Delivered
    }
}
