use crate::domain::payment::DEFAULT_PAYMENT_METHOD;
use std::time::Duration;

/// How the completed-payment ledger row is written relative to the PAID
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LedgerWrite {
    /// Same atomic unit as the status change.
    #[default]
    Atomic,
    /// After the status change; failures are queued for retry.
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Recorded as `method` on every ledger row.
    pub payment_method: String,
    pub ledger_write: LedgerWrite,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
            ledger_write: LedgerWrite::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// Delay between polls of the retry outbox.
    pub interval: Duration,
    /// How long a claimed job stays invisible to other workers.
    pub lease: Duration,
    pub batch_size: usize,
    /// Attempts before a job is retired as dead.
    pub max_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "retry-worker".to_string(),
            interval: Duration::from_secs(10),
            lease: Duration::from_secs(30),
            batch_size: 32,
            max_attempts: 5,
        }
    }
}
