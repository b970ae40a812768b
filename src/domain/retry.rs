use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// The secondary effect a job re-runs.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RetryKind {
    DecrementInventory,
    RecordPayment,
    /// Ledger rows of a cancelled order's payment still to be marked failed.
    MarkPaymentsFailed,
}

impl fmt::Display for RetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryKind::DecrementInventory => f.write_str("decrement_inventory"),
            RetryKind::RecordPayment => f.write_str("record_payment"),
            RetryKind::MarkPaymentsFailed => f.write_str("mark_payments_failed"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum JobStatus {
    Pending,
    InFlight,
    Done,
    /// Gave up after too many attempts; needs a human.
    Dead,
}

/// Durable record of a secondary effect that failed after its primary
/// transition committed.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RetryJob {
    pub id: Uuid,
    pub kind: RetryKind,
    pub order_id: String,
    pub payment_ref: Option<String>,
    pub status: JobStatus,
    pub attempts: u32,
    pub locked_by: Option<String>,
    pub locked_until: Option<SystemTime>,
    pub last_error: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl RetryJob {
    pub fn new(kind: RetryKind, order_id: &str, payment_ref: Option<&str>, error: &str) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            order_id: order_id.to_string(),
            payment_ref: payment_ref.map(str::to_string),
            status: JobStatus::Pending,
            attempts: 0,
            locked_by: None,
            locked_until: None,
            last_error: Some(error.to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Uniqueness key; at most one job per effect per order.
    pub fn dedupe_key(&self) -> String {
        format!("{}:{}", self.kind, self.order_id)
    }

    /// Pending, or in flight with an expired lease.
    pub fn is_claimable(&self, now: SystemTime) -> bool {
        match self.status {
            JobStatus::Pending => true,
            JobStatus::InFlight => self.locked_until.is_none_or(|until| until <= now),
            JobStatus::Done | JobStatus::Dead => false,
        }
    }

    pub fn claim(&mut self, worker_id: &str, now: SystemTime, lease: Duration) {
        self.status = JobStatus::InFlight;
        self.locked_by = Some(worker_id.to_string());
        self.locked_until = Some(now + lease);
        self.updated_at = now;
    }

    pub fn complete(&mut self, now: SystemTime) {
        self.status = JobStatus::Done;
        self.locked_by = None;
        self.locked_until = None;
        self.updated_at = now;
    }

    /// Records a failed attempt; the job is retired once `max_attempts` is hit.
    pub fn release(&mut self, error: &str, max_attempts: u32, now: SystemTime) {
        self.attempts += 1;
        self.last_error = Some(error.to_string());
        self.locked_by = None;
        self.locked_until = None;
        self.status = if self.attempts >= max_attempts {
            JobStatus::Dead
        } else {
            JobStatus::Pending
        };
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_blocks_second_claim() {
        let now = SystemTime::now();
        let mut job = RetryJob::new(RetryKind::DecrementInventory, "o-1", None, "timeout");
        assert!(job.is_claimable(now));

        job.claim("w-1", now, Duration::from_secs(30));
        assert!(!job.is_claimable(now));
        assert!(job.is_claimable(now + Duration::from_secs(31)));
    }

    #[test]
    fn test_release_retires_after_max_attempts() {
        let now = SystemTime::now();
        let mut job = RetryJob::new(RetryKind::RecordPayment, "o-1", Some("pi_1"), "timeout");

        job.release("still down", 2, now);
        assert_eq!(job.status, JobStatus::Pending);
        job.release("still down", 2, now);
        assert_eq!(job.status, JobStatus::Dead);
        assert!(!job.is_claimable(now));
        assert_eq!(job.last_error.as_deref(), Some("still down"));
    }

    #[test]
    fn test_dedupe_key() {
        let job = RetryJob::new(RetryKind::DecrementInventory, "o-7", None, "x");
        assert_eq!(job.dedupe_key(), "decrement_inventory:o-7");
    }
}
