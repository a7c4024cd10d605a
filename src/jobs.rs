//! Persisted job locks
//!
//! A named, persisted mutual-exclusion row prevents two instances of the
//! same background job from running concurrently across processes. The row
//! is authoritative; no in-memory flag is. Observability goes through a
//! `JobStatus` value read back from the store, never a mutable singleton.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row per job name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLock {
    pub job_name: String,
    pub is_locked: bool,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl JobLock {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            is_locked: false,
            locked_at: None,
            last_run_at: None,
        }
    }

    /// A lock held longer than `stale_after` belongs to a crashed worker
    /// and may be taken over.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: chrono::Duration) -> bool {
        match (self.is_locked, self.locked_at) {
            (true, Some(at)) => now - at > stale_after,
            (true, None) => true,
            (false, _) => false,
        }
    }
}

/// Point-in-time status of a scheduled job, for the status query endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_name: String,
    pub running: bool,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl From<JobLock> for JobStatus {
    fn from(lock: JobLock) -> Self {
        Self {
            job_name: lock.job_name,
            running: lock.is_locked,
            locked_at: lock.locked_at,
            last_run_at: lock.last_run_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_lock_is_not_stale() {
        let lock = JobLock::new("deposit_clearance");
        assert!(!lock.is_stale(Utc::now(), chrono::Duration::minutes(10)));
    }

    #[test]
    fn test_held_lock_goes_stale() {
        let now = Utc::now();
        let lock = JobLock {
            job_name: "deposit_clearance".to_string(),
            is_locked: true,
            locked_at: Some(now - chrono::Duration::minutes(30)),
            last_run_at: None,
        };
        assert!(lock.is_stale(now, chrono::Duration::minutes(10)));
        assert!(!lock.is_stale(now, chrono::Duration::hours(1)));
    }

    #[test]
    fn test_locked_without_timestamp_is_stale() {
        let lock = JobLock {
            job_name: "deposit_clearance".to_string(),
            is_locked: true,
            locked_at: None,
            last_run_at: None,
        };
        assert!(lock.is_stale(Utc::now(), chrono::Duration::minutes(10)));
    }
}
