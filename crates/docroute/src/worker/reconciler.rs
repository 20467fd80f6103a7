//! Recovers jobs whose worker vanished mid-run.
//!
//! A PROCESSING job holds a lease that the pipeline renews between stages.
//! Once the lease has lapsed, the sweep either puts the job back in the
//! queue or fails it, depending on the configured stale policy.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::config::StalePolicy;
use crate::db::{job_repo, Database, DatabaseError};
use crate::worker::pool::JobQueue;

pub const LEASE_EXPIRED_MESSAGE: &str = "Processing lease expired";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub requeued: Vec<String>,
    pub failed: Vec<String>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.failed.is_empty()
    }
}

pub struct LeaseReconciler {
    db: Database,
    policy: StalePolicy,
    queue: Option<Arc<dyn JobQueue>>,
}

impl LeaseReconciler {
    pub fn new(db: Database, policy: StalePolicy) -> Self {
        Self {
            db,
            policy,
            queue: None,
        }
    }

    /// Requeued jobs are also dispatched to `queue`.
    pub fn with_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// One pass over every expired lease as of `now`.
    ///
    /// Each job is moved with a conditional write, so a lease renewed
    /// between the scan and the write is left alone.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, DatabaseError> {
        let mut report = SweepReport::default();

        for row in job_repo::find_expired_leases(&self.db, now)? {
            match self.policy {
                StalePolicy::Requeue => {
                    if !job_repo::requeue(&self.db, &row.id, now)? {
                        continue;
                    }
                    info!("Requeued job {} after lease expiry", row.id);
                    if let Some(queue) = &self.queue {
                        if let Err(e) = queue.enqueue(&row.id) {
                            warn!("Requeued job {} could not be dispatched: {}", row.id, e);
                        }
                    }
                    report.requeued.push(row.id);
                }
                StalePolicy::Fail => {
                    if !job_repo::fail_expired(&self.db, &row.id, LEASE_EXPIRED_MESSAGE, now)? {
                        continue;
                    }
                    warn!("Failed job {} after lease expiry", row.id);
                    report.failed.push(row.id);
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo::JobRow;
    use crate::error::WorkerError;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingQueue {
        ids: Mutex<Vec<String>>,
    }

    impl JobQueue for RecordingQueue {
        fn enqueue(&self, job_id: &str) -> Result<(), WorkerError> {
            self.ids.lock().unwrap().push(job_id.to_string());
            Ok(())
        }
    }

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 8, minute, 0).unwrap()
    }

    fn processing(db: &Database, id: &str, lease_until: DateTime<Utc>) {
        job_repo::insert(db, &JobRow::queued(id, "alice", "alice/a.pdf", "a.pdf", 1, t(0)))
            .unwrap();
        job_repo::claim(db, id, lease_until, t(0)).unwrap();
    }

    #[test]
    fn test_requeue_policy_dispatches() {
        let db = Database::open_in_memory().unwrap();
        processing(&db, "stale", t(15));
        processing(&db, "live", t(45));

        let queue = Arc::new(RecordingQueue::default());
        let reconciler = LeaseReconciler::new(db.clone(), StalePolicy::Requeue)
            .with_queue(Arc::clone(&queue) as Arc<dyn JobQueue>);

        let report = reconciler.sweep(t(30)).unwrap();
        assert_eq!(report.requeued, vec!["stale"]);
        assert!(report.failed.is_empty());
        assert_eq!(*queue.ids.lock().unwrap(), vec!["stale"]);

        let stale = job_repo::find_by_id(&db, "stale").unwrap().unwrap();
        assert_eq!(stale.status, "QUEUED");
        let live = job_repo::find_by_id(&db, "live").unwrap().unwrap();
        assert_eq!(live.status, "PROCESSING");
    }

    #[test]
    fn test_fail_policy() {
        let db = Database::open_in_memory().unwrap();
        processing(&db, "stale", t(15));

        let report = LeaseReconciler::new(db.clone(), StalePolicy::Fail)
            .sweep(t(30))
            .unwrap();
        assert_eq!(report.failed, vec!["stale"]);

        let row = job_repo::find_by_id(&db, "stale").unwrap().unwrap();
        assert_eq!(row.status, "FAILED");
        assert_eq!(row.error_message.as_deref(), Some(LEASE_EXPIRED_MESSAGE));
    }

    #[test]
    fn test_nothing_expired() {
        let db = Database::open_in_memory().unwrap();
        processing(&db, "live", t(45));
        let report = LeaseReconciler::new(db, StalePolicy::Requeue)
            .sweep(t(30))
            .unwrap();
        assert!(report.is_empty());
    }
}
