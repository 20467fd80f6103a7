//! Job state handling: duplicates, failures, retries, scratch cleanup,
//! lease recovery and the worker pool.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, Utc};

use common::{clean_invoice_payload, invoice_pdf, PayloadBuilder, TestHarness};
use docroute::db::{field_repo, job_repo};
use docroute::worker::{JobQueue, LEASE_EXPIRED_MESSAGE};
use docroute::{
    JobOutcome, JobPhase, JobProgressBroadcaster, JobStatus, LeaseReconciler, RiskLevel, StalePolicy,
    WorkerPool,
};

const INVOICE_TEXT: &str = "TAX INVOICE INV-2026-0042 issued 01/06/2026 by Acme Supplies Ltd \
                            to Example Traders for consulting services rendered in May";

#[test]
fn test_resubmitted_document_is_flagged_as_duplicate() {
    let harness = TestHarness::new();
    harness.service.set_reply(clean_invoice_payload());
    let bytes = invoice_pdf(INVOICE_TEXT);

    let (first, _) = harness.run("alice", "invoice.pdf", &bytes);
    let (second, outcome) = harness.run("alice", "invoice-copy.pdf", &bytes);

    assert!(matches!(
        outcome,
        JobOutcome::Completed {
            overall_risk: RiskLevel::Medium,
            risk_score: 3,
            ..
        }
    ));

    let report = harness.job(&second).risk_report.expect("report stored");
    assert_eq!(report.sub_scores.duplicate, 3);
    assert!(report.flags.iter().any(|f| f == "Duplicate document detected"));
    assert_eq!(report.details.duplicate.original_job_id.as_deref(), Some(first.as_str()));
    assert_eq!(
        report.details.duplicate.original_filename.as_deref(),
        Some("invoice.pdf")
    );

    // The original itself never counts as its own duplicate.
    let original = harness.job(&first).risk_report.expect("report stored");
    assert_eq!(original.sub_scores.duplicate, 0);
}

#[test]
fn test_duplicates_are_scoped_to_owner() {
    let harness = TestHarness::new();
    harness.service.set_reply(clean_invoice_payload());
    let bytes = invoice_pdf(INVOICE_TEXT);

    harness.run("alice", "invoice.pdf", &bytes);
    let (job_id, _) = harness.run("bob", "invoice.pdf", &bytes);

    let report = harness.job(&job_id).risk_report.expect("report stored");
    assert!(!report.details.duplicate.is_duplicate);
    assert_eq!(report.sub_scores.duplicate, 0);
}

#[test]
fn test_service_error_fails_job() {
    let harness = TestHarness::new();
    harness.service.set_failure("upstream returned 503");

    let (job_id, outcome) = harness.run("alice", "invoice.pdf", &invoice_pdf(INVOICE_TEXT));

    let expected =
        "Field extraction failed: Extraction service request failed: upstream returned 503";
    assert_eq!(
        outcome,
        JobOutcome::Failed {
            job_id: job_id.clone(),
            error: expected.to_string(),
        }
    );

    let job = harness.job(&job_id);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some(expected));
    assert!(job.risk_report.is_none());
    // The hash was recorded before extraction.
    assert!(job.file_hash.is_some());
    assert!(harness.fields(&job_id).is_empty());
}

#[test]
fn test_malformed_payload_fails_job() {
    let harness = TestHarness::new();
    harness.service.set_reply("I could not read this document, sorry.");

    let (job_id, outcome) = harness.run("alice", "invoice.pdf", &invoice_pdf(INVOICE_TEXT));
    assert!(!outcome.is_success());

    let job = harness.job(&job_id);
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .error_message
        .unwrap_or_default()
        .starts_with("Field extraction failed: Extraction service returned an unparseable"));
}

#[test]
fn test_unreadable_pdf_fails_at_classification() {
    let harness = TestHarness::new();
    harness.service.set_reply(clean_invoice_payload());

    let (job_id, _) = harness.run("alice", "broken.pdf", b"%PDF-1.4\nthis is not a pdf");

    let job = harness.job(&job_id);
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .error_message
        .unwrap_or_default()
        .starts_with("Document classification failed"));
    assert!(harness.service.calls().is_empty());
}

#[test]
fn test_terminal_job_is_not_processed_again() {
    let harness = TestHarness::new();
    harness.service.set_reply(clean_invoice_payload());

    let (job_id, _) = harness.run("alice", "invoice.pdf", &invoice_pdf(INVOICE_TEXT));
    let fields_before = harness.fields(&job_id).len();

    let outcome = harness.process(&job_id);
    assert_eq!(
        outcome,
        JobOutcome::Skipped {
            job_id: job_id.clone(),
            status: JobStatus::Completed.to_string(),
        }
    );
    assert_eq!(harness.service.calls().len(), 1);
    assert_eq!(harness.fields(&job_id).len(), fields_before);
}

#[test]
fn test_requeued_job_replaces_earlier_fields() {
    let harness = TestHarness::new();
    harness.service.push_reply(
        PayloadBuilder::new("Invoice")
            .field("invoice_number", "FIRST")
            .field("stale_only", "x")
            .build(),
    );
    harness.service.set_reply(
        PayloadBuilder::new("Invoice")
            .field("invoice_number", "SECOND")
            .build(),
    );

    let (job_id, _) = harness.run("alice", "invoice.pdf", &invoice_pdf(INVOICE_TEXT));
    assert_eq!(
        harness.field_value(&job_id, "invoice_number").as_deref(),
        Some("FIRST")
    );

    // Force the job back into the queue as a lease sweep would.
    let db = &harness.db;
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET status = 'QUEUED', completed_at = NULL, risk_report = NULL WHERE id = ?1",
            [&job_id],
        )?;
        Ok(())
    })
    .unwrap();

    assert!(harness.process(&job_id).is_success());
    assert_eq!(
        harness.field_value(&job_id, "invoice_number").as_deref(),
        Some("SECOND")
    );
    assert_eq!(harness.field_value(&job_id, "stale_only"), None);
}

#[test]
fn test_scratch_copy_removed_on_success_and_failure() {
    let harness = TestHarness::new();
    harness.service.set_reply(clean_invoice_payload());

    harness.run("alice", "ok.pdf", &invoice_pdf(INVOICE_TEXT));
    assert_eq!(harness.scratch_entries(), 0);

    harness.service.set_failure("boom");
    harness.run("alice", "bad.pdf", &invoice_pdf(INVOICE_TEXT));
    assert_eq!(harness.scratch_entries(), 0);
}

#[test]
fn test_user_edit_survives_and_reset_restores() {
    let harness = TestHarness::new();
    harness.service.set_reply(clean_invoice_payload());
    let (job_id, _) = harness.run("alice", "invoice.pdf", &invoice_pdf(INVOICE_TEXT));

    let total = harness
        .fields(&job_id)
        .into_iter()
        .find(|f| f.field_name == "invoice_total")
        .expect("total persisted");

    field_repo::edit(&harness.db, total.id, "1,200.00", Utc::now()).unwrap();
    assert_eq!(
        harness.field_value(&job_id, "invoice_total").as_deref(),
        Some("1,200.00")
    );

    field_repo::reset(&harness.db, total.id, Utc::now()).unwrap();
    assert_eq!(
        harness.field_value(&job_id, "invoice_total").as_deref(),
        Some("1,180.00")
    );
}

#[test]
fn test_progress_events_follow_the_job() {
    let harness = TestHarness::new();
    harness.service.set_reply(clean_invoice_payload());

    let broadcaster = JobProgressBroadcaster::new(64);
    let mut rx = broadcaster.subscribe();
    let job_id = harness.submit("alice", "invoice.pdf", &invoice_pdf(INVOICE_TEXT));

    let pipeline = docroute::JobPipeline::new(
        docroute::PipelineServices {
            store: harness.store.clone(),
            renderer: harness.renderer.clone(),
            ocr: harness.ocr.clone(),
            extraction: harness.service.clone(),
        },
        harness.db.clone(),
        Arc::clone(&harness.config),
    )
    .with_progress(broadcaster);
    pipeline.process(&job_id).unwrap();

    let mut phases = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.job_id, job_id);
        phases.push(event.phase);
    }
    assert_eq!(phases.first(), Some(&JobPhase::Fetching));
    assert_eq!(phases.last(), Some(&JobPhase::Completed));
    assert!(phases.contains(&JobPhase::Analyzing));
}

#[test]
fn test_expired_lease_is_requeued_and_redispatched() {
    let harness = TestHarness::new();
    let job_id = harness.submit("alice", "invoice.pdf", &invoice_pdf(INVOICE_TEXT));

    // A worker claimed it and disappeared.
    let claimed_at = Utc::now() - ChronoDuration::minutes(30);
    job_repo::claim(
        &harness.db,
        &job_id,
        claimed_at + ChronoDuration::minutes(15),
        claimed_at,
    )
    .unwrap();

    let queue = Arc::new(common::harness::RecordingQueue::default());
    let report = LeaseReconciler::new(harness.db.clone(), StalePolicy::Requeue)
        .with_queue(Arc::clone(&queue) as Arc<dyn JobQueue>)
        .sweep(Utc::now())
        .unwrap();

    assert_eq!(report.requeued, vec![job_id.clone()]);
    assert_eq!(queue.ids(), vec![job_id.clone()]);
    assert_eq!(harness.job(&job_id).status, JobStatus::Queued);

    harness.service.set_reply(clean_invoice_payload());
    assert!(harness.process(&job_id).is_success());
}

#[test]
fn test_expired_lease_fails_under_fail_policy() {
    let harness = TestHarness::new();
    let job_id = harness.submit("alice", "invoice.pdf", &invoice_pdf(INVOICE_TEXT));

    let claimed_at = Utc::now() - ChronoDuration::minutes(30);
    job_repo::claim(
        &harness.db,
        &job_id,
        claimed_at + ChronoDuration::minutes(15),
        claimed_at,
    )
    .unwrap();

    let report = LeaseReconciler::new(harness.db.clone(), StalePolicy::Fail)
        .sweep(Utc::now())
        .unwrap();
    assert_eq!(report.failed, vec![job_id.clone()]);

    let job = harness.job(&job_id);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some(LEASE_EXPIRED_MESSAGE));

    // A failed job is terminal for the pipeline too.
    assert!(matches!(
        harness.process(&job_id),
        JobOutcome::Skipped { .. }
    ));
}

#[test]
fn test_attempt_stops_when_its_job_is_claimed_again() {
    let harness = TestHarness::new();
    harness.service.set_reply(clean_invoice_payload());
    let job_id = harness.submit("alice", "invoice.pdf", &invoice_pdf(INVOICE_TEXT));

    // While the service call is in flight the lease lapses, the sweep
    // requeues the job and a second worker claims it.
    let db = harness.db.clone();
    let hooked_id = job_id.clone();
    let second_lease = Arc::new(std::sync::Mutex::new(None));
    let recorded = Arc::clone(&second_lease);
    harness.service.on_call(move || {
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE jobs SET lease_expires_at = '2000-01-01T00:00:00.000000Z' WHERE id = ?1",
                [&hooked_id],
            )?;
            Ok(())
        })
        .unwrap();
        LeaseReconciler::new(db.clone(), StalePolicy::Requeue)
            .sweep(Utc::now())
            .unwrap();
        let now = Utc::now();
        let lease = job_repo::claim(&db, &hooked_id, now + ChronoDuration::minutes(15), now).unwrap();
        *recorded.lock().unwrap() = Some(lease);
    });

    let outcome = harness.process(&job_id);
    assert_eq!(outcome, JobOutcome::Abandoned { job_id: job_id.clone() });

    // The second claim's state is untouched by the first attempt.
    let row = job_repo::find_by_id(&harness.db, &job_id).unwrap().unwrap();
    assert_eq!(row.status, "PROCESSING");
    assert_eq!(row.lease_owner, second_lease.lock().unwrap().clone());
    assert!(row.risk_report.is_none());
    assert!(harness.fields(&job_id).is_empty());
}

#[test]
fn test_worker_pool_processes_submitted_jobs() {
    let harness = TestHarness::new();
    harness.service.set_reply(clean_invoice_payload());

    let pool = WorkerPool::new(harness.pipeline(), 2).unwrap();
    let ids: Vec<String> = ["a.pdf", "b.pdf", "c.pdf"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let text = format!("{} copy {}", INVOICE_TEXT, i);
            let job_id = harness.submit("alice", name, &invoice_pdf(&text));
            pool.enqueue_and_process(&job_id).unwrap();
            job_id
        })
        .collect();

    let deadline = Instant::now() + Duration::from_secs(30);
    let mut finished = Vec::new();
    while finished.len() < ids.len() && Instant::now() < deadline {
        if let Some(outcome) = pool.recv_outcome_timeout(Duration::from_millis(200)) {
            assert!(outcome.is_success(), "unexpected outcome: {:?}", outcome);
            finished.push(outcome.job_id().to_string());
        }
    }
    pool.wait();

    finished.sort();
    let mut expected = ids.clone();
    expected.sort();
    assert_eq!(finished, expected);
    for id in &ids {
        assert_eq!(harness.job(id).status, JobStatus::Completed);
    }
    assert_eq!(harness.service.calls().len(), 3);
}
