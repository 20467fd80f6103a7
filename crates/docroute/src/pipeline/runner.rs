use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, info_span, warn};

use crate::broadcast::job_progress::{CompletionSummary, JobPhase, JobProgressBroadcaster};
use crate::classifier::DocumentClassifier;
use crate::config::loader::MAX_LEASE_SECS;
use crate::config::Config;
use crate::db::field_repo::{self, NewField};
use crate::db::job_repo::{self, JobRow};
use crate::db::{Database, DatabaseError};
use crate::error::{DocrouteError, WorkerError};
use crate::extraction::{DispatchSettings, ExtractionDispatcher, ExtractionResult};
use crate::integrity::{AnalyzedField, IntegrityAnalyzer, IntegrityInput, RiskReport};
use crate::processor::ocr::OcrTextExtractor;
use crate::processor::Document;
use crate::sanitize;
use crate::storage::{hash_file, TempDocument};
use crate::worker::job::{Job, JobOutcome, JobStatus};

use super::config::PipelineServices;
use super::context::PipelineContext;
use super::error::PipelineError;
use super::progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};

/// Drives one job from QUEUED to a terminal state:
/// claim, fetch, hash, classify, extract and persist, analyze, complete.
pub struct JobPipeline {
    services: PipelineServices,
    db: Database,
    config: Arc<Config>,
    classifier: DocumentClassifier,
    dispatcher: ExtractionDispatcher,
    analyzer: IntegrityAnalyzer,
    broadcaster: Option<JobProgressBroadcaster>,
}

impl JobPipeline {
    pub fn new(services: PipelineServices, db: Database, config: Arc<Config>) -> Self {
        let classifier = DocumentClassifier::new(config.classifier.clone());
        let dispatcher = ExtractionDispatcher::new(
            Arc::clone(&services.extraction),
            Arc::clone(&services.renderer),
            OcrTextExtractor::new(Arc::clone(&services.ocr)),
            DispatchSettings::from(config.as_ref()),
        );

        Self {
            services,
            db,
            config,
            classifier,
            dispatcher,
            analyzer: IntegrityAnalyzer::new(),
            broadcaster: None,
        }
    }

    /// Publishes per-job progress on `broadcaster`.
    pub fn with_progress(mut self, broadcaster: JobProgressBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn with_analyzer(mut self, analyzer: IntegrityAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Processes one job, reporting to the configured broadcaster if any.
    ///
    /// A job that is not QUEUED is left untouched and reported as skipped.
    /// Every other path ends with the job COMPLETED or FAILED.
    pub fn process(&self, job_id: &str) -> Result<JobOutcome, DocrouteError> {
        let row = self.load(job_id)?;
        match &self.broadcaster {
            Some(broadcaster) => {
                let progress = BroadcastProgress::new(broadcaster, &row.id, &row.filename);
                self.process_row(row, &progress)
            }
            None => self.process_row(row, &NoopProgress),
        }
    }

    /// Like [`process`](Self::process) with an explicit reporter.
    pub fn process_with(
        &self,
        job_id: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<JobOutcome, DocrouteError> {
        let row = self.load(job_id)?;
        self.process_row(row, progress)
    }

    fn load(&self, job_id: &str) -> Result<JobRow, DocrouteError> {
        job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| WorkerError::JobNotFound(job_id.to_string()).into())
    }

    fn process_row(
        &self,
        row: JobRow,
        progress: &dyn ProgressReporter,
    ) -> Result<JobOutcome, DocrouteError> {
        let _pipeline_span = info_span!(
            "pipeline.job",
            job_id = %row.id,
            filename = %sanitize::redact_ref(&row.filename),
        )
        .entered();

        let mut job = Job::try_from(row)?;

        let now = Utc::now();
        let lease_owner = match job_repo::claim(&self.db, &job.id, self.lease_until(now), now) {
            Ok(token) => token,
            Err(DatabaseError::InvalidTransition { from, .. }) => {
                info!(status = %from, "Job is not claimable, skipping");
                return Ok(JobOutcome::Skipped {
                    job_id: job.id,
                    status: from,
                });
            }
            Err(DatabaseError::JobNotFound(id)) => return Err(WorkerError::JobNotFound(id).into()),
            Err(e) => return Err(e.into()),
        };
        job.status = JobStatus::Processing;
        debug!("Job claimed");

        let mut ctx = PipelineContext::new(job, lease_owner);
        match self.run_steps(&mut ctx, progress) {
            Ok(report) => self.finish_completed(ctx, report, progress),
            Err(PipelineError::LeaseLost) => {
                warn!(reached = ctx.reached(), "Lease lost, abandoning attempt");
                Ok(JobOutcome::Abandoned { job_id: ctx.job.id })
            }
            Err(e) => self.finish_failed(ctx, e, progress),
        }
    }

    fn run_steps(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<RiskReport, PipelineError> {
        let job_id = ctx.job.id.clone();
        let lease_owner = ctx.lease_owner.clone();

        // Step 1: Fetch into a scoped local copy, removed on every exit path
        let (bytes, local) = {
            let _step = info_span!("fetch").entered();
            progress.report(ProgressEvent::phase(
                JobPhase::Fetching,
                "Fetching document from storage...",
            ));
            let bytes = self
                .services
                .store
                .fetch(&ctx.job.file_ref)
                .map_err(PipelineError::Fetch)?;
            let local = TempDocument::create(
                self.config.worker.temp_dir.as_deref(),
                &job_id,
                &ctx.job.filename,
                &bytes,
            )
            .map_err(PipelineError::LocalCopy)?;
            (bytes, local)
        };

        // Step 2: Hash and record
        let file_hash = {
            let _step = info_span!("hash").entered();
            progress.report(ProgressEvent::phase(JobPhase::Hashing, "Hashing content..."));
            let file_hash = hash_file(local.path()).map_err(PipelineError::Hash)?;
            job_repo::record_hash(&self.db, &job_id, &lease_owner, &file_hash, Utc::now())
                .map_err(lease_or_persistence)?;
            debug!(hash = sanitize::short_hash(&file_hash), "Content hash recorded");
            file_hash
        };
        ctx.file_hash = Some(file_hash.clone());

        // Step 3: Classify
        let (document, classification) = {
            let _step = info_span!("classify").entered();
            progress.report(ProgressEvent::phase(
                JobPhase::Classifying,
                "Inspecting document structure...",
            ));
            let document = Document::from_bytes(&ctx.job.filename, bytes)
                .map_err(PipelineError::Classification)?;
            let classification = self
                .classifier
                .classify(&document)
                .map_err(PipelineError::Classification)?;
            (document, classification)
        };
        ctx.strategy = Some(classification.strategy);
        self.heartbeat(&job_id, &lease_owner)?;

        // Step 4: Extract and persist
        {
            let _step = info_span!("extract").entered();
            progress.report(ProgressEvent::phase(
                JobPhase::Extracting,
                &format!("Extracting fields ({})...", classification.strategy),
            ));
            let extraction = self
                .dispatcher
                .extract_fields(&classification, &document)
                .map_err(PipelineError::Extraction)?;

            let rows = field_rows(&extraction);
            let (cleared, written) =
                field_repo::replace_for_attempt(&self.db, &job_id, &lease_owner, &rows, Utc::now())
                    .map_err(lease_or_persistence)?;
            if cleared > 0 {
                debug!(cleared, "Dropped fields from an earlier attempt");
            }
            ctx.fields_persisted = written;
            ctx.extracted_pairs = extraction.fields.len();
            ctx.warnings = extraction.warnings;
        }
        self.heartbeat(&job_id, &lease_owner)?;

        // Step 5: Integrity analysis over what was persisted
        let report = {
            let _step = info_span!("analyze").entered();
            progress.report(ProgressEvent::phase(
                JobPhase::Analyzing,
                "Checking document integrity...",
            ));
            let fields: Vec<AnalyzedField> = field_repo::list_for_job(&self.db, &job_id)
                .map_err(PipelineError::Persistence)?
                .iter()
                .map(|f| AnalyzedField::new(&f.field_name, f.current_value(), f.confidence))
                .collect();

            let input = IntegrityInput {
                job_id: &job_id,
                owner_ref: &ctx.job.owner_ref,
                file_path: local.path(),
                file_hash: &file_hash,
                fields: &fields,
            };
            self.analyzer
                .analyze(&input, &self.db)
                .map_err(PipelineError::Integrity)?
        };
        ctx.risk_report = Some(report.clone());

        Ok(report)
    }

    fn finish_completed(
        &self,
        ctx: PipelineContext,
        report: RiskReport,
        progress: &dyn ProgressReporter,
    ) -> Result<JobOutcome, DocrouteError> {
        let serialized = match serde_json::to_string(&report) {
            Ok(json) => json,
            Err(e) => return self.finish_failed(ctx, PipelineError::Serialization(e), progress),
        };

        match job_repo::complete(&self.db, &ctx.job.id, &ctx.lease_owner, &serialized, Utc::now()) {
            Ok(()) => {}
            Err(DatabaseError::InvalidTransition { from, .. }) => {
                warn!(status = %from, "Job moved while processing, result not recorded");
                return Ok(JobOutcome::Abandoned { job_id: ctx.job.id });
            }
            Err(DatabaseError::LeaseNotHeld(_)) => {
                warn!("Job was claimed by another attempt, result not recorded");
                return Ok(JobOutcome::Abandoned { job_id: ctx.job.id });
            }
            Err(e) => return Err(e.into()),
        }

        let strategy = ctx
            .strategy
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();
        info!(
            strategy = %strategy,
            fields = ctx.extracted_pairs,
            risk = %report.overall_risk,
            score = report.risk_score,
            warnings = ctx.warnings.len(),
            "Job completed"
        );

        progress.report(ProgressEvent::Completed(CompletionSummary {
            strategy,
            field_count: ctx.extracted_pairs,
            overall_risk: report.overall_risk.as_str().to_string(),
            risk_score: report.risk_score,
        }));

        Ok(JobOutcome::Completed {
            job_id: ctx.job.id,
            overall_risk: report.overall_risk,
            risk_score: report.risk_score,
            field_count: ctx.extracted_pairs,
        })
    }

    /// Records the failure. Fields persisted by this attempt stay.
    fn finish_failed(
        &self,
        ctx: PipelineContext,
        error: PipelineError,
        progress: &dyn ProgressReporter,
    ) -> Result<JobOutcome, DocrouteError> {
        let message = error.to_string();
        warn!(reached = ctx.reached(), error = %message, "Job failed");

        match job_repo::fail(&self.db, &ctx.job.id, &ctx.lease_owner, &message, Utc::now()) {
            Ok(()) => {}
            Err(DatabaseError::InvalidTransition { from, .. }) => {
                warn!(status = %from, "Job moved while processing, failure not recorded");
                return Ok(JobOutcome::Abandoned { job_id: ctx.job.id });
            }
            Err(DatabaseError::LeaseNotHeld(_)) => {
                warn!("Job was claimed by another attempt, failure not recorded");
                return Ok(JobOutcome::Abandoned { job_id: ctx.job.id });
            }
            Err(e) => return Err(e.into()),
        }

        progress.report(ProgressEvent::Failed {
            error: message.clone(),
        });

        Ok(JobOutcome::Failed {
            job_id: ctx.job.id,
            error: message,
        })
    }

    /// Extends the lease between stages. A job that is no longer ours
    /// stops here.
    fn heartbeat(&self, job_id: &str, lease_owner: &str) -> Result<(), PipelineError> {
        let now = Utc::now();
        let renewed = job_repo::renew_lease(&self.db, job_id, lease_owner, self.lease_until(now), now)
            .map_err(PipelineError::Persistence)?;
        if renewed {
            Ok(())
        } else {
            Err(PipelineError::LeaseLost)
        }
    }

    fn lease_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + lease_duration(&self.config)
    }
}

fn lease_or_persistence(error: DatabaseError) -> PipelineError {
    match error {
        DatabaseError::LeaseNotHeld(_) => PipelineError::LeaseLost,
        other => PipelineError::Persistence(other),
    }
}

pub fn lease_duration(config: &Config) -> Duration {
    Duration::seconds(config.worker.lease_secs.min(MAX_LEASE_SECS) as i64)
}

/// Extracted pairs followed by the metadata pseudo-fields.
pub fn field_rows(extraction: &ExtractionResult) -> Vec<NewField> {
    let mut rows: Vec<NewField> = extraction
        .fields
        .iter()
        .map(|pair| NewField::new(&pair.key, &pair.value, Some(pair.confidence)))
        .collect();

    rows.push(NewField::new(
        "_document_type",
        &extraction.document_type_label,
        None,
    ));
    rows.push(NewField::new(
        "_confidence",
        format!("{:.4}", extraction.combined_confidence),
        Some(extraction.combined_confidence),
    ));
    rows.push(NewField::new("_summary", &extraction.summary, None));
    rows.push(NewField::new("_method", extraction.method.as_str(), None));
    rows.push(NewField::new(
        "_strategy",
        extraction.strategy_used.as_str(),
        None,
    ));
    rows
}
