use crate::classifier::StrategyClass;
use crate::extraction::ExtractionWarning;
use crate::integrity::RiskReport;
use crate::worker::job::Job;

/// What one attempt has learned so far. Survives a failed step so the
/// caller can log how far the job got.
pub struct PipelineContext {
    pub job: Job,

    /// Token written by the claim; every write for this attempt presents it.
    pub lease_owner: String,

    pub file_hash: Option<String>,

    pub strategy: Option<StrategyClass>,

    /// Pairs the service returned with a usable value.
    pub extracted_pairs: usize,

    /// Extracted pairs plus metadata pseudo-fields written for this attempt.
    pub fields_persisted: usize,

    pub risk_report: Option<RiskReport>,

    // Partial-result markers, not failures
    pub warnings: Vec<ExtractionWarning>,
}

impl PipelineContext {
    pub fn new(job: Job, lease_owner: String) -> Self {
        Self {
            job,
            lease_owner,
            file_hash: None,
            strategy: None,
            extracted_pairs: 0,
            fields_persisted: 0,
            risk_report: None,
            warnings: Vec::new(),
        }
    }

    /// Name of the last stage that finished, for failure logs.
    pub fn reached(&self) -> &'static str {
        if self.risk_report.is_some() {
            "analyzed"
        } else if self.fields_persisted > 0 {
            "extracted"
        } else if self.strategy.is_some() {
            "classified"
        } else if self.file_hash.is_some() {
            "hashed"
        } else {
            "claimed"
        }
    }
}
