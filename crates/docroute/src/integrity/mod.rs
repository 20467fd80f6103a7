//! Fraud and integrity scoring over an extraction result.
//!
//! Four independent analyses each produce a bounded sub-score:
//!
//! | analysis    | range | trigger                                        |
//! |-------------|-------|------------------------------------------------|
//! | duplicate   | 0-3   | same owner already completed identical content |
//! | metadata    | 0-2   | editor signatures, missing creation timestamp  |
//! | consistency | 0-3   | totals, date ordering, suspicious amounts      |
//! | confidence  | 0-2   | low average or low critical-field confidence   |
//!
//! The report is informational only: a high risk never blocks completion.

pub mod confidence_check;
pub mod consistency;
pub mod duplicate;
pub mod metadata;

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;

pub use confidence_check::{ConfidenceFinding, FlaggedField};
pub use consistency::{ConsistencyFinding, ConsistencyIssue, Severity};
pub use duplicate::{DuplicateFinding, DuplicateIndex, DuplicateMatch};
pub use metadata::MetadataFinding;

pub const MAX_RISK_SCORE: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// `high` at 6 or more, `medium` at 3 or more.
    pub fn from_score(score: u8) -> Self {
        if score >= 6 {
            RiskLevel::High
        } else if score >= 3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskLevel::High => "Manual review required - Multiple fraud indicators detected",
            RiskLevel::Medium => "Review recommended - Some fraud indicators present",
            RiskLevel::Low => "Document appears legitimate",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubScores {
    pub duplicate: u8,
    pub metadata: u8,
    pub consistency: u8,
    pub confidence: u8,
}

impl SubScores {
    /// Sum of the four sub-scores, saturated at [`MAX_RISK_SCORE`]. The
    /// maxima add up to 10, one above the reported bound.
    pub fn total(&self) -> u8 {
        (self.duplicate + self.metadata + self.consistency + self.confidence).min(MAX_RISK_SCORE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDetails {
    pub duplicate: DuplicateFinding,
    pub metadata: MetadataFinding,
    pub consistency: ConsistencyFinding,
    pub confidence: ConfidenceFinding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub overall_risk: RiskLevel,
    pub risk_score: u8,
    pub max_risk_score: u8,
    pub recommendation: String,
    pub flags: Vec<String>,
    pub sub_scores: SubScores,
    pub details: RiskDetails,
    pub analyzed_at: DateTime<Utc>,
}

/// One persisted field as seen by the analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedField {
    pub name: String,
    /// Current value (the user's edit when present).
    pub value: String,
    pub confidence: Option<f64>,
}

impl AnalyzedField {
    pub fn new(name: &str, value: &str, confidence: Option<f64>) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            confidence,
        }
    }

    /// Metadata pseudo-fields (`_summary`, `_confidence`, ...) are stored
    /// alongside real fields but never analyzed.
    pub fn is_metadata(&self) -> bool {
        self.name.starts_with('_')
    }
}

/// `"Invoice Total"` and `"invoice-total"` both become `invoice_total`.
pub fn normalize_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

pub struct IntegrityInput<'a> {
    pub job_id: &'a str,
    pub owner_ref: &'a str,
    pub file_path: &'a Path,
    pub file_hash: &'a str,
    pub fields: &'a [AnalyzedField],
}

#[derive(Debug, Clone, Default)]
pub struct IntegrityAnalyzer {
    today: Option<NaiveDate>,
}

impl IntegrityAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins "today" for the future-date check.
    pub fn with_today(today: NaiveDate) -> Self {
        Self { today: Some(today) }
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Runs all four analyses. Only the duplicate lookup can fail.
    pub fn analyze(
        &self,
        input: &IntegrityInput<'_>,
        index: &dyn DuplicateIndex,
    ) -> Result<RiskReport, DatabaseError> {
        let _span = tracing::info_span!(
            "integrity.analyze",
            job_id = %input.job_id,
            file = %crate::sanitize::redact_path(input.file_path),
            hash = %crate::sanitize::short_hash(input.file_hash)
        )
        .entered();

        let fields: Vec<AnalyzedField> = input
            .fields
            .iter()
            .filter(|f| !f.is_metadata())
            .cloned()
            .collect();

        let duplicate =
            duplicate::check(index, input.owner_ref, input.file_hash, Some(input.job_id))?;
        let metadata = metadata::inspect_path(input.file_path);
        let consistency = consistency::check(&fields, self.today());
        let confidence = confidence_check::analyze(&fields);

        Ok(build_report(duplicate, metadata, consistency, confidence))
    }
}

/// Folds the four findings into the final report.
pub fn build_report(
    duplicate: DuplicateFinding,
    metadata: MetadataFinding,
    consistency: ConsistencyFinding,
    confidence: ConfidenceFinding,
) -> RiskReport {
    let sub_scores = SubScores {
        duplicate: if duplicate.is_duplicate { 3 } else { 0 },
        metadata: level_score(metadata.risk_level, 2, 1),
        consistency: level_score(consistency.risk_level, 3, 1),
        confidence: level_score(confidence.risk_level, 2, 1),
    };

    let mut flags = Vec::new();
    if duplicate.is_duplicate {
        flags.push("Duplicate document detected".to_string());
    }
    flags.extend(metadata.indicators.iter().cloned());
    flags.extend(consistency.issues.iter().map(|i| i.issue.clone()));
    if !confidence.flagged_fields.is_empty() {
        flags.push(format!(
            "{} fields with low confidence",
            confidence.flagged_fields.len()
        ));
    }

    let risk_score = sub_scores.total();
    let overall_risk = RiskLevel::from_score(risk_score);

    tracing::info!(
        risk = %overall_risk,
        score = risk_score,
        flags = flags.len(),
        "Integrity analysis complete"
    );

    RiskReport {
        overall_risk,
        risk_score,
        max_risk_score: MAX_RISK_SCORE,
        recommendation: overall_risk.recommendation().to_string(),
        flags,
        sub_scores,
        details: RiskDetails {
            duplicate,
            metadata,
            consistency,
            confidence,
        },
        analyzed_at: Utc::now(),
    }
}

fn level_score(level: RiskLevel, high: u8, medium: u8) -> u8 {
    match level {
        RiskLevel::High => high,
        RiskLevel::Medium => medium,
        RiskLevel::Low => 0,
    }
}
