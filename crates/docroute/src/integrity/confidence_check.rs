use serde::{Deserialize, Serialize};

use super::{normalize_key, AnalyzedField, RiskLevel};

/// Fields whose misreading would change what the document means.
pub const CRITICAL_FIELDS: &[&str] = &[
    "invoice_total",
    "total_amount",
    "total",
    "invoice_number",
    "document_number",
    "invoice_date",
    "date",
    "customer_name",
    "vendor_name",
];

const CRITICAL_THRESHOLD: f64 = 0.70;
const EXTREME_THRESHOLD: f64 = 0.50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedField {
    pub field: String,
    pub confidence: f64,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceFinding {
    /// `None` when no field carries a confidence.
    pub average_confidence: Option<f64>,
    pub flagged_fields: Vec<FlaggedField>,
    pub risk_level: RiskLevel,
}

pub fn is_critical(name: &str) -> bool {
    CRITICAL_FIELDS.contains(&normalize_key(name).as_str())
}

pub fn analyze(fields: &[AnalyzedField]) -> ConfidenceFinding {
    let mut flagged_fields = Vec::new();
    let mut scores = Vec::new();

    for field in fields {
        let Some(confidence) = field.confidence else {
            continue;
        };
        scores.push(confidence);

        let reason = if is_critical(&field.name) && confidence < CRITICAL_THRESHOLD {
            Some("Critical field with low confidence")
        } else if confidence < EXTREME_THRESHOLD {
            Some("Extremely low extraction confidence")
        } else {
            None
        };

        if let Some(reason) = reason {
            flagged_fields.push(FlaggedField {
                field: field.name.clone(),
                confidence,
                value: field.value.clone(),
                reason: reason.to_string(),
            });
        }
    }

    let average_confidence =
        (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64);

    let below = |limit: f64| average_confidence.is_some_and(|avg| avg < limit);
    let risk_level = if below(0.60) || flagged_fields.len() >= 3 {
        RiskLevel::High
    } else if below(0.75) || !flagged_fields.is_empty() {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    ConfidenceFinding {
        average_confidence,
        flagged_fields,
        risk_level,
    }
}
