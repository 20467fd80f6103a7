use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{normalize_key, AnalyzedField, RiskLevel};

pub const TOTAL_ALIASES: &[&str] = &["total", "total_amount", "invoice_total", "grand_total"];
pub const TAXABLE_ALIASES: &[&str] = &[
    "taxable_value",
    "invoice_subtotal",
    "subtotal",
    "taxable_amount",
];
pub const TAX_ALIASES: &[&str] = &["tax", "invoice_tax", "tax_amount", "total_tax", "gst_amount"];
pub const ISSUE_DATE_ALIASES: &[&str] = &["invoice_date", "issue_date", "date", "date_of_issue"];
pub const DUE_DATE_ALIASES: &[&str] = &["due_date", "invoice_due_date", "payment_due_date"];

pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%m-%d-%Y",
    "%Y/%m/%d",
    "%d %B %Y",
    "%B %d, %Y",
];

const TOTAL_TOLERANCE: f64 = 0.01;

static RE_SUSPICIOUS_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"9{3,}(?:\.\d{0,2})?\s*$").unwrap());
static RE_AMOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyIssue {
    pub issue: String,
    pub details: String,
    pub severity: Severity,
}

impl ConsistencyIssue {
    fn new(issue: &str, details: String, severity: Severity) -> Self {
        Self {
            issue: issue.to_string(),
            details,
            severity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyFinding {
    pub issues: Vec<ConsistencyIssue>,
    pub risk_level: RiskLevel,
}

/// Strips currency symbols and thousands separators, then reads the first
/// number: `"₹1,18,000.50"` is `118000.5`.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '₹' | '€' | '£'))
        .collect();
    RE_AMOUNT
        .find(&cleaned)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// First matching format wins, so `03/04/2026` is read day-first.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Normalized-key view over the fields; the first occurrence of a key wins.
struct FieldMap<'a> {
    values: HashMap<String, &'a str>,
    order: Vec<(String, &'a str)>,
}

impl<'a> FieldMap<'a> {
    fn new(fields: &'a [AnalyzedField]) -> Self {
        let mut values = HashMap::new();
        let mut order = Vec::new();
        for field in fields {
            let key = normalize_key(&field.name);
            if !values.contains_key(&key) {
                values.insert(key.clone(), field.value.as_str());
                order.push((key, field.value.as_str()));
            }
        }
        Self { values, order }
    }

    fn lookup(&self, aliases: &[&str]) -> Option<&'a str> {
        aliases
            .iter()
            .find_map(|alias| self.values.get(*alias).copied())
            .filter(|v| !v.trim().is_empty())
    }
}

pub fn check(fields: &[AnalyzedField], today: NaiveDate) -> ConsistencyFinding {
    let map = FieldMap::new(fields);
    let mut issues = Vec::new();

    let total = map.lookup(TOTAL_ALIASES).and_then(parse_amount);
    let taxable = map.lookup(TAXABLE_ALIASES).and_then(parse_amount);
    let tax = map.lookup(TAX_ALIASES).and_then(parse_amount);

    if let (Some(total), Some(taxable), Some(tax)) = (total, taxable, tax) {
        let calculated = taxable + tax;
        if (calculated - total).abs() > TOTAL_TOLERANCE {
            issues.push(ConsistencyIssue::new(
                "Total amount mismatch",
                format!(
                    "Taxable value ({}) + Tax ({}) = {}, but Total shows {}",
                    taxable, tax, calculated, total
                ),
                Severity::High,
            ));
        }
    }

    let issue_raw = map.lookup(ISSUE_DATE_ALIASES);
    let due_raw = map.lookup(DUE_DATE_ALIASES);
    let issue_date = issue_raw.and_then(parse_date);
    let due_date = due_raw.and_then(parse_date);

    if let (Some(raw), Some(date)) = (issue_raw, issue_date) {
        if date > today {
            issues.push(ConsistencyIssue::new(
                "Future invoice date",
                format!("Invoice date ({}) is in the future", raw.trim()),
                Severity::Medium,
            ));
        }
    }

    if let (Some(issued), Some(due)) = (issue_date, due_date) {
        if due < issued {
            issues.push(ConsistencyIssue::new(
                "Due date before invoice date",
                format!(
                    "Due date ({}) is before invoice date ({})",
                    due_raw.unwrap_or_default().trim(),
                    issue_raw.unwrap_or_default().trim()
                ),
                Severity::High,
            ));
        }
    }

    for (key, value) in &map.order {
        if (key.contains("amount") || key.contains("total"))
            && RE_SUSPICIOUS_AMOUNT.is_match(value.trim())
        {
            issues.push(ConsistencyIssue::new(
                "Suspicious amount pattern",
                format!("Field '{}' has suspicious value: {}", key, value.trim()),
                Severity::Medium,
            ));
        }
    }

    let risk_level = if issues.iter().any(|i| i.severity == Severity::High) {
        RiskLevel::High
    } else if !issues.is_empty() {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    ConsistencyFinding { issues, risk_level }
}
