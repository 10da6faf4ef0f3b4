use serde::{Deserialize, Serialize};

use icusynth_generate::StatisticCheck;

/// Verification report contract version.
pub const REPORT_VERSION: &str = "0.1";

/// Machine-readable outcome of verifying one published variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub report_version: String,
    pub variant: String,
    pub directory: String,
    /// Seed recorded in `dataset_summary.json`, when the summary was readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub tables: Vec<TableMetrics>,
    pub integrity: IntegritySummary,
    /// Statistics echoed from the summary.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub statistics: Vec<StatisticCheck>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<WarningItem>,
    pub performance: PerformanceMetrics,
}

impl VerificationReport {
    pub fn table(&self, name: &str) -> Option<&TableMetrics> {
        self.tables.iter().find(|table| table.table == name)
    }
}

/// Per-table row counts and fingerprints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetrics {
    pub table: String,
    pub rows_found: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_expected: Option<u64>,
    pub sha256_found: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256_expected: Option<String>,
}

impl TableMetrics {
    /// `None` when there is nothing to compare against.
    pub fn checksum_matches(&self) -> Option<bool> {
        match (&self.sha256_found, &self.sha256_expected) {
            (Some(found), Some(expected)) => Some(found == expected),
            _ => None,
        }
    }
}

/// Counters for each family of checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegritySummary {
    pub primary_keys: ConstraintStats,
    pub foreign_keys: ConstraintStats,
    pub spans: ConstraintStats,
    pub timestamps: ConstraintStats,
    pub fingerprints: ConstraintStats,
}

impl IntegritySummary {
    pub fn total_violations(&self) -> u64 {
        self.primary_keys.violations
            + self.foreign_keys.violations
            + self.spans.violations
            + self.timestamps.violations
            + self.fingerprints.violations
    }
}

/// Generic check counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintStats {
    pub checked: u64,
    pub violations: u64,
}

/// Structured warning entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningItem {
    pub code: String,
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Timings for the verification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub load_ms: u128,
    pub validate_ms: u128,
    pub total_ms: u128,
}
