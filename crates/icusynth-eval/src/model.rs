use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::metrics::VerificationReport;

pub const REPORT_JSON: &str = "verification.json";
pub const REPORT_MARKDOWN: &str = "verification.md";
pub const VIOLATIONS_JSON: &str = "violations.json";

/// Options for verifying a published variant directory.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Fail with [`crate::EvalError::Violations`] when anything is found.
    pub strict: bool,
    /// Violations listed in the markdown report.
    pub max_examples: usize,
    /// Also write every violation to `violations.json`.
    pub write_violations: bool,
    /// Where reports go; defaults to the verified directory.
    pub out_dir: Option<PathBuf>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            strict: true,
            max_examples: 20,
            write_violations: false,
            out_dir: None,
        }
    }
}

/// A single verification failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub code: String,
    /// `table` or `table.column`.
    pub path: String,
    pub message: String,
    /// Zero-based data row, header excluded.
    pub row_index: Option<u64>,
}

impl Violation {
    pub fn table(code: &str, table: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            path: table.to_string(),
            message: message.into(),
            row_index: None,
        }
    }

    pub fn row(code: &str, path: String, row_index: usize, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            path,
            message: message.into(),
            row_index: Some(row_index as u64),
        }
    }
}

/// Outcome of one verification run.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub report_dir: PathBuf,
    pub report_path: PathBuf,
    pub markdown_path: PathBuf,
    pub violations_path: Option<PathBuf>,
    pub report: VerificationReport,
    pub markdown: String,
    pub violations: Vec<Violation>,
}

impl VerificationResult {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}
