//! Verification of published icusynth datasets.
//!
//! The verifier reads a variant directory back from disk, rebuilds the
//! in-memory tables from the CSV files, and re-runs the referential-integrity
//! checks. It also compares every file against the row counts and SHA-256
//! fingerprints recorded in `dataset_summary.json`.

pub mod engine;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod report;

pub use engine::{VerificationEngine, verify_output_dir};
pub use errors::EvalError;
pub use metrics::{ConstraintStats, IntegritySummary, TableMetrics, VerificationReport};
pub use model::{VerificationResult, VerifyOptions, Violation};
