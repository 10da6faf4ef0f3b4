//! Core contracts for icusynth.
//!
//! This crate defines the in-memory table model, identifier and timestamp
//! formats, generator configuration, and the referential-integrity checks
//! shared by the generator, the evaluator and the CLI.

pub mod config;
pub mod error;
pub mod ids;
pub mod model;
pub mod time;
pub mod validation;

pub use config::{
    ConditionSpec, FormatAConfig, FormatBConfig, GeneratorConfig, WeightedLabel,
};
pub use error::{Error, Result};
pub use ids::{IdFormat, IdSequence};
pub use model::{Dataset, ForeignKeyRef, Record, SpanCheck, Table, TableSchema, Value};
pub use time::{DATE_FORMAT, Span, TIMESTAMP_FORMAT, format_timestamp, parse_timestamp};
pub use validation::{
    ReferentialIntegrityError, ViolationKind, collect_violations, validate_dataset,
};

/// Contract version written into every dataset summary.
pub const SUMMARY_VERSION: &str = "0.1";
