//! Quota-matched synthetic ICU dataset generator.
//!
//! Each variant is built in one top-down pass from a single seeded random
//! source: population first, then encounters, then clinical events. The
//! finished dataset is checked for referential integrity and published
//! atomically as CSV files plus a JSON summary and a README.

pub mod assembler;
pub mod engine;
pub mod errors;
pub mod model;
pub mod output;
pub mod progression;
pub mod quota;
pub mod report;
pub mod sampler;
pub mod sequencer;
pub mod stats;
pub mod variants;

pub use engine::{GenerationEngine, GenerationResult, README_FILE, SUMMARY_FILE};
pub use errors::{GenerationError, SamplingError, Site};
pub use model::{DatasetSummary, GenerateOptions, StatisticCheck, TableReport};
pub use variants::{Variant, VariantOutput};
