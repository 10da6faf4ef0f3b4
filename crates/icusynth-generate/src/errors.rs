use thiserror::Error;

/// Where a sampled value ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    pub table: &'static str,
    pub column: &'static str,
}

impl Site {
    pub const fn new(table: &'static str, column: &'static str) -> Self {
        Self { table, column }
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Fatal sampling problems; they indicate a bad configuration, not bad luck.
#[derive(Debug, Error, PartialEq)]
pub enum SamplingError {
    #[error("invalid distribution for {site}: {reason}")]
    InvalidParameters { site: Site, reason: String },
    #[error("target rate {rate} for {name} is outside [0, 1]")]
    InvalidRate { name: String, rate: f64 },
}

impl SamplingError {
    pub fn invalid(site: Site, reason: impl Into<String>) -> Self {
        SamplingError::InvalidParameters {
            site,
            reason: reason.into(),
        }
    }
}

/// Errors emitted by the generation engine.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("sampling error: {0}")]
    Sampling(#[from] SamplingError),
    #[error(transparent)]
    Core(#[from] icusynth_core::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid output path: {0}")]
    OutputPath(String),
}
