use thiserror::Error;

use crate::validation::ReferentialIntegrityError;

/// Core error type shared across icusynth crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The generator configuration violates its own invariants.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// A table or record does not match its declared schema.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// A child row references a missing parent or escapes its parent's span.
    #[error(transparent)]
    ReferentialIntegrity(#[from] ReferentialIntegrityError),
}

/// Convenience alias for results returned by icusynth crates.
pub type Result<T> = std::result::Result<T, Error>;
