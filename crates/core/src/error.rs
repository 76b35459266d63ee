use chrono::NaiveDate;
use thiserror::Error;

use crate::models::TripPurpose;

/// Rejected before generation begins; surfaced to the caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("destination must not be empty")]
    EmptyDestination,
    #[error("end date {end} is before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    #[error("start date {start} is in the past")]
    StartInPast { start: NaiveDate },
}

/// Broken rule data or a missing default template. Fatal, never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no base template matches purpose '{}' and no default exists", purpose.as_str())]
    TemplateNotFound { purpose: TripPurpose },
    #[error("malformed rule set: {0}")]
    Malformed(String),
    #[error("failed reading rule set from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The engine fails only when template selection fails; everything that
/// goes wrong inside a single adjustment rule is isolated and logged.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}
