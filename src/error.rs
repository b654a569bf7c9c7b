//! Unified error handling.
//!
//! Only structural problems surface as errors: records that break the cleaning
//! contract, unreadable inputs and bad configuration. Per-trip anomalies such as
//! a non-positive duration are filtering rules and are counted instead.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the analysis pipeline.
#[derive(Error, Debug)]
pub enum OdError {
    #[error("record {record} (vehicle {vehicle}): missing required field '{field}'")]
    MissingField {
        record: usize,
        vehicle: String,
        field: &'static str,
    },

    #[error("record {record} (vehicle {vehicle}): unparseable timestamp '{value}'")]
    InvalidTimestamp {
        record: usize,
        vehicle: String,
        value: String,
    },

    #[error("record {record} (vehicle {vehicle}): occupancy status must be 0 or 1, got {value}")]
    InvalidStatus {
        record: usize,
        vehicle: String,
        value: i64,
    },

    #[error("vehicle {vehicle}: timestamps go backwards at position {position}")]
    UnsortedTrace { vehicle: String, position: usize },

    #[error("vehicle {vehicle}: non-finite coordinate at position {position}")]
    InvalidCoordinate { vehicle: String, position: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid region boundaries: {0}")]
    InvalidRegions(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("I/O error accessing '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OdError {
    /// Wrap an I/O error with the path that caused it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OdError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by input that broke the cleaning contract.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OdError::MissingField { .. }
                | OdError::InvalidTimestamp { .. }
                | OdError::InvalidStatus { .. }
                | OdError::UnsortedTrace { .. }
                | OdError::InvalidCoordinate { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, OdError>;

/// Extension for turning absent CSV columns into [`OdError::MissingField`].
pub trait OptionExt<T> {
    fn ok_or_missing(self, record: usize, vehicle: &str, field: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_missing(self, record: usize, vehicle: &str, field: &'static str) -> Result<T> {
        self.ok_or_else(|| OdError::MissingField {
            record,
            vehicle: vehicle.to_string(),
            field,
        })
    }
}
