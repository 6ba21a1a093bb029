//! Error types for the FateMap engine.

use thiserror::Error;

/// Errors that can occur while loading tracks, configuring the engine or
/// running a simulation.
///
/// Per-replicate prediction failures are *not* errors: a replicate that loses
/// its neighbourhood is frozen and flagged invalid, the call still succeeds.
#[derive(Debug, Error)]
pub enum FateMapError {
    /// A required column (track id, time or coordinate) is missing
    #[error("Schema error: {0}")]
    Schema(String),

    /// Invalid parameter (radius, sigma, n_samples, weighting policy)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Simulation or divergence requested without a single seed point
    #[error("No seed points given")]
    EmptySeed,

    /// Simulation requested before any track data was loaded
    #[error("No track data loaded")]
    NoData,

    /// Seed or mask dimensionality does not match the track data
    #[error("Dimension mismatch: expected {expected} spatial dims, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// A numeric cell could not be parsed
    #[error("Invalid value {value:?} in column {column} (row {row})")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl FateMapError {
    /// Creates a schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates an invalid-value error for the given cell.
    pub fn invalid_value(row: usize, column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            row,
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, FateMapError>;
