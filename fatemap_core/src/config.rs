//! Engine configuration.
//!
//! The configuration is a plain value: the caller owns a copy, edits it and
//! hands it back through [`FateMapper::reconfigure`](crate::FateMapper::reconfigure).
//! The engine never mutates it behind the caller's back.

use serde::{Deserialize, Serialize};

use crate::error::{FateMapError, Result};

// ============================================================================
// WEIGHTING POLICY
// ============================================================================

/// Neighbour weighting used by the step regressors.
///
/// Selected once when a model is fitted; the prediction loop matches on the
/// variant instead of comparing strings per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weights {
    /// Every neighbour within the radius counts equally
    Uniform,

    /// Neighbours weighted by inverse distance to the query
    Distance,
}

impl Weights {
    /// Returns the policy name.
    pub fn name(&self) -> &'static str {
        match self {
            Weights::Uniform => "uniform",
            Weights::Distance => "distance",
        }
    }
}

impl std::fmt::Display for Weights {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Weights {
    type Err = FateMapError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uniform" => Ok(Weights::Uniform),
            "distance" => Ok(Weights::Distance),
            _ => Err(FateMapError::config(format!(
                "Unknown weighting policy: {} (expected uniform or distance)",
                s
            ))),
        }
    }
}

// ============================================================================
// TIME DIRECTION
// ============================================================================

/// Direction in which the stepping loop walks the time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    /// Direction implied by the `reverse` flag.
    pub fn from_reverse(reverse: bool) -> Self {
        if reverse {
            Direction::Backward
        } else {
            Direction::Forward
        }
    }

    /// Signed time increment of one step.
    #[inline]
    pub fn step(&self) -> i64 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the [`FateMapper`](crate::FateMapper).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FateMapConfig {
    /// Neighbourhood radius used by the step regressors (default: 25.0)
    pub radius: f64,

    /// Walk the time axis from end to start (default: false)
    pub reverse: bool,

    /// Standard deviation of the per-step Gaussian jitter, 0 disables it (default: 0.1)
    pub sigma: f64,

    /// Neighbour weighting policy (default: uniform)
    pub weights: Weights,

    /// Replicates simulated per seed (default: 50)
    pub n_samples: usize,

    /// Snap replicates onto observed track positions at the seeding time (default: true)
    pub bind_to_existing: bool,

    /// Produce a raster instead of a trajectory table (default: false)
    pub heatmap: bool,

    /// Master seed for the jitter stream; every call reseeds from it (default: 42)
    pub rng_seed: u64,
}

impl Default for FateMapConfig {
    fn default() -> Self {
        Self {
            radius: 25.0,
            reverse: false,
            sigma: 0.1,
            weights: Weights::Uniform,
            n_samples: 50,
            bind_to_existing: true,
            heatmap: false,
            rng_seed: 42,
        }
    }
}

impl FateMapConfig {
    /// Defaults used by the divergence measure.
    pub fn divergence() -> Self {
        Self {
            radius: 1.0,
            reverse: false,
            sigma: 0.1,
            weights: Weights::Distance,
            n_samples: 25,
            bind_to_existing: false,
            heatmap: false,
            rng_seed: 42,
        }
    }

    /// Time direction implied by `reverse`.
    pub fn direction(&self) -> Direction {
        Direction::from_reverse(self.reverse)
    }

    /// Checks parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(FateMapError::config(format!(
                "radius must be positive, got {}",
                self.radius
            )));
        }
        if !self.sigma.is_finite() || self.sigma < 0.0 {
            return Err(FateMapError::config(format!(
                "sigma must be non-negative, got {}",
                self.sigma
            )));
        }
        if self.n_samples < 1 {
            return Err(FateMapError::config("n_samples must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(FateMapConfig::default().validate().is_ok());
        assert!(FateMapConfig::divergence().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let bad_radius = FateMapConfig {
            radius: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            bad_radius.validate(),
            Err(FateMapError::Configuration(_))
        ));

        let bad_sigma = FateMapConfig {
            sigma: -0.5,
            ..Default::default()
        };
        assert!(bad_sigma.validate().is_err());

        let bad_samples = FateMapConfig {
            n_samples: 0,
            ..Default::default()
        };
        assert!(bad_samples.validate().is_err());

        let nan_radius = FateMapConfig {
            radius: f64::NAN,
            ..Default::default()
        };
        assert!(nan_radius.validate().is_err());
    }

    #[test]
    fn test_weights_parsing() {
        assert_eq!("uniform".parse::<Weights>().unwrap(), Weights::Uniform);
        assert_eq!("Distance".parse::<Weights>().unwrap(), Weights::Distance);
        assert!(matches!(
            "gaussian".parse::<Weights>(),
            Err(FateMapError::Configuration(_))
        ));
        assert_eq!(Weights::Distance.to_string(), "distance");
    }

    #[test]
    fn test_direction_step() {
        assert_eq!(Direction::from_reverse(false).step(), 1);
        assert_eq!(Direction::from_reverse(true).step(), -1);
    }
}
