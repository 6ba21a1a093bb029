//! Per-seed spread of simulated fates.
//!
//! Every set cell of a mask is used as a seed. After the simulation, the
//! replicate end points of each seed are summarised by the population
//! standard deviation along each spatial axis, summed over the axes. Cells
//! whose neighbourhood moves coherently score low; cells sitting on a split
//! between diverging flows score high.

use ndarray::{ArrayD, Dimension, IxDyn};
use tracing::debug;

use crate::config::FateMapConfig;
use crate::error::{FateMapError, Result};
use crate::model::FitState;
use crate::simulator::{Endpoints, FateMapper};
use crate::tracks::{Position, TrackDataset, TrackTable};

/// Fate-spread estimator built on a [`FateMapper`] with binding and heatmap
/// projection disabled.
#[derive(Debug)]
pub struct Divergence {
    mapper: FateMapper,
}

impl Divergence {
    /// Creates an estimator without track data. `heatmap` and
    /// `bind_to_existing` are forced off.
    pub fn new(config: FateMapConfig) -> Result<Self> {
        Ok(Self {
            mapper: FateMapper::new(constrain(config))?,
        })
    }

    /// Creates an estimator trained on `tracks`.
    pub fn with_tracks(config: FateMapConfig, tracks: &TrackTable) -> Result<Self> {
        Ok(Self {
            mapper: FateMapper::with_tracks(constrain(config), tracks)?,
        })
    }

    pub fn config(&self) -> &FateMapConfig {
        self.mapper.config()
    }

    pub fn fit_state(&self) -> FitState {
        self.mapper.fit_state()
    }

    pub fn dataset(&self) -> Option<&TrackDataset> {
        self.mapper.dataset()
    }

    /// Replaces the configuration; see [`FateMapper::reconfigure`].
    pub fn reconfigure(&mut self, config: FateMapConfig) -> Result<()> {
        self.mapper.reconfigure(constrain(config))
    }

    pub fn set_tracks(&mut self, tracks: Option<&TrackTable>) {
        self.mapper.set_tracks(tracks);
    }

    pub fn set_dataset(&mut self, dataset: Option<TrackDataset>) {
        self.mapper.set_dataset(dataset);
    }

    /// Divergence of every set cell of `mask`, seeded at `time_point`.
    ///
    /// `max_length` bounds the number of simulated steps. The result has the
    /// mask's shape, with zero at unset cells.
    pub fn compute(
        &mut self,
        mask: &ArrayD<bool>,
        time_point: i64,
        max_length: Option<usize>,
    ) -> Result<ArrayD<f32>> {
        let dims = self.mapper.dataset().ok_or(FateMapError::NoData)?.dims();
        if mask.ndim() != dims.count() {
            return Err(FateMapError::DimensionMismatch {
                expected: dims.count(),
                found: mask.ndim(),
            });
        }

        let cells: Vec<IxDyn> = mask
            .indexed_iter()
            .filter(|&(_, &set)| set)
            .map(|(index, _)| index)
            .collect();
        if cells.is_empty() {
            return Err(FateMapError::EmptySeed);
        }

        let seeds: Vec<Position> = cells
            .iter()
            .map(|cell| {
                let coords: Vec<f64> = cell.slice().iter().map(|&i| i as f64).collect();
                dims.position(&coords)
            })
            .collect();

        let endpoints = self
            .mapper
            .simulate_endpoints(&seeds, time_point, max_length)?;
        debug!(
            "Divergence over {} seeds: {} steps, {} replicates lost support",
            seeds.len(),
            endpoints.steps,
            endpoints.invalid_count()
        );

        let mut result = ArrayD::<f32>::zeros(mask.raw_dim());
        for (cell, spread) in cells.into_iter().zip(replicate_spread(&endpoints)) {
            result[cell] = spread as f32;
        }
        Ok(result)
    }
}

fn constrain(mut config: FateMapConfig) -> FateMapConfig {
    config.heatmap = false;
    config.bind_to_existing = false;
    config
}

/// Sum over spatial axes of the population standard deviation of each seed's
/// replicate end points.
pub fn replicate_spread(endpoints: &Endpoints) -> Vec<f64> {
    let n = endpoints.n_samples as f64;
    (0..endpoints.seed_count)
        .map(|seed| {
            let replicates = endpoints.replicates(seed);
            (0..endpoints.dims.count())
                .map(|axis| {
                    let mean = replicates.iter().map(|p| p[axis]).sum::<f64>() / n;
                    let var = replicates
                        .iter()
                        .map(|p| (p[axis] - mean).powi(2))
                        .sum::<f64>()
                        / n;
                    var.sqrt()
                })
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracks::SpatialDims;
    use approx::assert_relative_eq;

    /// Tracks on a vertical line at x=2 with a gap at y=35: those above
    /// move up 3 per step, those below move down.
    fn splitting_tracks() -> TrackTable {
        let mut rows = Vec::new();
        for (id, y0) in (30..=40).filter(|y| *y != 35).enumerate() {
            let drift = if y0 > 35 { 3.0 } else { -3.0 };
            for t in 0..6 {
                rows.push(vec![id as f64 + 1.0, t as f64, y0 as f64 + drift * t as f64, 2.0]);
            }
        }
        TrackTable::from_rows(&rows).unwrap()
    }

    fn config() -> FateMapConfig {
        FateMapConfig {
            radius: 1.5,
            sigma: 0.5,
            n_samples: 20,
            ..FateMapConfig::divergence()
        }
    }

    #[test]
    fn test_constrained_flags() {
        let divergence = Divergence::new(FateMapConfig {
            heatmap: true,
            bind_to_existing: true,
            ..config()
        })
        .unwrap();
        assert!(!divergence.config().heatmap);
        assert!(!divergence.config().bind_to_existing);
    }

    #[test]
    fn test_spread_of_identical_replicates_is_zero() {
        let endpoints = Endpoints {
            positions: vec![Position::new(1.0, 2.0, 0.0); 4],
            valid: vec![true; 4],
            seed_count: 2,
            n_samples: 2,
            dims: SpatialDims::Two,
            final_time: 1,
            steps: 1,
        };
        assert_eq!(replicate_spread(&endpoints), vec![0.0, 0.0]);
    }

    #[test]
    fn test_spread_is_summed_population_std() {
        let endpoints = Endpoints {
            positions: vec![Position::new(0.0, 0.0, 0.0), Position::new(2.0, 4.0, 0.0)],
            valid: vec![true; 2],
            seed_count: 1,
            n_samples: 2,
            dims: SpatialDims::Two,
            final_time: 1,
            steps: 1,
        };
        // std(0, 2) = 1, std(0, 4) = 2
        assert_relative_eq!(replicate_spread(&endpoints)[0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mask_rank_and_emptiness() {
        let mut divergence = Divergence::with_tracks(config(), &splitting_tracks()).unwrap();

        let volumetric = ArrayD::from_elem(IxDyn(&[2, 2, 2]), false);
        assert!(matches!(
            divergence.compute(&volumetric, 0, None),
            Err(FateMapError::DimensionMismatch { expected: 2, found: 3 })
        ));

        let empty = ArrayD::from_elem(IxDyn(&[64, 8]), false);
        assert!(matches!(
            divergence.compute(&empty, 0, None),
            Err(FateMapError::EmptySeed)
        ));
    }

    #[test]
    fn test_split_point_scores_higher() {
        let mut divergence = Divergence::with_tracks(config(), &splitting_tracks()).unwrap();

        let mut mask = ArrayD::from_elem(IxDyn(&[64, 8]), false);
        mask[IxDyn(&[35, 2])] = true; // on the split
        mask[IxDyn(&[38, 2])] = true; // inside the upward flow

        let result = divergence.compute(&mask, 0, None).unwrap();
        assert_eq!(result.shape(), mask.shape());
        assert_eq!(result[IxDyn(&[0, 0])], 0.0);

        let split = result[IxDyn(&[35, 2])];
        let coherent = result[IxDyn(&[38, 2])];
        assert!(
            split > coherent,
            "split {} vs coherent {}",
            split,
            coherent
        );
    }

    #[test]
    fn test_max_length_shortens_the_walk() {
        let mut divergence = Divergence::with_tracks(config(), &splitting_tracks()).unwrap();
        let mut mask = ArrayD::from_elem(IxDyn(&[64, 8]), false);
        mask[IxDyn(&[35, 2])] = true;

        let full = divergence.compute(&mask, 0, None).unwrap();
        let short = divergence.compute(&mask, 0, Some(1)).unwrap();
        assert!(short[IxDyn(&[35, 2])] < full[IxDyn(&[35, 2])]);
    }
}
