//! Per-timestep radius-neighbour regressors and the bank that caches them.
//!
//! A [`StepModel`] answers "where did tracks near here go next" for one
//! transition time: the prediction for a query is the weighted mean of the
//! next positions of every training point within `radius`. A query with no
//! training point in range has no prediction.
//!
//! The [`StepModelBank`] owns the dataset and one model per transition time.
//! Models are fitted lazily and the whole cache is dropped by
//! [`StepModelBank::invalidate`], the single invalidation entry point.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::{Direction, FateMapConfig, Weights};
use crate::error::{FateMapError, Result};
use crate::spatial::RadiusIndex;
use crate::tracks::{Position, SpatialDims, TrackDataset};

/// Lower bound on neighbour distance under inverse-distance weighting.
pub const DISTANCE_EPSILON: f64 = 1e-12;

// ============================================================================
// STEP MODEL
// ============================================================================

/// Radius-neighbour regressor for a single transition `t -> t ± 1`.
#[derive(Debug, Clone)]
pub struct StepModel {
    /// Transition time this model steps from
    time: i64,

    /// Spatial index over the positions at `time`
    index: RadiusIndex,

    /// Position each indexed point moved to, same order as the index
    targets: Vec<Position>,

    weights: Weights,
}

impl StepModel {
    /// Fits a model from `(position at t, position at t ± 1)` pairs.
    pub fn fit(
        time: i64,
        pairs: &[(Position, Position)],
        radius: f64,
        weights: Weights,
        dims: SpatialDims,
    ) -> Self {
        let inputs: Vec<Position> = pairs.iter().map(|(x, _)| *x).collect();
        let targets: Vec<Position> = pairs.iter().map(|(_, y)| *y).collect();
        Self {
            time,
            index: RadiusIndex::build(inputs, radius, dims),
            targets,
            weights,
        }
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn weights(&self) -> Weights {
        self.weights
    }

    pub fn radius(&self) -> f64 {
        self.index.radius()
    }

    /// Number of training pairs.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// An empty model has no training pairs; every query against it is invalid.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Predicted next position, `None` when no training point is in range.
    pub fn predict(&self, query: &Position) -> Option<Position> {
        let mut weighted_sum = Position::zeros();
        let mut total_weight = 0.0;

        match self.weights {
            Weights::Uniform => self.index.for_each_within(query, |i, _| {
                weighted_sum += self.targets[i];
                total_weight += 1.0;
            }),
            Weights::Distance => self.index.for_each_within(query, |i, dist| {
                let w = 1.0 / dist.max(DISTANCE_EPSILON);
                weighted_sum += self.targets[i] * w;
                total_weight += w;
            }),
        }

        if total_weight > 0.0 {
            Some(weighted_sum / total_weight)
        } else {
            None
        }
    }

    /// Predicts a batch of queries; `None` entries mark unsupported rows.
    pub fn predict_batch(&self, queries: &[Position]) -> Vec<Option<Position>> {
        queries.iter().map(|q| self.predict(q)).collect()
    }
}

// ============================================================================
// MODEL BANK
// ============================================================================

/// Whether the bank's cache reflects the current configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitState {
    Unfitted,
    Fitted,
}

/// Parameters a fitted model depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ModelParams {
    radius: f64,
    weights: Weights,
    direction: Direction,
}

impl From<&FateMapConfig> for ModelParams {
    fn from(config: &FateMapConfig) -> Self {
        Self {
            radius: config.radius,
            weights: config.weights,
            direction: config.direction(),
        }
    }
}

/// Cache of step models, one per transition time.
#[derive(Debug)]
pub struct StepModelBank {
    dataset: Option<TrackDataset>,
    params: ModelParams,
    models: BTreeMap<i64, StepModel>,
    state: FitState,
}

impl StepModelBank {
    /// Creates an empty, unfitted bank.
    pub fn new(config: &FateMapConfig) -> Self {
        Self {
            dataset: None,
            params: ModelParams::from(config),
            models: BTreeMap::new(),
            state: FitState::Unfitted,
        }
    }

    pub fn state(&self) -> FitState {
        self.state
    }

    pub fn dataset(&self) -> Option<&TrackDataset> {
        self.dataset.as_ref()
    }

    /// Drops every cached model.
    pub fn invalidate(&mut self) {
        if self.state == FitState::Fitted {
            debug!("Invalidating {} cached step models", self.models.len());
        }
        self.models.clear();
        self.state = FitState::Unfitted;
    }

    /// Replaces the training data; invalidates the cache.
    pub fn set_dataset(&mut self, dataset: Option<TrackDataset>) {
        self.dataset = dataset;
        self.invalidate();
    }

    /// Adopts new model parameters; invalidates the cache.
    pub fn configure(&mut self, config: &FateMapConfig) {
        self.params = ModelParams::from(config);
        self.invalidate();
    }

    /// Eagerly fits every transition model of the time domain.
    pub fn fit_all(&mut self) -> Result<()> {
        let dataset = self.dataset.as_ref().ok_or(FateMapError::NoData)?;
        let params = self.params;

        self.models.clear();
        for t in dataset.transition_times(params.direction) {
            let model = build_model(dataset, params, t);
            self.models.insert(t, model);
        }
        self.state = FitState::Fitted;

        debug!(
            "Fitted {} step models (radius={}, weights={}, direction={:?})",
            self.models.len(),
            params.radius,
            params.weights,
            params.direction
        );
        Ok(())
    }

    /// Model for transition `t`, fitted on first request.
    pub fn get_model(&mut self, t: i64) -> Result<&StepModel> {
        let dataset = self.dataset.as_ref().ok_or(FateMapError::NoData)?;
        let params = self.params;
        let model = self
            .models
            .entry(t)
            .or_insert_with(|| build_model(dataset, params, t));
        self.state = FitState::Fitted;
        Ok(model)
    }

    /// Cached models, keyed by transition time.
    pub fn models(&self) -> impl Iterator<Item = &StepModel> {
        self.models.values()
    }
}

fn build_model(dataset: &TrackDataset, params: ModelParams, t: i64) -> StepModel {
    let pairs = dataset.transitions(t, params.direction);
    StepModel::fit(t, &pairs, params.radius, params.weights, dataset.dims())
}
