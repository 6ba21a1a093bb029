//! The stochastic stepping engine.
//!
//! Every seed is replicated `n_samples` times. At each step, every still-valid
//! replicate is jittered with Gaussian noise and moved to the weighted mean of
//! where nearby training tracks went next. A replicate with no training point
//! in range is frozen at its last position and stays invalid for the rest of
//! the run.
//!
//! What is kept of each run is decided by a [`PathRecorder`]: full trajectory
//! history, a time-resolved occupancy raster, or just the endpoints.

use ndarray::ArrayD;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, warn};

use crate::config::FateMapConfig;
use crate::error::{FateMapError, Result};
use crate::model::{FitState, StepModel, StepModelBank};
use crate::projector::{HeatmapAccumulator, TrajectoryRecorder};
use crate::spatial::RadiusIndex;
use crate::tracks::{Position, SpatialDims, TrackDataset, TrackTable};

// ============================================================================
// RECORDING
// ============================================================================

/// Receives replicate positions as the simulation advances.
///
/// `record` is called once with the starting positions at the seeding time,
/// then once after every step with the time just reached. Row `i` belongs to
/// seed `i / n_samples`, replicate `i % n_samples`. `valid[i]` is false once a
/// row has lost support; its position is then frozen.
pub trait PathRecorder {
    fn record(&mut self, t: i64, positions: &[Position], valid: &[bool]);
}

/// Records nothing; used when only the endpoints matter.
#[derive(Debug, Default, Clone, Copy)]
pub struct EndpointsOnly;

impl PathRecorder for EndpointsOnly {
    fn record(&mut self, _t: i64, _positions: &[Position], _valid: &[bool]) {}
}

/// Final state of every replicate.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Final (or frozen) position per row
    pub positions: Vec<Position>,

    /// Whether each row was still supported at the last step
    pub valid: Vec<bool>,

    pub seed_count: usize,
    pub n_samples: usize,
    pub dims: SpatialDims,

    /// Time reached by the last step
    pub final_time: i64,

    /// Number of steps taken
    pub steps: usize,
}

impl Endpoints {
    /// Final positions of the replicates of one seed.
    pub fn replicates(&self, seed: usize) -> &[Position] {
        let start = seed * self.n_samples;
        &self.positions[start..start + self.n_samples]
    }

    /// Number of rows that lost support before the run ended.
    pub fn invalid_count(&self) -> usize {
        self.valid.iter().filter(|v| !**v).count()
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

/// Result of [`FateMapper::simulate`], depending on the `heatmap` flag.
#[derive(Debug, Clone)]
pub enum FateMapOutput {
    /// Synthetic trajectories, one track per replicate
    Tracks(TrackTable),

    /// Occupancy counts of shape `[T, (Z,) Y, X]`
    Heatmap(ArrayD<f32>),
}

impl FateMapOutput {
    pub fn into_tracks(self) -> Option<TrackTable> {
        match self {
            FateMapOutput::Tracks(table) => Some(table),
            FateMapOutput::Heatmap(_) => None,
        }
    }

    pub fn into_heatmap(self) -> Option<ArrayD<f32>> {
        match self {
            FateMapOutput::Heatmap(raster) => Some(raster),
            FateMapOutput::Tracks(_) => None,
        }
    }
}

// ============================================================================
// FATE MAPPER
// ============================================================================

/// Simulates where cells seeded at a time point would have gone.
#[derive(Debug)]
pub struct FateMapper {
    config: FateMapConfig,
    bank: StepModelBank,
}

impl FateMapper {
    /// Creates an engine without track data.
    pub fn new(config: FateMapConfig) -> Result<Self> {
        config.validate()?;
        let bank = StepModelBank::new(&config);
        Ok(Self { config, bank })
    }

    /// Creates an engine trained on `tracks`.
    pub fn with_tracks(config: FateMapConfig, tracks: &TrackTable) -> Result<Self> {
        let mut mapper = Self::new(config)?;
        mapper.set_tracks(Some(tracks));
        Ok(mapper)
    }

    pub fn config(&self) -> &FateMapConfig {
        &self.config
    }

    pub fn fit_state(&self) -> FitState {
        self.bank.state()
    }

    pub fn dataset(&self) -> Option<&TrackDataset> {
        self.bank.dataset()
    }

    /// Replaces the configuration. Cached models are dropped even when the
    /// new configuration is rejected, in which case the old one stays in force.
    pub fn reconfigure(&mut self, config: FateMapConfig) -> Result<()> {
        self.bank.invalidate();
        config.validate()?;
        self.bank.configure(&config);
        self.config = config;
        Ok(())
    }

    /// Replaces (or clears) the training tracks.
    pub fn set_tracks(&mut self, tracks: Option<&TrackTable>) {
        self.set_dataset(tracks.map(TrackDataset::build));
    }

    /// Replaces (or clears) the indexed training data.
    pub fn set_dataset(&mut self, dataset: Option<TrackDataset>) {
        if let Some(d) = &dataset {
            debug!(
                "Loaded {} observations over time range {:?}",
                d.len(),
                d.time_range()
            );
        }
        self.bank.set_dataset(dataset);
    }

    /// Fits every step model of the time domain now.
    pub fn fit(&mut self) -> Result<()> {
        self.bank.fit_all()
    }

    /// Step model for transition `t`, fitting it if needed.
    pub fn model(&mut self, t: i64) -> Result<&StepModel> {
        self.bank.get_model(t)
    }

    /// Models fitted so far, keyed by transition time.
    pub fn models(&self) -> impl Iterator<Item = &StepModel> {
        self.bank.models()
    }

    /// Runs the simulation and projects it as a trajectory table, or as a
    /// time-resolved heatmap when `heatmap` is set.
    pub fn simulate(&mut self, seeds: &[Position], t0: i64) -> Result<FateMapOutput> {
        let (dims, time_range, extent) = {
            let dataset = self.bank.dataset().ok_or(FateMapError::NoData)?;
            (
                dataset.dims(),
                dataset.time_range().unwrap_or((t0, t0)),
                dataset.spatial_extent().to_vec(),
            )
        };

        if self.config.heatmap {
            let mut heatmap = HeatmapAccumulator::new(time_range, &extent, dims);
            self.run(seeds, t0, None, &mut heatmap)?;
            if heatmap.dropped() > 0 {
                warn!(
                    "{} replicate positions fell outside the {:?} heatmap",
                    heatmap.dropped(),
                    extent
                );
            }
            Ok(FateMapOutput::Heatmap(heatmap.into_raster()))
        } else {
            let mut trajectories = TrajectoryRecorder::new();
            self.run(seeds, t0, None, &mut trajectories)?;
            Ok(FateMapOutput::Tracks(trajectories.into_table(dims)))
        }
    }

    /// Runs the simulation keeping only the final replicate positions.
    ///
    /// `max_steps` caps the number of steps taken (`None` walks to the end of
    /// the time domain).
    pub fn simulate_endpoints(
        &mut self,
        seeds: &[Position],
        t0: i64,
        max_steps: Option<usize>,
    ) -> Result<Endpoints> {
        self.run(seeds, t0, max_steps, &mut EndpointsOnly)
    }

    /// Runs the stepping loop, feeding every step to `recorder`.
    pub fn run<R: PathRecorder>(
        &mut self,
        seeds: &[Position],
        t0: i64,
        max_steps: Option<usize>,
        recorder: &mut R,
    ) -> Result<Endpoints> {
        if seeds.is_empty() {
            return Err(FateMapError::EmptySeed);
        }
        if self.bank.state() == FitState::Unfitted {
            self.bank.fit_all()?;
        }

        let config = self.config.clone();
        let direction = config.direction();
        let dataset = self.bank.dataset().ok_or(FateMapError::NoData)?;
        let dims = dataset.dims();
        check_seed_dims(seeds, dims)?;

        if !dataset.can_step_from(t0, direction) {
            warn!(
                "Seed time {} has no {:?} transition (time range {:?}); returning seeds unchanged",
                t0,
                direction,
                dataset.time_range()
            );
        }

        let mut positions = replicate_seeds(seeds, t0, &config, dataset);
        let mut valid = vec![true; positions.len()];

        let noise = if config.sigma > 0.0 {
            Some(Normal::new(0.0, config.sigma).map_err(|e| FateMapError::config(e.to_string()))?)
        } else {
            None
        };
        let mut rng = ChaCha8Rng::seed_from_u64(config.rng_seed);

        debug!(
            "Simulating {} seeds x {} replicates from t={} ({:?})",
            seeds.len(),
            config.n_samples,
            t0,
            direction
        );
        recorder.record(t0, &positions, &valid);

        let mut t = t0;
        let mut steps = 0;
        loop {
            if max_steps.is_some_and(|max| steps >= max) {
                break;
            }
            let can_step = self
                .bank
                .dataset()
                .is_some_and(|d| d.can_step_from(t, direction));
            if !can_step {
                break;
            }

            let active: Vec<usize> = (0..positions.len()).filter(|&row| valid[row]).collect();
            if active.is_empty() {
                debug!("All replicates lost support at t={}", t);
                break;
            }

            let queries: Vec<Position> = active
                .iter()
                .map(|&row| {
                    let mut query = positions[row];
                    if let Some(normal) = &noise {
                        jitter(&mut query, normal, &mut rng, dims);
                    }
                    query
                })
                .collect();

            let model = self.bank.get_model(t)?;
            let predictions = model.predict_batch(&queries);

            let mut lost = 0;
            for (&row, prediction) in active.iter().zip(predictions) {
                match prediction {
                    Some(next) => positions[row] = next,
                    None => {
                        valid[row] = false;
                        lost += 1;
                    }
                }
            }

            t += direction.step();
            steps += 1;
            if lost > 0 {
                debug!("  t={} | {} replicates lost support", t, lost);
            }
            recorder.record(t, &positions, &valid);
        }

        Ok(Endpoints {
            positions,
            valid,
            seed_count: seeds.len(),
            n_samples: config.n_samples,
            dims,
            final_time: t,
            steps,
        })
    }
}

/// Starting rows: `n_samples` per seed, seed-major.
///
/// When binding is on, replicate `r` of a seed starts at its `(r mod k)`-th
/// nearest observed position at `t0` among the `k` within the radius. Seeds
/// with no observation in range keep their own coordinates.
fn replicate_seeds(
    seeds: &[Position],
    t0: i64,
    config: &FateMapConfig,
    dataset: &TrackDataset,
) -> Vec<Position> {
    let n = config.n_samples;
    let mut rows = Vec::with_capacity(seeds.len() * n);

    if !config.bind_to_existing {
        for seed in seeds {
            rows.extend(std::iter::repeat(*seed).take(n));
        }
        return rows;
    }

    let observed = RadiusIndex::build(dataset.by_time(t0).to_vec(), config.radius, dataset.dims());
    let mut unbound = 0;
    for seed in seeds {
        let neighbors = observed.query(seed);
        if neighbors.is_empty() {
            unbound += 1;
            rows.extend(std::iter::repeat(*seed).take(n));
        } else {
            for r in 0..n {
                let (i, _) = neighbors[r % neighbors.len()];
                rows.push(*observed.point(i));
            }
        }
    }
    if unbound > 0 {
        debug!(
            "{} of {} seeds have no observation within {} at t={}",
            unbound,
            seeds.len(),
            config.radius,
            t0
        );
    }
    rows
}

/// Planar data keeps the third component at zero; a seed using it is volumetric.
fn check_seed_dims(seeds: &[Position], dims: SpatialDims) -> Result<()> {
    if dims == SpatialDims::Two && seeds.iter().any(|seed| seed[2] != 0.0) {
        return Err(FateMapError::DimensionMismatch {
            expected: 2,
            found: 3,
        });
    }
    Ok(())
}

/// Adds independent Gaussian noise to the active axes.
fn jitter(pos: &mut Position, normal: &Normal<f64>, rng: &mut ChaCha8Rng, dims: SpatialDims) {
    for axis in 0..dims.count() {
        pos[axis] += normal.sample(rng);
    }
}
