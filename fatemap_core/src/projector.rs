//! Projections of simulated replicates: trajectory tables and occupancy rasters.

use ndarray::{ArrayD, IxDyn};

use crate::raster::nearest_cell;
use crate::simulator::{Endpoints, PathRecorder};
use crate::tracks::{Position, SpatialDims, TrackRecord, TrackTable};

// ============================================================================
// TRAJECTORIES
// ============================================================================

/// Keeps every supported position of every replicate.
#[derive(Debug, Default, Clone)]
pub struct TrajectoryRecorder {
    /// Per row: `(t, position)` for each time the row was still valid
    histories: Vec<Vec<(i64, Position)>>,
}

impl TrajectoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattens the histories into a track table ordered by synthetic id,
    /// then time. Row `i` becomes track `i + 1`.
    pub fn into_table(self, dims: SpatialDims) -> TrackTable {
        let mut records = Vec::with_capacity(self.histories.iter().map(Vec::len).sum());
        for (row, mut history) in self.histories.into_iter().enumerate() {
            history.sort_by_key(|(t, _)| *t);
            let track_id = row as i64 + 1;
            records.extend(history.into_iter().map(|(t, position)| TrackRecord {
                track_id,
                t,
                position,
            }));
        }
        TrackTable::from_records(dims, records)
    }
}

impl PathRecorder for TrajectoryRecorder {
    fn record(&mut self, t: i64, positions: &[Position], valid: &[bool]) {
        if self.histories.len() < positions.len() {
            self.histories.resize_with(positions.len(), Vec::new);
        }
        for (row, (pos, ok)) in positions.iter().zip(valid).enumerate() {
            if *ok {
                self.histories[row].push((t, *pos));
            }
        }
    }
}

// ============================================================================
// HEATMAPS
// ============================================================================

/// Accumulates replicate occupancy per time point into a `[T, (Z,) Y, X]` raster.
///
/// Positions are rounded to the nearest cell; positions outside the raster
/// are counted in [`dropped`](Self::dropped) and otherwise ignored.
#[derive(Debug, Clone)]
pub struct HeatmapAccumulator {
    raster: ArrayD<f32>,
    t_min: i64,
    dims: SpatialDims,
    dropped: usize,
}

impl HeatmapAccumulator {
    /// Raster covering `[t_min, t_max]` by the given spatial shape.
    pub fn new(time_range: (i64, i64), spatial_shape: &[usize], dims: SpatialDims) -> Self {
        let (t_min, t_max) = time_range;
        let slices = (t_max - t_min).max(0) as usize + 1;
        let mut shape = Vec::with_capacity(spatial_shape.len() + 1);
        shape.push(slices);
        shape.extend_from_slice(spatial_shape);
        Self {
            raster: ArrayD::zeros(IxDyn(&shape)),
            t_min,
            dims,
            dropped: 0,
        }
    }

    /// Points that fell outside the raster.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn into_raster(self) -> ArrayD<f32> {
        self.raster
    }
}

impl PathRecorder for HeatmapAccumulator {
    fn record(&mut self, t: i64, positions: &[Position], valid: &[bool]) {
        let n = self.dims.count();
        let mut coords = [0.0f64; 4];
        coords[0] = (t - self.t_min) as f64;

        for (pos, ok) in positions.iter().zip(valid) {
            if !*ok {
                continue;
            }
            coords[1..=n].copy_from_slice(self.dims.coords(pos));
            match nearest_cell(self.raster.shape(), &coords[..=n]) {
                Some(cell) => self.raster[cell] += 1.0,
                None => self.dropped += 1,
            }
        }
    }
}

impl Endpoints {
    /// Occupancy of every replicate's final position (frozen rows included),
    /// as a purely spatial raster of `spatial_shape`.
    pub fn heatmap(&self, spatial_shape: &[usize]) -> ArrayD<f32> {
        let mut raster = ArrayD::<f32>::zeros(IxDyn(spatial_shape));
        for pos in &self.positions {
            if let Some(cell) = nearest_cell(spatial_shape, self.dims.coords(pos)) {
                raster[cell] += 1.0;
            }
        }
        raster
    }
}
