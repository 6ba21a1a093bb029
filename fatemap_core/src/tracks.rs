//! Track tables and the indexed dataset the step models are trained on.
//!
//! A [`TrackTable`] is the raw `(TrackID, t, [z,] y, x)` table plus opaque
//! pass-through columns. A [`TrackDataset`] normalises it into two indices:
//! positions observed at each time point, and the consecutive-time training
//! pairs of every track that has no gap across that single step.

use std::collections::BTreeMap;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::config::Direction;
use crate::error::{FateMapError, Result};

/// Spatial coordinates in table axis order: `(z, y, x)` for volumetric data,
/// `(y, x, 0)` for planar data.
pub type Position = Vector3<f64>;

/// Number of spatial axes carried by a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpatialDims {
    /// `(y, x)`
    Two,
    /// `(z, y, x)`
    Three,
}

impl SpatialDims {
    /// Number of active axes.
    #[inline]
    pub fn count(&self) -> usize {
        match self {
            SpatialDims::Two => 2,
            SpatialDims::Three => 3,
        }
    }

    /// Parses an axis count.
    pub fn from_count(count: usize) -> Result<Self> {
        match count {
            2 => Ok(SpatialDims::Two),
            3 => Ok(SpatialDims::Three),
            n => Err(FateMapError::schema(format!(
                "expected 2 (y, x) or 3 (z, y, x) spatial axes, got {}",
                n
            ))),
        }
    }

    /// Column names of the active axes, in table order.
    pub fn axis_names(&self) -> &'static [&'static str] {
        match self {
            SpatialDims::Two => &["y", "x"],
            SpatialDims::Three => &["z", "y", "x"],
        }
    }

    /// Builds a position from the active-axis coordinates.
    pub fn position(&self, coords: &[f64]) -> Position {
        let mut pos = Position::zeros();
        for (axis, value) in coords.iter().take(self.count()).enumerate() {
            pos[axis] = *value;
        }
        pos
    }

    /// Builds a position, checking the coordinate count.
    pub fn try_position(&self, coords: &[f64]) -> Result<Position> {
        if coords.len() != self.count() {
            return Err(FateMapError::DimensionMismatch {
                expected: self.count(),
                found: coords.len(),
            });
        }
        Ok(self.position(coords))
    }

    /// Active-axis coordinates of a position.
    #[inline]
    pub fn coords<'a>(&self, pos: &'a Position) -> &'a [f64] {
        &pos.as_slice()[..self.count()]
    }
}

/// One observation of one track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub track_id: i64,
    pub t: i64,
    pub position: Position,
}

/// An extra column carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyColumn {
    pub name: String,
    pub values: Vec<String>,
}

// ============================================================================
// TRACK TABLE
// ============================================================================

/// The raw track table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackTable {
    /// Spatial dimensionality shared by every record
    pub dims: SpatialDims,

    /// Observations, in input order
    pub records: Vec<TrackRecord>,

    /// Pass-through columns, one value per record
    pub properties: Vec<PropertyColumn>,
}

impl TrackTable {
    /// Creates an empty table.
    pub fn new(dims: SpatialDims) -> Self {
        Self {
            dims,
            records: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Creates a table from records without extra columns.
    pub fn from_records(dims: SpatialDims, records: Vec<TrackRecord>) -> Self {
        Self {
            dims,
            records,
            properties: Vec::new(),
        }
    }

    /// Builds a table from numeric rows `[TrackID, t, (z), y, x]`.
    ///
    /// Every row must have the same width, 4 or 5. Track ids and times must be
    /// integral.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let width = rows.first().map(|r| r.len()).unwrap_or(4);
        let dims = match width {
            4 => SpatialDims::Two,
            5 => SpatialDims::Three,
            w => {
                return Err(FateMapError::schema(format!(
                    "expected 4 or 5 columns (TrackID, t, [z,] y, x), got {}",
                    w
                )))
            }
        };

        let mut records = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(FateMapError::schema(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    width
                )));
            }
            records.push(TrackRecord {
                track_id: integral(row[0], i, "TrackID")?,
                t: integral(row[1], i, "t")?,
                position: dims.position(&row[2..]),
            });
        }

        Ok(Self::from_records(dims, records))
    }

    /// Numeric rows `[TrackID, t, (z), y, x]`, the inverse of [`from_rows`](Self::from_rows).
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.records
            .iter()
            .map(|r| {
                let mut row = vec![r.track_id as f64, r.t as f64];
                row.extend_from_slice(self.dims.coords(&r.position));
                row
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Smallest and largest time value, `None` for an empty table.
    pub fn time_range(&self) -> Option<(i64, i64)> {
        let t_min = self.records.iter().map(|r| r.t).min()?;
        let t_max = self.records.iter().map(|r| r.t).max()?;
        Some((t_min, t_max))
    }

    /// Multiplies one spatial axis by `factor` (e.g. anisotropic z spacing).
    pub fn scale_axis(&mut self, axis: usize, factor: f64) -> Result<()> {
        if axis >= self.dims.count() {
            return Err(FateMapError::DimensionMismatch {
                expected: self.dims.count(),
                found: axis + 1,
            });
        }
        for record in &mut self.records {
            record.position[axis] *= factor;
        }
        Ok(())
    }

    /// Raster shape covering every observed coordinate: `ceil(max) + 1` per axis.
    pub fn spatial_extent(&self) -> Vec<usize> {
        (0..self.dims.count())
            .map(|axis| {
                let max = self
                    .records
                    .iter()
                    .map(|r| r.position[axis])
                    .fold(f64::NEG_INFINITY, f64::max);
                if max.is_finite() && max > 0.0 {
                    max.ceil() as usize + 1
                } else {
                    1
                }
            })
            .collect()
    }

    /// Positions observed at time `t`.
    pub fn positions_at(&self, t: i64) -> Vec<Position> {
        self.records
            .iter()
            .filter(|r| r.t == t)
            .map(|r| r.position)
            .collect()
    }
}

fn integral(value: f64, row: usize, column: &str) -> Result<i64> {
    if value.is_finite() && value.fract() == 0.0 {
        Ok(value as i64)
    } else {
        Err(FateMapError::invalid_value(row, column, value.to_string()))
    }
}

// ============================================================================
// TRACK DATASET
// ============================================================================

/// Time-indexed view of a track table. Immutable once built.
#[derive(Debug, Clone)]
pub struct TrackDataset {
    dims: SpatialDims,

    /// `[t_min, t_max]`, `None` when the table is empty
    time_range: Option<(i64, i64)>,

    /// t -> positions observed at t
    by_time: BTreeMap<i64, Vec<Position>>,

    /// t -> (position at t, position at t + 1) for tracks present at both
    forward_pairs: BTreeMap<i64, Vec<(Position, Position)>>,

    /// Raster shape covering every observed coordinate
    extent: Vec<usize>,

    record_count: usize,
}

impl TrackDataset {
    /// Builds both indices from a table.
    pub fn build(table: &TrackTable) -> Self {
        let mut by_time: BTreeMap<i64, Vec<Position>> = BTreeMap::new();
        let mut by_track: BTreeMap<i64, Vec<(i64, Position)>> = BTreeMap::new();

        for record in &table.records {
            by_time.entry(record.t).or_default().push(record.position);
            by_track
                .entry(record.track_id)
                .or_default()
                .push((record.t, record.position));
        }

        let mut forward_pairs: BTreeMap<i64, Vec<(Position, Position)>> = BTreeMap::new();
        for nodes in by_track.values_mut() {
            nodes.sort_by_key(|(t, _)| *t);
            for pair in nodes.windows(2) {
                let (t0, p0) = pair[0];
                let (t1, p1) = pair[1];
                // gaps (and duplicated time points) break the chain
                if t1 == t0 + 1 {
                    forward_pairs.entry(t0).or_default().push((p0, p1));
                }
            }
        }

        Self {
            dims: table.dims,
            time_range: table.time_range(),
            by_time,
            forward_pairs,
            extent: table.spatial_extent(),
            record_count: table.len(),
        }
    }

    pub fn dims(&self) -> SpatialDims {
        self.dims
    }

    /// `[t_min, t_max]` of the observations.
    pub fn time_range(&self) -> Option<(i64, i64)> {
        self.time_range
    }

    /// Spatial raster shape covering the observations (`ceil(max) + 1` per axis).
    pub fn spatial_extent(&self) -> &[usize] {
        &self.extent
    }

    /// Number of observations the dataset was built from.
    pub fn len(&self) -> usize {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Positions observed at `t`, possibly empty.
    pub fn by_time(&self, t: i64) -> &[Position] {
        self.by_time.get(&t).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Training pairs for stepping from `t` one unit in `direction`.
    pub fn transitions(&self, t: i64, direction: Direction) -> Vec<(Position, Position)> {
        match direction {
            Direction::Forward => self.forward_pairs.get(&t).cloned().unwrap_or_default(),
            Direction::Backward => self
                .forward_pairs
                .get(&(t - 1))
                .map(|pairs| pairs.iter().map(|(prev, next)| (*next, *prev)).collect())
                .unwrap_or_default(),
        }
    }

    /// Transition times that have a model in `direction`, in walking order.
    pub fn transition_times(&self, direction: Direction) -> Vec<i64> {
        match self.time_range {
            None => Vec::new(),
            Some((t_min, t_max)) => match direction {
                Direction::Forward => (t_min..t_max).collect(),
                Direction::Backward => ((t_min + 1)..=t_max).rev().collect(),
            },
        }
    }

    /// Whether `t` is a valid starting point for one more step in `direction`.
    pub fn can_step_from(&self, t: i64, direction: Direction) -> bool {
        match (self.time_range, direction) {
            (None, _) => false,
            (Some((_, t_max)), Direction::Forward) => t < t_max,
            (Some((t_min, _)), Direction::Backward) => t > t_min,
        }
    }
}
