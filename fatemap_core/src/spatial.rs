//! Radius neighbour index over a fixed point set.
//!
//! Points are bucketed into a uniform hash grid whose cell edge equals the
//! query radius, so every neighbour of a query lies in the query's cell or one
//! of its adjacent cells (3^D cells per query).

use std::collections::HashMap;

use crate::tracks::{Position, SpatialDims};

type CellKey = [i64; 3];

/// Uniform-grid index answering "which points lie within `radius` of q".
#[derive(Debug, Clone)]
pub struct RadiusIndex {
    /// Indexed points
    points: Vec<Position>,

    /// Grid cell -> indices into `points`
    cells: HashMap<CellKey, Vec<usize>>,

    /// Query radius (also the grid cell edge)
    radius: f64,

    dims: SpatialDims,
}

impl RadiusIndex {
    /// Builds the index. `radius` must be positive.
    pub fn build(points: Vec<Position>, radius: f64, dims: SpatialDims) -> Self {
        let mut cells: HashMap<CellKey, Vec<usize>> = HashMap::new();
        for (i, p) in points.iter().enumerate() {
            cells.entry(cell_of(p, radius)).or_default().push(i);
        }
        Self {
            points,
            cells,
            radius,
            dims,
        }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Indexed point by position in the input order.
    pub fn point(&self, index: usize) -> &Position {
        &self.points[index]
    }

    /// Visits every point with `‖p - query‖ <= radius`, passing its index and
    /// distance. The boundary is inclusive.
    pub fn for_each_within(&self, query: &Position, mut visitor: impl FnMut(usize, f64)) {
        let radius_sq = self.radius * self.radius;
        let center = cell_of(query, self.radius);
        // planar positions keep the last axis at zero
        let last_span: i64 = match self.dims {
            SpatialDims::Two => 0,
            SpatialDims::Three => 1,
        };

        for d0 in -1..=1 {
            for d1 in -1..=1 {
                for d2 in -last_span..=last_span {
                    // saturate at the far edge of the key space
                    let key = [
                        center[0].saturating_add(d0),
                        center[1].saturating_add(d1),
                        center[2].saturating_add(d2),
                    ];
                    let Some(bucket) = self.cells.get(&key) else {
                        continue;
                    };
                    for &i in bucket {
                        let dist_sq = (self.points[i] - query).norm_squared();
                        if dist_sq <= radius_sq {
                            visitor(i, dist_sq.sqrt());
                        }
                    }
                }
            }
        }
    }

    /// Collects `(index, distance)` for every point within the radius, nearest first.
    pub fn query(&self, query: &Position) -> Vec<(usize, f64)> {
        let mut found = Vec::new();
        self.for_each_within(query, |i, d| found.push((i, d)));
        found.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        found
    }

}

fn cell_of(p: &Position, edge: f64) -> CellKey {
    [
        (p[0] / edge).floor() as i64,
        (p[1] / edge).floor() as i64,
        (p[2] / edge).floor() as i64,
    ]
}
