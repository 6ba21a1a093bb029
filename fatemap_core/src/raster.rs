//! Helpers over `ndarray::ArrayD` for masks, heatmaps and divergence maps.

use ndarray::{ArrayD, Dimension, IxDyn, Zip};

/// Index of the cell nearest to real-valued coordinates, `None` when the
/// rank differs or the rounded point falls outside `shape`.
pub fn nearest_cell(shape: &[usize], coords: &[f64]) -> Option<IxDyn> {
    if coords.len() != shape.len() {
        return None;
    }
    let mut index = Vec::with_capacity(coords.len());
    for (&c, &extent) in coords.iter().zip(shape) {
        let rounded = c.round();
        if !(rounded >= 0.0 && rounded < extent as f64) {
            return None;
        }
        index.push(rounded as usize);
    }
    Some(IxDyn(&index))
}

/// Number of set cells.
pub fn count_set(mask: &ArrayD<bool>) -> usize {
    mask.iter().filter(|&&set| set).count()
}

/// Binary dilation with the face-connected cross, iterated `radius` times.
///
/// The result is every cell within L1 distance `radius` of a set cell.
pub fn dilate(mask: &ArrayD<bool>, radius: usize) -> ArrayD<bool> {
    let mut current = mask.clone();
    for _ in 0..radius {
        let mut next = current.clone();
        for (index, _) in current.indexed_iter().filter(|&(_, &set)| set) {
            let mut neighbor = index.slice().to_vec();
            for axis in 0..neighbor.len() {
                let center = neighbor[axis];
                if center > 0 {
                    neighbor[axis] = center - 1;
                    if let Some(cell) = next.get_mut(neighbor.as_slice()) {
                        *cell = true;
                    }
                }
                neighbor[axis] = center + 1;
                if let Some(cell) = next.get_mut(neighbor.as_slice()) {
                    *cell = true;
                }
                neighbor[axis] = center;
            }
        }
        current = next;
    }
    current
}

/// Mean of `values` over the cells set in `mask`, `None` if the mask is
/// empty or shaped differently.
pub fn mean_where(values: &ArrayD<f32>, mask: &ArrayD<bool>) -> Option<f64> {
    if values.shape() != mask.shape() {
        return None;
    }
    let mut sum = 0.0f64;
    let mut count = 0usize;
    Zip::from(values).and(mask).for_each(|&v, &set| {
        if set {
            sum += v as f64;
            count += 1;
        }
    });
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Largest value, 0 for an empty raster.
pub fn max_value(values: &ArrayD<f32>) -> f32 {
    values.fold(0.0f32, |m, &v| m.max(v))
}
