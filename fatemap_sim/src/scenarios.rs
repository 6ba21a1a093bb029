//! Synthetic track scenarios for demos and end-to-end tests.

use fatemap_core::{SpatialDims, TrackRecord, TrackTable};
use ndarray::{ArrayD, IxDyn, Zip};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal, Uniform};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Noisy copies of one straight line
    Line,

    /// Two disks on a 128x128 grid: one coherent flow, one splitting flow
    Divergence,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![ScenarioId::Line, ScenarioId::Divergence]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Line => "line",
            ScenarioId::Divergence => "divergence",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Line => "5 noisy tracks along one line from ~(15,15,15) to ~(70,70,70)",
            ScenarioId::Divergence => {
                "disk at (32,32) moving together, disk at (76,76) splitting in two directions"
            }
        }
    }

    /// Generates the scenario's track table.
    pub fn generate(&self, seed: u64) -> TrackTable {
        match self {
            ScenarioId::Line => line_tracks(5, 50, SpatialDims::Three, seed),
            ScenarioId::Divergence => divergence_data(100, seed).tracks,
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "line" => Ok(ScenarioId::Line),
            "divergence" | "div" => Ok(ScenarioId::Divergence),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

/// `n` evenly spaced weights from 0 to 1 inclusive.
fn linspace(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n).map(|i| i as f64 / (n - 1) as f64).collect(),
    }
}

/// `n_tracks` noisy copies of a single straight line.
///
/// The line runs from a start drawn in `[5, 25)` to an end drawn in
/// `[60, 80)` on every axis over `length` time points. Each copy adds unit
/// Gaussian noise per coordinate. Track ids are `1..=n_tracks`.
pub fn line_tracks(n_tracks: usize, length: usize, dims: SpatialDims, seed: u64) -> TrackTable {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let d = dims.count();

    let start: Vec<f64> = (0..d).map(|_| rng.gen_range(5.0..25.0)).collect();
    let end: Vec<f64> = (0..d).map(|_| rng.gen_range(60.0..80.0)).collect();
    let weights = linspace(length);

    let mut records = Vec::with_capacity(n_tracks * length);
    let mut coords = vec![0.0; d];
    for i in 0..n_tracks {
        for (t, w) in weights.iter().enumerate() {
            for axis in 0..d {
                let noise: f64 = StandardNormal.sample(&mut rng);
                coords[axis] = start[axis] * (1.0 - w) + end[axis] * w + noise;
            }
            records.push(TrackRecord {
                track_id: i as i64 + 1,
                t: t as i64,
                position: dims.position(&coords),
            });
        }
    }
    TrackTable::from_records(dims, records)
}

/// Masks and tracks of the two-disk divergence scenario.
#[derive(Debug, Clone)]
pub struct DivergenceData {
    /// Source region whose tracks move together
    pub coherent: ArrayD<bool>,

    /// Source region whose tracks split in opposite directions
    pub splitting: ArrayD<bool>,

    /// Union of both regions
    pub mask: ArrayD<bool>,

    pub tracks: TrackTable,
}

const GRID_SIZE: usize = 128;
const DISK_RADIUS: f64 = 5.0;

/// Open disk `‖p - center‖ < radius` on a square grid.
fn disk(size: usize, center: (f64, f64), radius: f64) -> ArrayD<bool> {
    ArrayD::from_shape_fn(IxDyn(&[size, size]), |index| {
        let dy = index[0] as f64 - center.0;
        let dx = index[1] as f64 - center.1;
        dy * dy + dx * dx < radius * radius
    })
}

/// One track per set cell of `region`, all sharing a random straight drift.
///
/// Each track starts on its cell and drifts by `orientation * shift` over
/// `length` steps, with unit Gaussian noise per coordinate. About half of the
/// tracks are kept. Returns the next unused track id.
fn drifting_tracks(
    region: &ArrayD<bool>,
    length: usize,
    first_id: i64,
    orientation: f64,
    rng: &mut ChaCha8Rng,
    records: &mut Vec<TrackRecord>,
) -> i64 {
    let cells: Vec<IxDyn> = region
        .indexed_iter()
        .filter(|&(_, &set)| set)
        .map(|(index, _)| index)
        .collect();
    let shift_dist = Uniform::new(0.0, 50.0);
    let shift = [
        shift_dist.sample(rng) * orientation,
        shift_dist.sample(rng) * orientation,
    ];
    let weights = linspace(length);

    let mut next_id = first_id;
    for cell in &cells {
        let mut track = Vec::with_capacity(length);
        for (t, w) in weights.iter().enumerate() {
            let mut coords = [0.0; 2];
            for axis in 0..2 {
                let noise: f64 = StandardNormal.sample(rng);
                coords[axis] = cell[axis] as f64 + shift[axis] * w + noise;
            }
            track.push(TrackRecord {
                track_id: next_id,
                t: t as i64,
                position: SpatialDims::Two.position(&coords),
            });
        }
        if rng.gen_bool(0.5) {
            records.extend(track);
        }
        next_id += 1;
    }
    next_id
}

/// Two source disks of radius 5 on a 128x128 grid.
///
/// Tracks from the disk at (32, 32) share one drift. The disk at (76, 76)
/// carries two sets of tracks drifting in opposite directions.
pub fn divergence_data(length: usize, seed: u64) -> DivergenceData {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let coherent = disk(GRID_SIZE, (32.0, 32.0), DISK_RADIUS);
    let splitting = disk(GRID_SIZE, (76.0, 76.0), DISK_RADIUS);

    let mask = Zip::from(&coherent)
        .and(&splitting)
        .map_collect(|&a, &b| a || b);

    let mut records = Vec::new();
    let mut next_id = 1;
    next_id = drifting_tracks(&coherent, length, next_id, 1.0, &mut rng, &mut records);
    next_id = drifting_tracks(&splitting, length, next_id, 1.0, &mut rng, &mut records);
    drifting_tracks(&splitting, length, next_id, -1.0, &mut rng, &mut records);

    DivergenceData {
        coherent,
        splitting,
        mask,
        tracks: TrackTable::from_records(SpatialDims::Two, records),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fatemap_core::count_set;
    use proptest::prelude::*;

    #[test]
    fn test_scenario_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>().unwrap(), scenario);
            assert!(!scenario.description().is_empty());
        }
        assert!("flash_mob".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_line_tracks_shape() {
        let table = line_tracks(3, 20, SpatialDims::Three, 42);
        assert_eq!(table.len(), 60);
        assert_eq!(table.time_range(), Some((0, 19)));

        let ids: std::collections::BTreeSet<i64> = table.records.iter().map(|r| r.track_id).collect();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_line_tracks_are_deterministic() {
        let a = line_tracks(2, 10, SpatialDims::Two, 7);
        let b = line_tracks(2, 10, SpatialDims::Two, 7);
        let c = line_tracks(2, 10, SpatialDims::Two, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.records.iter().all(|r| r.position[2] == 0.0));
    }

    #[test]
    fn test_divergence_regions() {
        let data = divergence_data(10, 42);
        assert_eq!(count_set(&data.coherent), 69);
        assert_eq!(count_set(&data.splitting), 69);
        assert_eq!(count_set(&data.mask), 138);
        assert!(data.coherent[IxDyn(&[32, 32])]);
        assert!(!data.splitting[IxDyn(&[32, 32])]);

        assert_eq!(data.tracks.dims, SpatialDims::Two);
        assert_eq!(data.tracks.time_range(), Some((0, 9)));
        assert_eq!(data.tracks.len() % 10, 0);
        assert!(!data.tracks.is_empty());
    }

    proptest! {
        #[test]
        fn prop_line_tracks_are_gapless(
            n_tracks in 1usize..6,
            length in 2usize..30,
            seed in any::<u64>(),
        ) {
            let table = line_tracks(n_tracks, length, SpatialDims::Two, seed);
            prop_assert_eq!(table.len(), n_tracks * length);
            prop_assert_eq!(table.time_range(), Some((0, length as i64 - 1)));

            let dataset = fatemap_core::TrackDataset::build(&table);
            for t in 0..length as i64 - 1 {
                let pairs = dataset.transitions(t, fatemap_core::Direction::Forward);
                prop_assert_eq!(pairs.len(), n_tracks);
            }
        }
    }
}
