//! End-to-end checks of the engine on the synthetic scenarios.

use std::collections::BTreeMap;

use approx::assert_relative_eq;
use fatemap_core::{
    mean_where, read_tracks_csv, write_tracks_csv, Direction, Divergence, FateMapConfig,
    FateMapper, FitState, Position, SpatialDims, TrackTable, Weights,
};
use fatemap_sim::exporter::read_raster_json;
use fatemap_sim::runner::{divergence_command, scenario_command};
use fatemap_sim::scenarios::{divergence_data, line_tracks};
use fatemap_sim::{DivergenceJob, ScenarioId};

fn first_position(table: &TrackTable) -> (i64, Position) {
    let record = table.records[0];
    (record.t, record.position)
}

#[test]
fn test_single_track_is_reconstructed() {
    let n_samples = 25;
    let length = 50;
    let line = line_tracks(1, length, SpatialDims::Three, 42);
    let (t0, seed) = first_position(&line);

    let config = FateMapConfig {
        radius: 5.0,
        sigma: 1.0,
        n_samples,
        bind_to_existing: false,
        ..Default::default()
    };
    let mut mapper = FateMapper::with_tracks(config.clone(), &line).unwrap();

    let tracks = mapper.simulate(&[seed], t0).unwrap().into_tracks().unwrap();
    assert_eq!(tracks.len(), n_samples * length);

    // mean over replicates, per time point
    let mut sums: BTreeMap<i64, (Position, usize)> = BTreeMap::new();
    for record in &tracks.records {
        let entry = sums.entry(record.t).or_insert((Position::zeros(), 0));
        entry.0 += record.position;
        entry.1 += 1;
    }
    for observed in &line.records {
        let (sum, count) = sums[&observed.t];
        let mean = sum / count as f64;
        for axis in 0..3 {
            assert_relative_eq!(mean[axis], observed.position[axis], epsilon = 1e-8);
        }
    }

    mapper
        .reconfigure(FateMapConfig {
            heatmap: true,
            ..config
        })
        .unwrap();
    let heatmap = mapper.simulate(&[seed], t0).unwrap().into_heatmap().unwrap();
    assert_eq!(heatmap.shape()[0], length);

    // centroid of the occupied cells of each time slice
    let mut centroids: BTreeMap<usize, ([f64; 3], usize)> = BTreeMap::new();
    for (index, value) in heatmap.indexed_iter() {
        if *value > 0.0 {
            let entry = centroids.entry(index[0]).or_insert(([0.0; 3], 0));
            for axis in 0..3 {
                entry.0[axis] += index[axis + 1] as f64;
            }
            entry.1 += 1;
        }
    }
    assert_eq!(centroids.len(), length);
    for observed in &line.records {
        let (sum, count) = centroids[&(observed.t as usize)];
        for axis in 0..3 {
            let centroid = sum[axis] / count as f64;
            assert!((centroid - observed.position[axis]).abs() < 1.0);
        }
    }
}

#[test]
fn test_divergence_separates_regions() {
    let data = divergence_data(100, 42);
    let config = FateMapConfig {
        radius: 5.0,
        ..FateMapConfig::divergence()
    };
    let mut divergence = Divergence::with_tracks(config, &data.tracks).unwrap();

    let raster = divergence.compute(&data.mask, 0, None).unwrap();
    assert_eq!(raster.shape(), data.mask.shape());

    let coherent = mean_where(&raster, &data.coherent).unwrap();
    let splitting = mean_where(&raster, &data.splitting).unwrap();
    assert!(
        3.0 * coherent < splitting,
        "coherent {} vs splitting {}",
        coherent,
        splitting
    );
}

#[test]
fn test_weights_switch_refits_models() {
    let line = line_tracks(5, 50, SpatialDims::Three, 42);
    let (t0, seed) = first_position(&line);
    let query = seed + Position::new(0.5, 0.0, 0.0);
    let mut mapper = FateMapper::with_tracks(
        FateMapConfig {
            weights: Weights::Distance,
            ..Default::default()
        },
        &line,
    )
    .unwrap();

    mapper.fit().unwrap();
    assert_eq!(mapper.models().count(), 49);
    assert!(mapper.models().all(|m| m.weights() == Weights::Distance));

    // every track at t0 lies within the default radius of the query
    let pairs = mapper.dataset().unwrap().transitions(t0, Direction::Forward);
    assert_eq!(pairs.len(), 5);
    let mut weighted = Position::zeros();
    let mut total = 0.0;
    for (x, y) in &pairs {
        let w = 1.0 / (x - query).norm();
        weighted += y * w;
        total += w;
    }
    let expected_distance = weighted / total;
    let expected_uniform = pairs.iter().fold(Position::zeros(), |acc, (_, y)| acc + y) / 5.0;

    let by_distance = mapper.model(t0).unwrap().predict(&query).unwrap();
    for axis in 0..3 {
        assert_relative_eq!(by_distance[axis], expected_distance[axis], epsilon = 1e-9);
    }

    mapper
        .reconfigure(FateMapConfig {
            weights: Weights::Uniform,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(mapper.fit_state(), FitState::Unfitted);
    mapper.fit().unwrap();
    assert!(mapper.models().all(|m| m.weights() == Weights::Uniform));

    let uniform = mapper.model(t0).unwrap().predict(&query).unwrap();
    for axis in 0..3 {
        assert_relative_eq!(uniform[axis], expected_uniform[axis], epsilon = 1e-9);
    }
    assert!((uniform - by_distance).norm() > 1e-6);
}

#[test]
fn test_binding_starts_on_observed_positions() {
    let line = line_tracks(5, 50, SpatialDims::Three, 42);
    let (t0, seed) = first_position(&line);
    let mut mapper = FateMapper::with_tracks(
        FateMapConfig {
            bind_to_existing: true,
            n_samples: 5,
            ..Default::default()
        },
        &line,
    )
    .unwrap();

    let result = mapper.simulate(&[seed], t0).unwrap().into_tracks().unwrap();

    let sort = |mut positions: Vec<Position>| {
        positions.sort_by(|a, b| {
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| x.partial_cmp(y).unwrap())
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        positions
    };
    let observed = sort(line.positions_at(t0));
    let started = sort(result.positions_at(t0));
    assert_eq!(observed, started);

    let mut ids: Vec<i64> = result.records.iter().map(|r| r.track_id).collect();
    ids.dedup();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_every_mutation_invalidates_fit() {
    let line = line_tracks(5, 50, SpatialDims::Three, 42);
    let (t0, seed) = first_position(&line);
    let base = FateMapConfig {
        reverse: true,
        radius: 7.0,
        n_samples: 5,
        ..Default::default()
    };

    let mutations: Vec<Box<dyn Fn(&mut FateMapper)>> = vec![
        Box::new(|m: &mut FateMapper| {
            m.reconfigure(FateMapConfig {
                reverse: false,
                ..m.config().clone()
            })
            .unwrap()
        }),
        Box::new(|m: &mut FateMapper| {
            m.reconfigure(FateMapConfig {
                radius: 5.0,
                ..m.config().clone()
            })
            .unwrap()
        }),
        Box::new(|m: &mut FateMapper| {
            m.reconfigure(FateMapConfig {
                weights: Weights::Distance,
                ..m.config().clone()
            })
            .unwrap()
        }),
        Box::new(|m: &mut FateMapper| {
            m.reconfigure(FateMapConfig {
                sigma: 0.5,
                ..m.config().clone()
            })
            .unwrap()
        }),
        Box::new(|m: &mut FateMapper| {
            m.reconfigure(FateMapConfig {
                n_samples: 3,
                ..m.config().clone()
            })
            .unwrap()
        }),
        Box::new(|m: &mut FateMapper| {
            m.reconfigure(FateMapConfig {
                bind_to_existing: false,
                ..m.config().clone()
            })
            .unwrap()
        }),
        Box::new(|m: &mut FateMapper| {
            let tracks = line_tracks(2, 10, SpatialDims::Three, 1);
            m.set_tracks(Some(&tracks))
        }),
    ];

    for mutate in mutations {
        let mut mapper = FateMapper::with_tracks(base.clone(), &line).unwrap();
        assert_eq!(mapper.fit_state(), FitState::Unfitted);

        mapper.simulate(&[seed], t0).unwrap();
        assert_eq!(mapper.fit_state(), FitState::Fitted);

        mutate(&mut mapper);
        assert_eq!(mapper.fit_state(), FitState::Unfitted);

        mapper.simulate(&[seed], t0).unwrap();
        assert_eq!(mapper.fit_state(), FitState::Fitted);
    }
}

#[test]
fn test_noiseless_replicates_are_identical() {
    let line = line_tracks(5, 20, SpatialDims::Two, 3);
    let (t0, seed) = first_position(&line);
    let mut mapper = FateMapper::with_tracks(
        FateMapConfig {
            sigma: 0.0,
            n_samples: 4,
            bind_to_existing: false,
            radius: 10.0,
            ..Default::default()
        },
        &line,
    )
    .unwrap();

    let endpoints = mapper.simulate_endpoints(&[seed], t0, None).unwrap();
    let replicates = endpoints.replicates(0);
    assert!(replicates.iter().all(|p| *p == replicates[0]));
}

#[test]
fn test_simulated_tracks_round_trip_through_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("simulated.csv");

    let line = line_tracks(3, 15, SpatialDims::Three, 9);
    let (t0, seed) = first_position(&line);
    let mut mapper = FateMapper::with_tracks(
        FateMapConfig {
            n_samples: 3,
            ..Default::default()
        },
        &line,
    )
    .unwrap();
    let tracks = mapper.simulate(&[seed], t0).unwrap().into_tracks().unwrap();

    write_tracks_csv(&path, &tracks).unwrap();
    assert_eq!(read_tracks_csv(&path).unwrap(), tracks);
}

#[test]
fn test_cli_pipeline_writes_raster() {
    let dir = tempfile::tempdir().unwrap();
    let tracks = dir.path().join("line.csv");
    let output = dir.path().join("divergence.json");

    scenario_command(ScenarioId::Line, 42, &tracks).unwrap();

    let job = DivergenceJob {
        time_point: 0,
        dilation: 1,
        max_length: Some(3),
        config: FateMapConfig {
            radius: 5.0,
            n_samples: 3,
            ..FateMapConfig::divergence()
        },
    };
    let summary = divergence_command(&tracks, 1.0, &job, Some(output.clone())).unwrap();
    assert_eq!(summary.command, "divergence");
    assert!(summary.seeds >= 5);

    let raster = read_raster_json(&output).unwrap();
    assert_eq!(raster.ndim(), 3);
    assert_eq!(raster.shape(), summary.shape.as_slice());
}
