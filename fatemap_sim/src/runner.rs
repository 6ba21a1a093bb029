//! Run pipelines behind the CLI subcommands.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use fatemap_core::{
    count_set, dilate, max_value, mean_where, nearest_cell, read_positions_csv,
    read_tracks_csv, write_tracks_csv, Divergence, FateMapConfig, FateMapOutput, FateMapper,
    Position, SpatialDims, TrackTable,
};
use ndarray::{ArrayD, IxDyn};
use tracing::{debug, info, warn};

use crate::exporter::{write_raster, RunSummary};
use crate::scenarios::ScenarioId;

/// Loads a track table and rescales its z axis.
pub fn load_tracks(path: &Path, z_scale: f64) -> Result<TrackTable> {
    let mut table = read_tracks_csv(path)
        .with_context(|| format!("failed to read tracks: {}", path.display()))?;
    apply_z_scale(&mut table, z_scale)?;
    info!(
        "Loaded {} observations ({} spatial dims, time range {:?}) from {}",
        table.len(),
        table.dims.count(),
        table.time_range(),
        path.display()
    );
    Ok(table)
}

/// Multiplies z by `z_scale`. Planar tables have no z axis and are left alone.
pub fn apply_z_scale(table: &mut TrackTable, z_scale: f64) -> Result<()> {
    if z_scale == 1.0 {
        return Ok(());
    }
    if !z_scale.is_finite() || z_scale <= 0.0 {
        bail!("z scale must be positive, got {}", z_scale);
    }
    match table.dims {
        SpatialDims::Three => table.scale_axis(0, z_scale)?,
        SpatialDims::Two => warn!("Ignoring z scale {} for planar tracks", z_scale),
    }
    Ok(())
}

/// Seed mask from the positions observed at `time_point`, rounded to the
/// nearest cell of the table's spatial extent, then dilated by `dilation`.
pub fn seed_mask(table: &TrackTable, time_point: i64, dilation: usize) -> ArrayD<bool> {
    let extent = table.spatial_extent();
    let mut mask = ArrayD::from_elem(IxDyn(&extent), false);
    for pos in table.positions_at(time_point) {
        if let Some(cell) = nearest_cell(&extent, table.dims.coords(&pos)) {
            mask[cell] = true;
        }
    }
    if dilation > 0 {
        mask = dilate(&mask, dilation);
    }
    mask
}

// ============================================================================
// DIVERGENCE
// ============================================================================

/// Options of the divergence pipeline.
#[derive(Debug, Clone)]
pub struct DivergenceJob {
    pub time_point: i64,
    pub dilation: usize,
    pub max_length: Option<usize>,
    pub config: FateMapConfig,
}

/// Result of the divergence pipeline.
#[derive(Debug, Clone)]
pub struct DivergenceRun {
    pub divergence: ArrayD<f32>,
    pub mask: ArrayD<bool>,
}

/// Builds the seed mask from `table` and measures divergence over it.
pub fn run_divergence(table: &TrackTable, job: &DivergenceJob) -> Result<DivergenceRun> {
    let mask = seed_mask(table, job.time_point, job.dilation);
    let seeds = count_set(&mask);
    info!(
        "Seed mask at t={}: {} cells (dilation {}, shape {:?})",
        job.time_point,
        seeds,
        job.dilation,
        mask.shape()
    );
    if seeds == 0 {
        bail!("no track is observed at time point {}", job.time_point);
    }

    let mut divergence = Divergence::with_tracks(job.config.clone(), table)?;
    let raster = divergence
        .compute(&mask, job.time_point, job.max_length)
        .context("divergence computation failed")?;

    debug!(
        "Divergence: max {:.3}, mean over seeds {:?}",
        max_value(&raster),
        mean_where(&raster, &mask)
    );
    Ok(DivergenceRun {
        divergence: raster,
        mask,
    })
}

/// Default output name for a divergence run.
pub fn default_divergence_output(time_point: i64, dilation: usize) -> PathBuf {
    PathBuf::from(format!(
        "output_tp_{:05}_dilation_{}.json",
        time_point, dilation
    ))
}

// ============================================================================
// SIMULATION
// ============================================================================

/// Options of the simulation pipeline.
#[derive(Debug, Clone)]
pub struct SimulateJob {
    pub time_point: i64,
    /// Accumulate only final positions (heatmap mode)
    pub final_only: bool,
    pub config: FateMapConfig,
}

/// Result of the simulation pipeline.
#[derive(Debug, Clone)]
pub struct SimulateRun {
    pub output: FateMapOutput,
    pub seed_count: usize,
}

/// Loads seeds from a CSV, or takes the positions observed at the time point.
pub fn resolve_seeds(
    table: &TrackTable,
    seeds_path: Option<&Path>,
    time_point: i64,
) -> Result<Vec<Position>> {
    let seeds = match seeds_path {
        Some(path) => read_positions_csv(path, table.dims)
            .with_context(|| format!("failed to read seeds: {}", path.display()))?,
        None => table.positions_at(time_point),
    };
    if seeds.is_empty() {
        bail!("no seed positions (time point {})", time_point);
    }
    Ok(seeds)
}

/// Simulates from `seeds` and projects the result.
pub fn run_simulate(table: &TrackTable, seeds: &[Position], job: &SimulateJob) -> Result<SimulateRun> {
    let mut mapper = FateMapper::with_tracks(job.config.clone(), table)?;

    let output = if job.config.heatmap && job.final_only {
        let endpoints = mapper.simulate_endpoints(seeds, job.time_point, None)?;
        FateMapOutput::Heatmap(endpoints.heatmap(&table.spatial_extent()))
    } else {
        mapper.simulate(seeds, job.time_point)?
    };

    Ok(SimulateRun {
        output,
        seed_count: seeds.len(),
    })
}

// ============================================================================
// CLI ENTRY POINTS
// ============================================================================

/// Runs the `divergence` subcommand end to end.
pub fn divergence_command(
    tracks: &Path,
    z_scale: f64,
    job: &DivergenceJob,
    output: Option<PathBuf>,
) -> Result<RunSummary> {
    let start = Instant::now();
    let table = load_tracks(tracks, z_scale)?;
    let run = run_divergence(&table, job)?;

    let output = output.unwrap_or_else(|| default_divergence_output(job.time_point, job.dilation));
    let format = write_raster(&output, &run.divergence)?;
    info!("Wrote divergence ({:?}) to {}", format, output.display());

    let mut summary = RunSummary::new("divergence").with_raster(&run.divergence, Some(&run.mask));
    summary.tracks = Some(tracks.display().to_string());
    summary.time_point = job.time_point;
    summary.seeds = count_set(&run.mask);
    summary.replicates = job.config.n_samples;
    summary.output = output.display().to_string();
    summary.elapsed_ms = start.elapsed().as_millis();
    Ok(summary)
}

/// Runs the `simulate` subcommand end to end.
pub fn simulate_command(
    tracks: &Path,
    seeds_path: Option<&Path>,
    z_scale: f64,
    job: &SimulateJob,
    output: &Path,
) -> Result<RunSummary> {
    let start = Instant::now();
    let table = load_tracks(tracks, z_scale)?;
    let seeds = resolve_seeds(&table, seeds_path, job.time_point)?;
    let run = run_simulate(&table, &seeds, job)?;

    let mut summary = RunSummary::new("simulate");
    match &run.output {
        FateMapOutput::Tracks(paths) => {
            write_tracks_csv(output, paths)
                .with_context(|| format!("failed to write tracks: {}", output.display()))?;
            info!("Wrote {} simulated rows to {}", paths.len(), output.display());
            summary.rows = Some(paths.len());
        }
        FateMapOutput::Heatmap(raster) => {
            write_raster(output, raster)?;
            info!("Wrote heatmap {:?} to {}", raster.shape(), output.display());
            summary = summary.with_raster(raster, None);
        }
    }

    summary.tracks = Some(tracks.display().to_string());
    summary.time_point = job.time_point;
    summary.seeds = run.seed_count;
    summary.replicates = job.config.n_samples;
    summary.output = output.display().to_string();
    summary.elapsed_ms = start.elapsed().as_millis();
    Ok(summary)
}

/// Runs the `scenario` subcommand: writes a synthetic track table.
pub fn scenario_command(scenario: ScenarioId, seed: u64, output: &Path) -> Result<RunSummary> {
    let start = Instant::now();
    info!("Generating scenario: {} (seed={})", scenario.name(), seed);
    let table = scenario.generate(seed);
    write_tracks_csv(output, &table)
        .with_context(|| format!("failed to write tracks: {}", output.display()))?;
    info!("Wrote {} observations to {}", table.len(), output.display());

    let mut summary = RunSummary::new("scenario");
    summary.rows = Some(table.len());
    summary.output = output.display().to_string();
    summary.elapsed_ms = start.elapsed().as_millis();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::line_tracks;

    #[test]
    fn test_seed_mask_rounds_and_dilates() {
        let table = TrackTable::from_rows(&[
            vec![1.0, 0.0, 1.4, 2.6],
            vec![2.0, 0.0, 4.0, 4.0],
            vec![1.0, 1.0, 2.0, 3.0],
        ])
        .unwrap();

        let mask = seed_mask(&table, 0, 0);
        assert_eq!(mask.shape(), &[5, 5]);
        assert_eq!(count_set(&mask), 2);
        assert!(mask[IxDyn(&[1, 3])]);
        assert!(mask[IxDyn(&[4, 4])]);

        let dilated = seed_mask(&table, 0, 1);
        assert_eq!(count_set(&dilated), 5 + 3);
    }

    #[test]
    fn test_z_scale() {
        let mut volumetric = line_tracks(1, 3, SpatialDims::Three, 1);
        let z0 = volumetric.records[0].position[0];
        apply_z_scale(&mut volumetric, 2.0).unwrap();
        assert_eq!(volumetric.records[0].position[0], 2.0 * z0);
        assert!(apply_z_scale(&mut volumetric, -1.0).is_err());

        let mut planar = line_tracks(1, 3, SpatialDims::Two, 1);
        let before = planar.clone();
        apply_z_scale(&mut planar, 2.0).unwrap();
        assert_eq!(planar, before);
    }

    #[test]
    fn test_default_output_name() {
        assert_eq!(
            default_divergence_output(7, 2),
            PathBuf::from("output_tp_00007_dilation_2.json")
        );
    }

    #[test]
    fn test_resolve_seeds_from_time_point() {
        let table = line_tracks(4, 5, SpatialDims::Two, 3);
        assert_eq!(resolve_seeds(&table, None, 0).unwrap().len(), 4);
        assert!(resolve_seeds(&table, None, 99).is_err());
    }

    #[test]
    fn test_final_only_heatmap() {
        let table = line_tracks(3, 10, SpatialDims::Two, 5);
        let seeds = table.positions_at(0);
        let job = SimulateJob {
            time_point: 0,
            final_only: true,
            config: FateMapConfig {
                radius: 5.0,
                n_samples: 4,
                heatmap: true,
                ..Default::default()
            },
        };

        let run = run_simulate(&table, &seeds, &job).unwrap();
        let raster = run.output.into_heatmap().unwrap();
        assert_eq!(raster.ndim(), 2);
        assert_eq!(raster.sum(), (seeds.len() * 4) as f32);
    }
}
