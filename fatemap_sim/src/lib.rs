//! FateMap simulation harness
//!
//! Synthetic scenarios, run pipelines and exporters around the
//! [`fatemap_core`] engine. The `fatemap` binary is a thin clap front-end
//! over [`runner`].
//!
//! # Usage
//!
//! ```ignore
//! use fatemap_sim::scenarios::divergence_data;
//! use fatemap_core::{Divergence, FateMapConfig};
//!
//! let data = divergence_data(100, 42);
//! let config = FateMapConfig { radius: 5.0, ..FateMapConfig::divergence() };
//! let mut divergence = Divergence::with_tracks(config, &data.tracks)?;
//! let raster = divergence.compute(&data.mask, 0, None)?;
//! ```

pub mod exporter;
pub mod runner;
pub mod scenarios;

pub use exporter::{write_raster, RasterFormat, RunSummary};
pub use runner::{DivergenceJob, SimulateJob};
pub use scenarios::{DivergenceData, ScenarioId};
