//! FateMap Core - In-silico fate mapping from tracking data
//!
//! Given cell tracks, this library answers "where would a cell seeded here
//! have gone?":
//! 1. **Local motion models**: one radius-neighbour regressor per time step,
//!    fitted lazily from consecutive track positions
//! 2. **Stochastic extrapolation**: every seed is replicated, jittered and
//!    stepped through the models until it runs out of support
//! 3. **Projection**: synthetic trajectories, occupancy heatmaps, or the
//!    per-seed spread of outcomes (divergence)

pub mod config;
pub mod divergence;
pub mod error;
pub mod io;
pub mod model;
pub mod projector;
pub mod raster;
pub mod simulator;
pub mod spatial;
pub mod tracks;

// Re-export key types for convenience
pub use config::{Direction, FateMapConfig, Weights};
pub use divergence::{replicate_spread, Divergence};
pub use error::{FateMapError, Result};
pub use io::{
    is_tracks_csv, read_positions, read_positions_csv, read_tracks, read_tracks_csv,
    write_tracks, write_tracks_csv,
};
pub use model::{FitState, StepModel, StepModelBank};
pub use projector::{HeatmapAccumulator, TrajectoryRecorder};
pub use raster::{count_set, dilate, max_value, mean_where, nearest_cell};
pub use simulator::{Endpoints, EndpointsOnly, FateMapOutput, FateMapper, PathRecorder};
pub use spatial::RadiusIndex;
pub use tracks::{Position, PropertyColumn, SpatialDims, TrackDataset, TrackRecord, TrackTable};
