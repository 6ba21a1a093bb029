//! Raster and run-summary exporters.
//!
//! Rasters are written as ndarray's serde JSON (`{"v": 1, "dim": [...],
//! "data": [...]}`), or as a 16-bit grayscale PNG when the path ends in
//! `.png` and the raster is 2-D.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use fatemap_core::{max_value, mean_where};
use image::{ImageBuffer, Luma};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Output container chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Json,
    Png,
}

impl RasterFormat {
    /// `.png` selects PNG, anything else JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("png") => RasterFormat::Png,
            _ => RasterFormat::Json,
        }
    }
}

/// Writes a raster in the format implied by `path`.
pub fn write_raster(path: &Path, raster: &ArrayD<f32>) -> Result<RasterFormat> {
    let format = RasterFormat::from_path(path);
    match format {
        RasterFormat::Json => write_raster_json(path, raster)?,
        RasterFormat::Png => write_raster_png(path, raster)?,
    }
    Ok(format)
}

/// Writes a raster as JSON.
pub fn write_raster_json(path: &Path, raster: &ArrayD<f32>) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create raster file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, raster).context("failed to serialize raster")?;
    writer.flush()?;
    Ok(())
}

/// Writes a 2-D raster as a 16-bit grayscale PNG, scaled so the maximum maps
/// to 65535. Negative values are clamped to 0.
pub fn write_raster_png(path: &Path, raster: &ArrayD<f32>) -> Result<()> {
    let (height, width) = match raster.shape() {
        [h, w] => (*h, *w),
        shape => bail!("PNG export needs a 2-D raster, got shape {:?}", shape),
    };

    let max = max_value(raster);
    let scale = if max > 0.0 { u16::MAX as f32 / max } else { 0.0 };
    let pixels: Vec<u16> = raster
        .iter()
        .map(|&v| (v.max(0.0) * scale).round().min(u16::MAX as f32) as u16)
        .collect();

    let image: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(width as u32, height as u32, pixels)
            .context("raster data does not match its shape")?;
    image
        .save(path)
        .with_context(|| format!("failed to write PNG: {}", path.display()))?;
    Ok(())
}

/// Reads back a raster written by [`write_raster_json`].
pub fn read_raster_json(path: &Path) -> Result<ArrayD<f32>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open raster file: {}", path.display()))?;
    let raster = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse raster: {}", path.display()))?;
    Ok(raster)
}

/// Machine-readable summary of one CLI run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Subcommand that produced the output
    pub command: String,

    /// Input track table, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracks: Option<String>,

    pub time_point: i64,
    pub seeds: usize,
    pub replicates: usize,

    /// Shape of the raster output
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shape: Vec<usize>,

    /// Rows of the trajectory output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,

    /// Raster statistics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_value: Option<f64>,

    pub output: String,
    pub elapsed_ms: u128,
}

impl RunSummary {
    /// Creates an empty summary for `command`.
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            ..Default::default()
        }
    }

    /// Records shape and statistics of a raster output.
    pub fn with_raster(mut self, raster: &ArrayD<f32>, seed_mask: Option<&ArrayD<bool>>) -> Self {
        self.shape = raster.shape().to_vec();
        self.max_value = Some(max_value(raster));
        self.mean_value = match seed_mask {
            Some(mask) => mean_where(raster, mask),
            None => raster.mean().map(f64::from),
        };
        self
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize run summary")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn gradient() -> ArrayD<f32> {
        ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap()
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(RasterFormat::from_path(Path::new("a.png")), RasterFormat::Png);
        assert_eq!(RasterFormat::from_path(Path::new("a.PNG")), RasterFormat::Png);
        assert_eq!(RasterFormat::from_path(Path::new("a.json")), RasterFormat::Json);
        assert_eq!(RasterFormat::from_path(Path::new("a")), RasterFormat::Json);
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("div.json");

        let raster = gradient();
        assert_eq!(write_raster(&path, &raster).unwrap(), RasterFormat::Json);
        assert_eq!(read_raster_json(&path).unwrap(), raster);
    }

    #[test]
    fn test_png_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("div.png");

        assert_eq!(write_raster(&path, &gradient()).unwrap(), RasterFormat::Png);

        let image = image::open(&path).unwrap().into_luma16();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(0, 0)[0], 0);
        assert_eq!(image.get_pixel(2, 1)[0], u16::MAX);
    }

    #[test]
    fn test_png_rejects_volumes() {
        let dir = tempfile::tempdir().unwrap();
        let raster = ArrayD::<f32>::zeros(IxDyn(&[2, 2, 2]));
        assert!(write_raster_png(&dir.path().join("v.png"), &raster).is_err());
    }

    #[test]
    fn test_summary_json() {
        let mask =
            ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![false, true, false, false, false, true])
                .unwrap();
        let summary = RunSummary::new("divergence").with_raster(&gradient(), Some(&mask));

        assert_eq!(summary.mean_value, Some(3.0));
        let json = summary.to_json().unwrap();
        assert!(json.contains("\"command\": \"divergence\""));
        assert!(!json.contains("rows"));
    }
}
