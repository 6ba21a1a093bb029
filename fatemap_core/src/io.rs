//! CSV track tables.
//!
//! Required columns are recognised by name in either spelling:
//! `track_id`/`TrackID`, `t`/`T`, `y`/`Y`, `x`/`X`, and optionally `z`/`Z`.
//! Any other column is carried through as a string property.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::debug;

use crate::error::{FateMapError, Result};
use crate::tracks::{Position, PropertyColumn, SpatialDims, TrackRecord, TrackTable};

const TRACK_ID_NAMES: &[&str] = &["track_id", "TrackID"];
const TIME_NAMES: &[&str] = &["t", "T"];
const Z_NAMES: &[&str] = &["z", "Z"];
const Y_NAMES: &[&str] = &["y", "Y"];
const X_NAMES: &[&str] = &["x", "X"];

/// Column positions of the required fields in a header.
#[derive(Debug)]
struct ColumnMap {
    track_id: usize,
    t: usize,
    /// Spatial columns in table order
    spatial: Vec<usize>,
    /// `(column, name)` of every pass-through column
    extra: Vec<(usize, String)>,
}

impl ColumnMap {
    fn from_header(header: &StringRecord) -> Result<Self> {
        let find = |names: &[&str]| header.iter().position(|h| names.contains(&h.trim()));
        let require = |names: &[&str]| {
            find(names).ok_or_else(|| {
                FateMapError::schema(format!("missing required column {}", names.join(" | ")))
            })
        };

        let track_id = require(TRACK_ID_NAMES)?;
        let t = require(TIME_NAMES)?;
        let y = require(Y_NAMES)?;
        let x = require(X_NAMES)?;
        let spatial = match find(Z_NAMES) {
            Some(z) => vec![z, y, x],
            None => vec![y, x],
        };

        let extra = header
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != track_id && *i != t && !spatial.contains(i))
            .map(|(i, name)| (i, name.to_string()))
            .collect();

        Ok(Self {
            track_id,
            t,
            spatial,
            extra,
        })
    }

    fn dims(&self) -> Result<SpatialDims> {
        SpatialDims::from_count(self.spatial.len())
    }
}

/// Reads a track table from CSV.
pub fn read_tracks<R: Read>(reader: R) -> Result<TrackTable> {
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let header = rdr.headers()?.clone();
    let columns = ColumnMap::from_header(&header)?;
    let dims = columns.dims()?;

    let mut table = TrackTable::new(dims);
    table.properties = columns
        .extra
        .iter()
        .map(|(_, name)| PropertyColumn {
            name: name.clone(),
            values: Vec::new(),
        })
        .collect();

    let mut coords = Vec::with_capacity(3);
    for (row, result) in rdr.records().enumerate() {
        let record = result?;

        let track_id = parse_integral(&record, row, columns.track_id, &header)?;
        let t = parse_integral(&record, row, columns.t, &header)?;
        coords.clear();
        for &col in &columns.spatial {
            coords.push(parse_float(&record, row, col, &header)?);
        }

        table.records.push(TrackRecord {
            track_id,
            t,
            position: dims.position(&coords),
        });
        for (property, (col, _)) in table.properties.iter_mut().zip(&columns.extra) {
            property
                .values
                .push(record.get(*col).unwrap_or_default().to_string());
        }
    }

    debug!(
        "Read {} track records ({} spatial dims, {} extra columns)",
        table.len(),
        dims.count(),
        table.properties.len()
    );
    Ok(table)
}

/// Reads a track table from a CSV file.
pub fn read_tracks_csv(path: impl AsRef<Path>) -> Result<TrackTable> {
    let file = File::open(path.as_ref())?;
    read_tracks(file)
}

/// Whether `path` is a `.csv` file whose header names the required track
/// columns. Only the header is read.
pub fn is_tracks_csv(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return false;
    }
    let Ok(mut rdr) = ReaderBuilder::new().from_path(path) else {
        return false;
    };
    match rdr.headers() {
        Ok(header) => ColumnMap::from_header(header).is_ok(),
        Err(_) => false,
    }
}

/// Reads seed coordinates (`[z,]y,x` columns, other columns ignored) for a
/// dataset of dimensionality `dims`.
pub fn read_positions<R: Read>(reader: R, dims: SpatialDims) -> Result<Vec<Position>> {
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let header = rdr.headers()?.clone();
    let find = |names: &[&str]| header.iter().position(|h| names.contains(&h.trim()));

    let mut columns = Vec::with_capacity(3);
    if dims == SpatialDims::Three {
        columns.push(find(Z_NAMES).ok_or_else(|| FateMapError::schema("missing column z | Z"))?);
    }
    columns.push(find(Y_NAMES).ok_or_else(|| FateMapError::schema("missing column y | Y"))?);
    columns.push(find(X_NAMES).ok_or_else(|| FateMapError::schema("missing column x | X"))?);

    let mut positions = Vec::new();
    let mut coords = Vec::with_capacity(3);
    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        coords.clear();
        for &col in &columns {
            coords.push(parse_float(&record, row, col, &header)?);
        }
        positions.push(dims.try_position(&coords)?);
    }
    Ok(positions)
}

/// Reads seed coordinates from a CSV file.
pub fn read_positions_csv(path: impl AsRef<Path>, dims: SpatialDims) -> Result<Vec<Position>> {
    let file = File::open(path.as_ref())?;
    read_positions(file, dims)
}

/// Writes a track table as CSV: `TrackID,t,[z,]y,x` followed by the
/// pass-through columns.
pub fn write_tracks<W: Write>(writer: W, table: &TrackTable) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);

    let mut header: Vec<&str> = vec!["TrackID", "t"];
    header.extend_from_slice(table.dims.axis_names());
    header.extend(table.properties.iter().map(|p| p.name.as_str()));
    wtr.write_record(&header)?;

    let mut fields: Vec<String> = Vec::with_capacity(header.len());
    for (row, record) in table.records.iter().enumerate() {
        fields.clear();
        fields.push(record.track_id.to_string());
        fields.push(record.t.to_string());
        fields.extend(table.dims.coords(&record.position).iter().map(|v| v.to_string()));
        for property in &table.properties {
            fields.push(property.values.get(row).cloned().unwrap_or_default());
        }
        wtr.write_record(&fields)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes a track table to a CSV file.
pub fn write_tracks_csv(path: impl AsRef<Path>, table: &TrackTable) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_tracks(file, table)
}

fn field<'a>(record: &'a StringRecord, row: usize, col: usize, header: &StringRecord) -> Result<&'a str> {
    record.get(col).ok_or_else(|| {
        FateMapError::schema(format!(
            "row {} has no value for column {}",
            row,
            header.get(col).unwrap_or("?")
        ))
    })
}

fn parse_float(record: &StringRecord, row: usize, col: usize, header: &StringRecord) -> Result<f64> {
    let raw = field(record, row, col, header)?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FateMapError::invalid_value(row, header.get(col).unwrap_or("?"), raw))
}

/// Ids and times may be written as floats (`3.0`) but must be integral.
fn parse_integral(record: &StringRecord, row: usize, col: usize, header: &StringRecord) -> Result<i64> {
    let raw = field(record, row, col, header)?;
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => Ok(v as i64),
        _ => Err(FateMapError::invalid_value(
            row,
            header.get(col).unwrap_or("?"),
            raw,
        )),
    }
}
