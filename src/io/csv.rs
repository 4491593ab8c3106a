use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use geo::{MultiPolygon, Polygon};
use polars::prelude::{CsvReader, CsvWriter, DataFrame, DataType, NamedFrom, SerReader, SerWriter, Series};
use wkt::{ToWkt, TryFromWkt};

use crate::metrics::{AlgorithmMetrics, PerformanceMetrics};
use crate::model::{CoarseInput, DetailedRow, OutputRow};

fn read_csv(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .with_context(|| format!("[io::csv] failed to open CSV file: {}", path.display()))?;
    CsvReader::new(file)
        .finish()
        .with_context(|| format!("[io::csv] failed to read CSV from {}", path.display()))
}

fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("[io::csv] failed to create CSV file: {}", path.display()))?;
    CsvWriter::new(file)
        .finish(df)
        .with_context(|| format!("[io::csv] failed to write CSV to {}", path.display()))
}

fn parse_multipolygon(wkt_str: &str) -> Result<MultiPolygon<f64>> {
    if let Ok(mp) = MultiPolygon::<f64>::try_from_wkt_str(wkt_str) {
        return Ok(mp);
    }
    let poly = Polygon::<f64>::try_from_wkt_str(wkt_str)
        .map_err(|e| anyhow!("invalid WKT geometry {:?}: {e}", wkt_str))?;
    Ok(MultiPolygon(vec![poly]))
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    Ok(df
        .column(name)
        .with_context(|| format!("[io::csv] missing column {name:?}"))?
        .cast(&DataType::String)?
        .str()?
        .into_no_null_iter()
        .map(str::to_string)
        .collect())
}

fn i64_column(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    Ok(df
        .column(name)
        .with_context(|| format!("[io::csv] missing column {name:?}"))?
        .cast(&DataType::Int64)?
        .i64()?
        .into_no_null_iter()
        .collect())
}

/// Reads the coarse input layer: `shape_id, shape_name, path_to_top_parent,
/// level, geometry` (geometry as WKT, Polygon or MultiPolygon).
pub fn read_coarse_csv(path: &Path) -> Result<Vec<CoarseInput>> {
    let df = read_csv(path)?;
    let shape_id = string_column(&df, "shape_id")?;
    let shape_name = string_column(&df, "shape_name")?;
    let path_to_top_parent = string_column(&df, "path_to_top_parent")?;
    let level = i64_column(&df, "level")?;
    let geometry = string_column(&df, "geometry")?;

    shape_id
        .into_iter()
        .zip(shape_name)
        .zip(path_to_top_parent)
        .zip(level)
        .zip(geometry)
        .map(|((((shape_id, shape_name), path_to_top_parent), level), wkt_str)| {
            Ok(CoarseInput {
                shape_id,
                shape_name,
                path_to_top_parent,
                level,
                geometry: parse_multipolygon(&wkt_str)?,
            })
        })
        .collect()
}

/// Reads the detailed input layer: `shape_id, shape_name, level, geometry`.
pub fn read_detailed_csv(path: &Path) -> Result<Vec<DetailedRow>> {
    let df = read_csv(path)?;
    let shape_id = string_column(&df, "shape_id")?;
    let shape_name = string_column(&df, "shape_name")?;
    let level = i64_column(&df, "level")?;
    let geometry = string_column(&df, "geometry")?;

    shape_id
        .into_iter()
        .zip(shape_name)
        .zip(level)
        .zip(geometry)
        .map(|(((shape_id, shape_name), level), wkt_str)| {
            Ok(DetailedRow {
                shape_id,
                shape_name,
                level,
                geometry: parse_multipolygon(&wkt_str)?,
            })
        })
        .collect()
}

/// Writes the harmonized output layer: `shape_id, shape_name, parent_id,
/// path_to_top_parent, level, geometry`.
pub fn write_output_csv(rows: &[OutputRow], path: &Path) -> Result<()> {
    let shape_id: Vec<&str> = rows.iter().map(|r| r.shape_id.as_str()).collect();
    let shape_name: Vec<&str> = rows.iter().map(|r| r.shape_name.as_str()).collect();
    let parent_id: Vec<&str> = rows.iter().map(|r| r.parent_id.as_str()).collect();
    let path_to_top_parent: Vec<&str> = rows.iter().map(|r| r.path_to_top_parent.as_str()).collect();
    let level: Vec<i64> = rows.iter().map(|r| r.level).collect();
    let geometry: Vec<String> = rows.iter().map(|r| r.geometry.to_wkt().to_string()).collect();

    let mut df = DataFrame::new(vec![
        Series::new("shape_id".into(), shape_id).into(),
        Series::new("shape_name".into(), shape_name).into(),
        Series::new("parent_id".into(), parent_id).into(),
        Series::new("path_to_top_parent".into(), path_to_top_parent).into(),
        Series::new("level".into(), level).into(),
        Series::new("geometry".into(), geometry).into(),
    ])?;
    write_csv(&mut df, path)
}

pub fn write_algorithm_metrics_csv(metrics: &AlgorithmMetrics, path: &Path) -> Result<()> {
    let mut df = metrics.to_dataframe()?;
    write_csv(&mut df, path)
}

pub fn write_performance_metrics_csv(metrics: &PerformanceMetrics, path: &Path) -> Result<()> {
    let mut df = metrics.to_dataframe()?;
    write_csv(&mut df, path)
}
