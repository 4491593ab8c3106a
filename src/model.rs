//! Row types shared across the pipeline stages (C2-C7).
//!
//! `geo` polygons carry no attributes of their own, so every stage here works
//! over a plain struct pairing a geometry with the identity/stats columns the
//! original tabular pipeline kept alongside it. This mirrors the teacher's
//! `Geometries`/`MapLayer` split of "spatial index" from "attribute table",
//! just collapsed into one row type per the data model in SPEC_FULL.md.

use ahash::AHashSet;
use anyhow::{bail, Context};
use geo::{MultiPolygon, Polygon};
use serde::Serialize;

use crate::error::Fatal;

/// One row of the coarse input layer, as given by the caller: possibly a
/// MultiPolygon (an administrative unit split across, say, islands).
#[derive(Debug, Clone)]
pub struct CoarseInput {
    pub shape_id: String,
    pub shape_name: String,
    pub path_to_top_parent: String,
    pub level: i64,
    pub geometry: MultiPolygon<f64>,
}

/// A coarse row after explode: always a single `Polygon`. `shape_id` and
/// `path_to_top_parent` carry a `.N` suffix when they were split out of a
/// multi-part input, so they stay unique and are used as-is (not restored)
/// when re-identifying output rows — each exploded part is its own parent
/// for the rest of the pipeline.
#[derive(Debug, Clone)]
pub struct CoarseRow {
    pub shape_id: String,
    pub shape_name: String,
    pub path_to_top_parent: String,
    pub level: i64,
    pub geometry: Polygon<f64>,
}

/// A detailed input row, re-derived after every collapse iteration from the
/// previous step's surviving fragments.
#[derive(Debug, Clone)]
pub struct DetailedRow {
    pub shape_id: String,
    pub shape_name: String,
    pub level: i64,
    pub geometry: MultiPolygon<f64>,
}

/// Per-fragment statistics computed by C3 (classify_mergeability).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub area: f64,
    pub bounding_area: f64,
    pub compactness: f64,
    pub coarse_area: f64,
    pub coarse_fraction: f64,
    pub detailed_area: f64,
    pub detailed_fraction: f64,
    pub missing_from_admin: bool,
    pub small_geometry: bool,
    pub sliver_geometry: bool,
}

/// The working row of the harmonization pipeline: a piece of a coarse
/// parent's partition, with an optional detailed identity (`None` means it
/// came from land the detailed layer never covered), mergeability flags from
/// C3, and a transient `merge_id` assigned by C4.
///
/// `geometry` is a `MultiPolygon` rather than a `Polygon` because C4's
/// dissolve step can (rarely) produce more than one part before C5 repairs
/// it; C2's own output is always single-part.
#[derive(Debug, Clone, Serialize)]
pub struct Fragment {
    pub shape_id: Option<String>,
    pub shape_name: Option<String>,
    pub parent_id: String,
    pub path_to_top_parent: String,
    pub level: Option<i64>,
    pub geometry: MultiPolygon<f64>,
    pub mergeable: bool,
    pub merge_id: Option<u32>,
    pub stats: Stats,
}

impl Fragment {
    pub fn from_partition(
        parent_id: String,
        path_to_top_parent: String,
        shape_id: Option<String>,
        shape_name: Option<String>,
        level: Option<i64>,
        geometry: Polygon<f64>,
    ) -> Self {
        Self {
            shape_id,
            shape_name,
            parent_id,
            path_to_top_parent,
            level,
            geometry: MultiPolygon(vec![geometry]),
            mergeable: false,
            merge_id: None,
            stats: Stats::default(),
        }
    }

    pub fn is_single_polygon(&self) -> bool {
        self.geometry.0.len() == 1
    }

    pub fn as_polygon(&self) -> Option<&Polygon<f64>> {
        if self.geometry.0.len() == 1 {
            self.geometry.0.first()
        } else {
            None
        }
    }
}

/// A fully harmonized output row: always a single `Polygon`, carrying the
/// final re-identified `shape_id` / `path_to_top_parent`.
#[derive(Debug, Clone)]
pub struct OutputRow {
    pub shape_id: String,
    pub shape_name: String,
    pub parent_id: String,
    pub path_to_top_parent: String,
    pub level: i64,
    pub geometry: Polygon<f64>,
}

/// Validates uniqueness of `shape_id` / `path_to_top_parent` across the
/// coarse input, then explodes every MultiPolygon into one `CoarseRow` per
/// part, suffixing split identities with `_0`, `_1`, ... in part order, per
/// SPEC_FULL.md §4.7 step 1 (`{shape_id}_{k}`). The suffix is stripped back
/// off by `restore_parent_id` once harmonization finishes (step 8).
///
/// A coarse row that survives as a single part keeps its identity
/// unsuffixed, matching the teacher's convention of only touching what
/// actually needs to change.
pub fn explode_coarse(input: Vec<CoarseInput>) -> anyhow::Result<Vec<CoarseRow>> {
    let mut seen_ids = AHashSet::default();
    let mut seen_paths = AHashSet::default();
    for row in &input {
        if !seen_ids.insert(row.shape_id.as_str()) {
            bail!(Fatal::SchemaViolation(format!(
                "duplicate coarse shape_id {:?}",
                row.shape_id
            )));
        }
        if !seen_paths.insert(row.path_to_top_parent.as_str()) {
            bail!(Fatal::SchemaViolation(format!(
                "duplicate coarse path_to_top_parent {:?}",
                row.path_to_top_parent
            )));
        }
    }

    let mut out = Vec::with_capacity(input.len());
    for row in input {
        if row.geometry.0.is_empty() {
            bail!(Fatal::SchemaViolation(format!(
                "coarse row {:?} has empty geometry",
                row.shape_id
            )));
        }
        if row.geometry.0.len() == 1 {
            let geometry = row
                .geometry
                .0
                .into_iter()
                .next()
                .context("unreachable: checked len == 1")?;
            out.push(CoarseRow {
                shape_id: row.shape_id,
                shape_name: row.shape_name,
                path_to_top_parent: row.path_to_top_parent,
                level: row.level,
                geometry,
            });
        } else {
            for (i, part) in row.geometry.0.into_iter().enumerate() {
                out.push(CoarseRow {
                    shape_id: format!("{}_{i}", row.shape_id),
                    shape_name: row.shape_name.clone(),
                    path_to_top_parent: format!("{}_{i}", row.path_to_top_parent),
                    level: row.level,
                    geometry: part,
                });
            }
        }
    }
    Ok(out)
}

/// Strips the `_{k}` suffix `explode_coarse` added for a multipolygon
/// parent's parts, mirroring the original's `parent_id.split("_")[0]`
/// restore step (SPEC_FULL.md §4.7 step 8). A coarse id that was never
/// exploded has no such suffix and passes through unchanged.
pub fn restore_parent_id(id: &str) -> String {
    id.split('_').next().unwrap_or(id).to_string()
}

/// Converts surviving fragments into the next iteration's detailed input.
/// Fragments with no detailed identity (holes that never found a merge
/// target) are dropped, the same fate the base merge algorithm gives any
/// fragment it can't place.
pub fn fragments_to_detailed(fragments: &[Fragment]) -> Vec<DetailedRow> {
    fragments
        .iter()
        .filter_map(|f| {
            Some(DetailedRow {
                shape_id: f.shape_id.clone()?,
                shape_name: f.shape_name.clone()?,
                level: f.level?,
                geometry: f.geometry.clone(),
            })
        })
        .collect()
}
