//! C3: classify_mergeability. Computes per-fragment area/compactness stats,
//! group sums by coarse parent and by detailed identity, and derives the
//! three mergeability rules from SPEC_FULL.md §4.3.

use ahash::AHashMap;
use geo::Area;
use harmonize_geom::MinimumBoundingCircle;

use crate::model::Fragment;

#[derive(Debug, Clone, Copy)]
pub struct ClassifyThresholds {
    pub compactness_threshold: f64,
    pub detailed_area_threshold: f64,
    pub coarse_area_threshold: f64,
}

impl Default for ClassifyThresholds {
    fn default() -> Self {
        Self {
            compactness_threshold: 0.05,
            detailed_area_threshold: 0.1,
            coarse_area_threshold: 0.1,
        }
    }
}

pub fn classify_mergeability(fragments: &mut [Fragment], thresholds: &ClassifyThresholds) {
    for f in fragments.iter_mut() {
        f.stats.area = f.geometry.unsigned_area();
        f.stats.bounding_area = f.geometry.minimum_bounding_circle().area();
        f.stats.compactness = if f.stats.bounding_area > 0.0 {
            f.stats.area / f.stats.bounding_area
        } else {
            0.0
        };
    }

    let mut coarse_area: AHashMap<String, f64> = AHashMap::default();
    for f in fragments.iter() {
        *coarse_area.entry(f.parent_id.clone()).or_insert(0.0) += f.stats.area;
    }

    let mut detailed_area: AHashMap<Option<String>, f64> = AHashMap::default();
    for f in fragments.iter() {
        *detailed_area.entry(f.shape_id.clone()).or_insert(0.0) += f.stats.area;
    }

    for f in fragments.iter_mut() {
        f.stats.coarse_area = coarse_area.get(&f.parent_id).copied().unwrap_or(0.0);
        f.stats.coarse_fraction = if f.stats.coarse_area > 0.0 {
            f.stats.area / f.stats.coarse_area
        } else {
            0.0
        };
        f.stats.detailed_area = detailed_area.get(&f.shape_id).copied().unwrap_or(0.0);
        f.stats.detailed_fraction = if f.stats.detailed_area > 0.0 {
            f.stats.area / f.stats.detailed_area
        } else {
            0.0
        };

        f.stats.missing_from_admin = f.shape_id.is_none();
        f.stats.small_geometry = f.stats.detailed_fraction <= thresholds.detailed_area_threshold
            && f.stats.coarse_fraction <= thresholds.coarse_area_threshold;
        f.stats.sliver_geometry = f.stats.detailed_fraction <= 2.0 * thresholds.detailed_area_threshold
            && f.stats.compactness <= thresholds.compactness_threshold;

        f.mergeable = f.stats.missing_from_admin || f.stats.small_geometry || f.stats.sliver_geometry;
    }
}
