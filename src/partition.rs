//! C2: partition_geometries. For every coarse parent, overlays the detailed
//! layer against it (geopandas `overlay(how="identity")`'s two halves): the
//! per-detailed-feature intersections, plus whatever part of the coarse
//! parent none of them covered.
//!
//! Detailed inputs are allowed to overlap each other here; that's resolved
//! later by C6, not here (see DESIGN.md).

use geo::{Area, BooleanOps, BoundingRect};
use geo::{MultiPolygon, Polygon};
use harmonize_geom::BufferSchedule;

use crate::model::{CoarseRow, DetailedRow, Fragment};
use crate::spatial::{build_index, padded_envelope};

/// Exploded intersection/residual pieces at or below this area are dropped
/// as numerical noise from the overlay, the same tolerance C2's partition
/// guarantee is stated against.
const SLIVER_AREA: f64 = 1e-3;

pub fn partition_geometries(
    coarse: &[CoarseRow],
    detailed: &[DetailedRow],
    schedule: &BufferSchedule,
) -> anyhow::Result<Vec<Fragment>> {
    let detailed_geoms: Vec<MultiPolygon<f64>> =
        detailed.iter().map(|d| d.geometry.clone()).collect();
    let index = build_index(&detailed_geoms);

    let mut out = Vec::new();
    for c in coarse {
        let Some(cbbox) = c.geometry.bounding_rect() else {
            continue;
        };
        let envelope = padded_envelope(cbbox, 0.0);
        let candidates: Vec<usize> = index
            .locate_in_envelope_intersecting(&envelope)
            .map(|b| b.idx)
            .collect();

        let mut consumed: Option<MultiPolygon<f64>> = None;
        for &i in &candidates {
            let d = &detailed[i];
            let inter = schedule.retry_on_panic(d.geometry.clone(), |g| c.geometry.intersection(g))?;
            consumed = Some(match consumed.take() {
                Some(u) => u.union(&d.geometry),
                None => d.geometry.clone(),
            });
            push_fragments(&mut out, &inter, c, Some(d));
        }

        let coarse_as_multi = MultiPolygon(vec![c.geometry.clone()]);
        let residual = match consumed {
            Some(u) => schedule.retry_on_panic(u, |g| coarse_as_multi.difference(g))?,
            None => coarse_as_multi,
        };
        push_fragments(&mut out, &residual, c, None);
    }
    Ok(out)
}

fn push_fragments(
    out: &mut Vec<Fragment>,
    mp: &MultiPolygon<f64>,
    coarse: &CoarseRow,
    detailed: Option<&DetailedRow>,
) {
    for poly in &mp.0 {
        let area = poly.unsigned_area();
        if area <= SLIVER_AREA {
            continue;
        }
        out.push(Fragment::from_partition(
            coarse.shape_id.clone(),
            coarse.path_to_top_parent.clone(),
            detailed.map(|d| d.shape_id.clone()),
            detailed.map(|d| d.shape_name.clone()),
            detailed.map(|d| d.level),
            poly.clone(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};

    fn coarse_row(id: &str, poly: Polygon<f64>) -> CoarseRow {
        CoarseRow {
            shape_id: id.to_string(),
            shape_name: id.to_string(),
            path_to_top_parent: id.to_string(),
            level: 0,
            geometry: poly,
        }
    }

    fn detailed_row(id: &str, mp: MultiPolygon<f64>) -> DetailedRow {
        DetailedRow {
            shape_id: id.to_string(),
            shape_name: id.to_string(),
            level: 1,
            geometry: mp,
        }
    }

    fn square(x0: f64, y0: f64, side: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + side, y: y0),
            (x: x0 + side, y: y0 + side),
            (x: x0, y: y0 + side),
        ]
    }

    #[test]
    fn fully_covered_parent_produces_one_fragment_matching_area() {
        let coarse = vec![coarse_row("p1", square(0.0, 0.0, 10.0))];
        let detailed = vec![detailed_row("d1", MultiPolygon(vec![square(0.0, 0.0, 10.0)]))];
        let schedule = BufferSchedule::default();

        let fragments = partition_geometries(&coarse, &detailed, &schedule).unwrap();
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].shape_id.as_deref() == Some("d1"));
        let total: f64 = fragments.iter().map(|f| f.geometry.0[0].unsigned_area()).sum();
        assert!((total - 100.0).abs() < 1e-6);
    }

    #[test]
    fn uncovered_parent_area_becomes_a_holeless_fragment() {
        let coarse = vec![coarse_row("p1", square(0.0, 0.0, 10.0))];
        let detailed = vec![detailed_row("d1", MultiPolygon(vec![square(0.0, 0.0, 5.0)]))];
        let schedule = BufferSchedule::default();

        let fragments = partition_geometries(&coarse, &detailed, &schedule).unwrap();
        assert_eq!(fragments.len(), 2);
        let total: f64 = fragments.iter().map(|f| f.geometry.0[0].unsigned_area()).sum();
        assert!((total - 100.0).abs() < 1e-6);
        assert!(fragments.iter().any(|f| f.shape_id.is_none()));
    }

    #[test]
    fn detailed_extending_outside_parent_is_clipped() {
        let coarse = vec![coarse_row("p1", square(0.0, 0.0, 10.0))];
        let detailed = vec![detailed_row("d1", MultiPolygon(vec![square(5.0, 5.0, 10.0)]))];
        let schedule = BufferSchedule::default();

        let fragments = partition_geometries(&coarse, &detailed, &schedule).unwrap();
        let covered: f64 = fragments
            .iter()
            .filter(|f| f.shape_id.is_some())
            .map(|f| f.geometry.0[0].unsigned_area())
            .sum();
        assert!((covered - 25.0).abs() < 1e-6);
    }
}
