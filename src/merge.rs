//! C4: collapse_mergeable_geometries. Two interchangeable strategies for
//! dissolving mergeable fragments into their neighbors (SPEC_FULL.md §4.4):
//!
//! - `Base`: one pass. Every reference gets a fixed-radius buffer; every
//!   mergeable fragment is assigned to whichever reference's buffer covers
//!   the most of it. Fragments nothing covers are dropped.
//! - `NeighborWeighted`: the default. Repeated passes over a relaxing
//!   (overlap-share threshold, neighbor-count) schedule, where a mergeable
//!   fragment can also merge into another mergeable fragment (chaining
//!   toward a reference over several passes) rather than only a reference.
//!
//! Both operate on the fragment list for a single coarse parent.

use ahash::{AHashMap, AHashSet};
use geo::{Area, BooleanOps, BoundingRect, Buffer, MultiPolygon};
use harmonize_geom::BufferSchedule;

use crate::model::Fragment;
use crate::spatial::{build_index, padded_envelope};

#[derive(Debug, Clone, Copy)]
pub struct NeighborWeightedParams {
    pub seam_smooth_radius: f64,
    pub very_small_area: f64,
    pub max_passes: usize,
}

impl Default for NeighborWeightedParams {
    fn default() -> Self {
        Self {
            seam_smooth_radius: 1.0,
            very_small_area: 1e-3,
            max_passes: 200,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum MergeStrategy {
    Base { buffer: f64 },
    NeighborWeighted(NeighborWeightedParams),
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy::NeighborWeighted(NeighborWeightedParams::default())
    }
}

pub fn collapse_mergeable_geometries(
    fragments: Vec<Fragment>,
    strategy: &MergeStrategy,
    schedule: &BufferSchedule,
) -> anyhow::Result<Vec<Fragment>> {
    match strategy {
        MergeStrategy::Base { buffer } => Ok(collapse_base(fragments, *buffer)),
        MergeStrategy::NeighborWeighted(params) => {
            collapse_neighbor_weighted(fragments, params, schedule)
        }
    }
}

/// The base algorithm: references get stable ids, mergeable fragments are
/// assigned to whichever reference's buffer they overlap most, unassigned
/// fragments are dropped. Output contains only (possibly enlarged)
/// reference rows.
fn collapse_base(fragments: Vec<Fragment>, buffer: f64) -> Vec<Fragment> {
    let (mut references, mergeable): (Vec<Fragment>, Vec<Fragment>) =
        fragments.into_iter().partition(|f| !f.mergeable);
    for (i, r) in references.iter_mut().enumerate() {
        r.merge_id = Some(i as u32);
    }

    let mut best: Vec<Option<(u32, f64)>> = vec![None; mergeable.len()];
    for r in &references {
        let buffered = r.geometry.buffer(buffer);
        for (mi, m) in mergeable.iter().enumerate() {
            if m.stats.area <= 0.0 {
                continue;
            }
            let inter = m.geometry.intersection(&buffered);
            let overlap_area: f64 = inter.0.iter().map(|p| p.unsigned_area()).sum();
            if overlap_area <= 0.0 {
                continue;
            }
            let frac = overlap_area / m.stats.area;
            let better = match best[mi] {
                Some((_, b)) => frac > b,
                None => true,
            };
            if better {
                best[mi] = Some((r.merge_id.expect("reference ids assigned above"), frac));
            }
        }
    }

    let mut groups: AHashMap<u32, Vec<MultiPolygon<f64>>> = AHashMap::default();
    for (mi, m) in mergeable.into_iter().enumerate() {
        if let Some((id, _)) = best[mi] {
            groups.entry(id).or_default().push(m.geometry);
        }
    }

    for r in references.iter_mut() {
        let id = r.merge_id.expect("reference ids assigned above");
        if let Some(parts) = groups.remove(&id) {
            let mut merged = r.geometry.clone();
            for p in parts {
                merged = merged.union(&p);
            }
            r.geometry = merged;
        }
        r.mergeable = false;
        r.merge_id = None;
    }
    references
}

fn collapse_neighbor_weighted(
    mut fragments: Vec<Fragment>,
    params: &NeighborWeightedParams,
    schedule: &BufferSchedule,
) -> anyhow::Result<Vec<Fragment>> {
    let mut threshold = 0.5_f64;
    let mut neighbor_count: usize = 2;
    let mut widened = false;

    for _ in 0..params.max_passes {
        if !fragments.iter().any(|f| f.mergeable) {
            break;
        }

        let changed = simple_merge_pass(&mut fragments, threshold, neighbor_count, params, schedule)?;
        if changed {
            // Keep hammering at the same (threshold, neighbor_count) until
            // it stops making progress before relaxing it further.
            continue;
        }

        if !widened && threshold <= 0.5 {
            threshold = 0.7;
            neighbor_count = 3;
        } else {
            threshold *= 0.9;
            if !widened && threshold <= 0.4 {
                threshold = 0.7;
                neighbor_count = usize::MAX / 2;
                widened = true;
            }
        }
    }

    Ok(fragments)
}

/// One pass of the neighbor-weighted algorithm: each mergeable fragment
/// looks at every fragment within `buffer(1)` of itself, picks the one that
/// explains the largest share of its neighboring perimeter, and merges into
/// it if that share clears `threshold` with at most `neighbor_count`
/// competing neighbors (or unconditionally, if the fragment is a sliver).
/// Returns whether anything merged this pass.
fn simple_merge_pass(
    fragments: &mut Vec<Fragment>,
    threshold: f64,
    neighbor_count: usize,
    params: &NeighborWeightedParams,
    schedule: &BufferSchedule,
) -> anyhow::Result<bool> {
    let geoms: Vec<MultiPolygon<f64>> = fragments.iter().map(|f| f.geometry.clone()).collect();
    let index = build_index(&geoms);

    let mut proposals: AHashMap<usize, usize> = AHashMap::default();
    for (gi, f) in fragments.iter().enumerate() {
        if !f.mergeable {
            continue;
        }
        let buffered = f.geometry.buffer(1.0);
        let Some(bbox) = buffered.bounding_rect() else {
            continue;
        };
        let envelope = padded_envelope(bbox, 0.0);

        let mut overlaps: Vec<(usize, f64)> = Vec::new();
        for candidate in index.locate_in_envelope_intersecting(&envelope) {
            let ci = candidate.idx;
            if ci == gi {
                continue;
            }
            let inter = geoms[ci].intersection(&buffered);
            let area: f64 = inter.0.iter().map(|p| p.unsigned_area()).sum();
            if area > 0.0 {
                overlaps.push((ci, area));
            }
        }
        if overlaps.is_empty() {
            continue;
        }

        let total: f64 = overlaps.iter().map(|(_, a)| a).sum();
        let n_count = overlaps.iter().filter(|(_, a)| a / total > 0.01).count();
        let &(top_idx, top_area) = overlaps
            .iter()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .expect("overlaps checked non-empty above");
        let top_share = top_area / total;

        let very_small = f.stats.area <= params.very_small_area;
        if very_small || (top_share >= threshold && n_count <= neighbor_count) {
            proposals.insert(gi, top_idx);
        }
    }

    break_mutual_cycles(fragments, &mut proposals);
    if proposals.is_empty() {
        return Ok(false);
    }
    let resolved = resolve_targets(&proposals);
    apply_merge_pass(fragments, &resolved, params, schedule)
}

fn break_mutual_cycles(fragments: &[Fragment], proposals: &mut AHashMap<usize, usize>) {
    let pairs: Vec<(usize, usize)> = proposals.iter().map(|(&u, &v)| (u, v)).collect();
    for (u, v) in pairs {
        if proposals.get(&v) == Some(&u) {
            let keep = if fragments[u].stats.area >= fragments[v].stats.area {
                u
            } else {
                v
            };
            proposals.remove(&keep);
        }
    }
}

fn resolve_targets(proposals: &AHashMap<usize, usize>) -> AHashMap<usize, usize> {
    let mut resolved = AHashMap::default();
    for &start in proposals.keys() {
        let mut cur = start;
        let mut seen: AHashSet<usize> = AHashSet::default();
        while let Some(&next) = proposals.get(&cur) {
            if !seen.insert(cur) {
                break;
            }
            cur = next;
        }
        resolved.insert(start, cur);
    }
    resolved
}

fn apply_merge_pass(
    fragments: &mut Vec<Fragment>,
    resolved: &AHashMap<usize, usize>,
    params: &NeighborWeightedParams,
    schedule: &BufferSchedule,
) -> anyhow::Result<bool> {
    let mut absorbed_geoms: AHashMap<usize, Vec<MultiPolygon<f64>>> = AHashMap::default();
    let mut absorbed: AHashSet<usize> = AHashSet::default();
    for (&src, &root) in resolved {
        if src != root {
            absorbed.insert(src);
            absorbed_geoms
                .entry(root)
                .or_default()
                .push(fragments[src].geometry.clone());
        }
    }
    if absorbed.is_empty() {
        return Ok(false);
    }

    for (&root, parts) in &absorbed_geoms {
        let mut merged = fragments[root].geometry.clone();
        for p in parts {
            merged = merged.union(p);
        }
        let radius = params.seam_smooth_radius;
        merged = schedule.retry_on_panic(merged, |g| g.buffer(radius).buffer(-radius))?;
        fragments[root].geometry = merged;
    }

    let mut idx = 0;
    fragments.retain(|_| {
        let keep = !absorbed.contains(&idx);
        idx += 1;
        keep
    });
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn fragment(parent: &str, id: Option<&str>, poly: geo::Polygon<f64>, mergeable: bool, area: f64) -> Fragment {
        let mut f = Fragment::from_partition(
            parent.to_string(),
            parent.to_string(),
            id.map(String::from),
            id.map(String::from),
            id.map(|_| 1),
            poly,
        );
        f.mergeable = mergeable;
        f.stats.area = area;
        f
    }

    fn square(x0: f64, y0: f64, side: f64) -> geo::Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + side, y: y0),
            (x: x0 + side, y: y0 + side),
            (x: x0, y: y0 + side),
        ]
    }

    #[test]
    fn base_merges_sliver_into_adjacent_reference() {
        let reference = fragment("p1", Some("d1"), square(0.0, 0.0, 10.0), false, 100.0);
        let sliver = fragment("p1", Some("d2"), square(10.0, 0.0, 0.1), true, 0.01);
        let merged = collapse_base(vec![reference, sliver], 10.0);
        assert_eq!(merged.len(), 1);
        let area: f64 = merged[0].geometry.0.iter().map(|p| p.unsigned_area()).sum();
        assert!(area >= 100.0);
    }

    #[test]
    fn base_drops_unreachable_mergeable_fragment() {
        let reference = fragment("p1", Some("d1"), square(0.0, 0.0, 1.0), false, 1.0);
        let far_sliver = fragment("p1", Some("d2"), square(1000.0, 1000.0, 0.1), true, 0.01);
        let merged = collapse_base(vec![reference, far_sliver], 1.0);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn neighbor_weighted_converges_to_no_mergeable_rows() {
        let reference = fragment("p1", Some("d1"), square(0.0, 0.0, 10.0), false, 100.0);
        let sliver = fragment("p1", Some("d2"), square(10.0, 0.0, 0.5), true, 0.25);
        let schedule = BufferSchedule::default();
        let params = NeighborWeightedParams::default();
        let result = collapse_neighbor_weighted(vec![reference, sliver], &params, &schedule).unwrap();
        assert!(result.iter().all(|f| !f.mergeable));
    }
}
