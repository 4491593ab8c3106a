//! C6: eliminate_overlaps. Greedily subtracts each fragment's geometry from
//! the ones ahead of it in the list until no pair overlaps, giving up on any
//! pair whose difference would itself split into a multipolygon (that pair
//! is left overlapping rather than risk fragmenting further). Operates on a
//! single coarse parent's surviving fragments, which by this point in the
//! pipeline are guaranteed single-`Polygon`.

use ahash::AHashSet;
use geo::{Area, BooleanOps, MultiPolygon};

use crate::model::Fragment;

pub fn eliminate_overlaps(mut fragments: Vec<Fragment>) -> anyhow::Result<Vec<Fragment>> {
    let n = fragments.len();
    if n < 2 {
        return Ok(fragments);
    }

    let mut geoms: Vec<MultiPolygon<f64>> = fragments.iter().map(|f| f.geometry.clone()).collect();
    let mut attempted: AHashSet<(usize, usize)> = AHashSet::default();

    let mut i = 0usize;
    let mut j = 1usize;
    while i < n - 1 && j < n {
        let other = geoms[j].difference(&geoms[i]);
        if other.0.len() > 1 {
            if attempted.contains(&(i, j)) {
                j += 1;
            } else {
                attempted.insert((i, j));
                geoms[i] = geoms[i].difference(&geoms[j]);
                i = 0;
                j = 1;
                continue;
            }
        } else {
            geoms[j] = other;
            j += 1;
        }
        if j >= n {
            i += 1;
            j = i + 1;
        }
    }

    for (f, g) in fragments.iter_mut().zip(geoms) {
        f.geometry = g;
    }
    Ok(fragments)
}

/// Relative difference between the sum of fragment areas and the area of
/// their union: 0 for perfectly disjoint fragments, growing with however
/// much overlap the elimination pass above gave up on.
pub fn disjointness_error(fragments: &[Fragment]) -> f64 {
    if fragments.is_empty() {
        return 0.0;
    }
    let mut union = fragments[0].geometry.clone();
    let mut sum = union.unsigned_area();
    for f in &fragments[1..] {
        sum += f.geometry.unsigned_area();
        union = union.union(&f.geometry);
    }
    let union_area = union.unsigned_area();
    if union_area <= 0.0 {
        return 0.0;
    }
    (sum - union_area).abs() / union_area
}
