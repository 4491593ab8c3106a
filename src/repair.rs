//! C5: repair_multipolygons. Dissolve can leave a handful of fragments with
//! more than one polygon part (two pieces joined only at a seam the buffer
//! smoothing didn't quite close). This tries a buffer(+r).buffer(-r)
//! schedule to collapse them back to one part, then falls back to dropping
//! negligible sub-parts, and is fatal only if neither works.

use geo::{Area, Buffer};

use crate::error::Fatal;
use crate::model::Fragment;

/// Sub-polygon parts smaller than this fraction of the fragment's total area
/// are assumed to be numerical crumbs left over from repeated buffering, and
/// are discarded rather than treated as real geometry.
const MIN_RELATIVE_PART_AREA: f64 = 1e-8;

pub fn repair_multipolygons(fragments: Vec<Fragment>) -> anyhow::Result<Vec<Fragment>> {
    fragments.into_iter().map(repair_one).collect()
}

/// Serializes a fragment's last-known state for the caller to log, standing
/// in for the original's GeoJSON postmortem dump (SPEC_FULL.md §15).
fn dump_state(frag: &Fragment) -> String {
    serde_json::to_string(frag).unwrap_or_else(|_| format!("{frag:?}"))
}

fn repair_one(mut frag: Fragment) -> anyhow::Result<Fragment> {
    if frag.geometry.0.len() <= 1 {
        return Ok(frag);
    }

    for r in repair_radii() {
        let candidate = frag.geometry.buffer(r).buffer(-r);
        let area: f64 = candidate.0.iter().map(|p| p.unsigned_area()).sum();
        if candidate.0.len() == 1 && area > 0.0 {
            frag.geometry = candidate;
            return Ok(frag);
        }
    }

    let total: f64 = frag.geometry.0.iter().map(|p| p.unsigned_area()).sum();
    if total > 0.0 {
        let kept: Vec<_> = frag
            .geometry
            .0
            .iter()
            .cloned()
            .filter(|p| p.unsigned_area() / total >= MIN_RELATIVE_PART_AREA)
            .collect();
        if kept.len() == 1 {
            frag.geometry = geo::MultiPolygon(kept);
            return Ok(frag);
        }
    }

    Err(Fatal::PersistentMultipolygon {
        parent_id: frag.parent_id.clone(),
        shape_id: frag.shape_id.clone(),
        parts: frag.geometry.0.len(),
        state: dump_state(&frag),
    }
    .into())
}

/// `r ∈ {2⁻⁴·2ⁱ·k : i ∈ 0..=9, k ∈ {1, 1.01}}`, ascending, per SPEC_FULL.md
/// §4.5 (ported from the same radius family as C1's buffer-retry schedule).
fn repair_radii() -> Vec<f64> {
    let mut radii = Vec::with_capacity(20);
    for i in 0..=9 {
        let base = 2f64.powi(-4) * 2f64.powi(i);
        radii.push(base);
        radii.push(base * 1.01);
    }
    radii.sort_by(|a, b| a.total_cmp(b));
    radii
}
