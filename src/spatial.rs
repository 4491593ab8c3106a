//! Bounding-box spatial index, following the teacher's `Geometries` /
//! `BoundingBox` split (`crates/geom/src/{geom,bbox}.rs`): index the bounding
//! rectangle of each geometry in an `RTree`, then refine candidates with the
//! real geometric predicate.

use geo::{BoundingRect, MultiPolygon, Rect};
use rstar::{RTree, RTreeObject, AABB};

pub struct IndexedBox {
    pub idx: usize,
    bbox: Rect<f64>,
}

impl RTreeObject for IndexedBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// Builds an index over the bounding rectangles of `geoms`. Empty geometries
/// (no bounding rect) are simply absent from the index.
pub fn build_index(geoms: &[MultiPolygon<f64>]) -> RTree<IndexedBox> {
    RTree::bulk_load(
        geoms
            .iter()
            .enumerate()
            .filter_map(|(idx, g)| g.bounding_rect().map(|bbox| IndexedBox { idx, bbox }))
            .collect(),
    )
}

/// An envelope expanded by `pad` on every side, for queries that need to
/// catch neighbors just outside a geometry's own bounding box (e.g. after
/// buffering).
pub fn padded_envelope(bbox: Rect<f64>, pad: f64) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [bbox.min().x - pad, bbox.min().y - pad],
        [bbox.max().x + pad, bbox.max().y + pad],
    )
}
