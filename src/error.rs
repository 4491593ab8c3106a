//! Fatal conditions the engine can surface (§7 of SPEC_FULL.md). These are
//! the "can't recover, caller must see exactly what broke" cases; everything
//! recoverable goes through `harmonize_geom::BufferSchedule` instead.

use std::fmt;

#[derive(Debug)]
pub enum Fatal {
    /// The coarse input violated a uniqueness or shape invariant before any
    /// geometry processing even started.
    SchemaViolation(String),
    /// A multipolygon survived C5's repair schedule and sub-part discard.
    PersistentMultipolygon {
        parent_id: String,
        shape_id: Option<String>,
        parts: usize,
        /// Debug-formatted snapshot of the fragment's state at failure time,
        /// standing in for the original's GeoJSON state dump (SPEC_FULL.md
        /// §15) — a library call has no business writing files, so the
        /// caller gets the dump as a string to log or serialize as it sees
        /// fit.
        state: String,
    },
    /// A row reached the end of the pipeline still carrying more than one
    /// polygon part.
    NonPolygonOutput {
        parent_id: String,
        count: usize,
        state: String,
    },
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fatal::SchemaViolation(msg) => write!(f, "schema violation: {msg}"),
            Fatal::PersistentMultipolygon {
                parent_id,
                shape_id,
                parts,
                ..
            } => write!(
                f,
                "parent {parent_id}: fragment {shape_id:?} still has {parts} polygon parts after repair"
            ),
            Fatal::NonPolygonOutput { parent_id, count, .. } => write!(
                f,
                "parent {parent_id}: {count} output row(s) were not single polygons"
            ),
        }
    }
}

impl std::error::Error for Fatal {}
