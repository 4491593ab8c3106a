//! Harmonizes a coarse/detailed pair of administrative polygon layers into a
//! single tiling, disjoint detailed layer: every coarse parent's area is
//! exactly accounted for by child polygons that inherit detailed identity
//! where one exists and are merged away where it doesn't (see DESIGN.md for
//! how each stage below is grounded).

pub mod classify;
pub mod error;
pub mod harmonize;
pub mod io;
pub mod merge;
pub mod metrics;
pub mod model;
pub mod overlap;
pub mod partition;
pub mod repair;
mod spatial;

pub use classify::ClassifyThresholds;
pub use error::Fatal;
pub use harmonize::{Harmonizer, HarmonizeReport, ParentFailure};
pub use merge::MergeStrategy;
pub use model::{CoarseInput, CoarseRow, DetailedRow, Fragment, OutputRow, Stats};
