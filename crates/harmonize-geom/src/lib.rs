#![doc = "Low-level geometry helpers shared by the shape-harmonizer engine"]

mod retry;

pub mod algorithm {
    pub mod bounding_circle;
}

pub use algorithm::bounding_circle::{Circle, MinimumBoundingCircle};
pub use retry::BufferSchedule;
