//! Small helpers shared across the crate.

mod math;

pub use math::align_up;
