//! Components that change how another component is called.

mod scaling;
mod time_differencing;
mod update_frequency;

pub use scaling::{ScaleFactors, ScalingWrapper};
pub use time_differencing::TimeDifferencingWrapper;
pub use update_frequency::UpdateFrequencyWrapper;
